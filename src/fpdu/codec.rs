// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::collections::VecDeque;

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::{
    fpdu::{
        Fpdu, FpduBody, HEADER_LEN, MAX_FPDU_LEN,
        kind::{FpduKind, Phase, UnknownFpdu},
    },
    params::{ParamError, ParamList},
};

/// Framing-level failure. Every variant is fatal for the session and maps
/// to diagnostic `3.399`.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("frame length {0} below the 6-byte header")]
    LengthTooSmall(u16),

    #[error(transparent)]
    UnknownKind(#[from] UnknownFpdu),

    #[error("body of {0} bytes cannot fit a 16-bit frame")]
    BodyTooLarge(usize),

    #[error("bad parameter list: {0}")]
    Params(#[from] ParamError),
}

/// Incremental FPDU reader plus the matching writer.
///
/// Transport reads are fed in as they arrive; the codec buffers partial
/// frames, splits concatenated ones, and hands out exactly one parsed FPDU
/// per [`FpduCodec::next_fpdu`] call, preserving arrival order.
#[derive(Debug, Default)]
pub struct FpduCodec {
    buf: BytesMut,
    ready: VecDeque<Fpdu>,
}

impl FpduCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes sitting in the partial-frame buffer.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Absorb one transport read and parse every complete frame in it.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<(), CodecError> {
        self.buf.extend_from_slice(chunk);
        loop {
            if self.buf.len() < 2 {
                return Ok(());
            }
            let length = u16::from_be_bytes([self.buf[0], self.buf[1]]);
            if (length as usize) < HEADER_LEN {
                return Err(CodecError::LengthTooSmall(length));
            }
            if self.buf.len() < length as usize {
                // Mid-frame: completed by the next read.
                return Ok(());
            }
            let frame = self.buf.split_to(length as usize).freeze();
            self.ready.push_back(decode_frame(&frame)?);
        }
    }

    /// The next fully-parsed FPDU, oldest first.
    pub fn next_fpdu(&mut self) -> Option<Fpdu> {
        self.ready.pop_front()
    }

    /// Serialize one FPDU to its wire frame.
    pub fn encode(fpdu: &Fpdu) -> Result<Bytes, CodecError> {
        let body_len = fpdu.body_len();
        let total = HEADER_LEN + body_len;
        if total > MAX_FPDU_LEN {
            return Err(CodecError::BodyTooLarge(body_len));
        }
        let mut buf = BytesMut::with_capacity(total);
        buf.put_u16(total as u16);
        buf.put_u8(fpdu.kind.phase() as u8);
        buf.put_u8(fpdu.kind.type_code());
        buf.put_u8(fpdu.id_dst);
        buf.put_u8(fpdu.id_src);
        match &fpdu.body {
            FpduBody::Params(params) => params.encode_into(&mut buf),
            FpduBody::Data(data) => buf.put_slice(data),
        }
        Ok(buf.freeze())
    }
}

/// Parse one complete frame (`frame.len()` already equals the length
/// field).
fn decode_frame(frame: &Bytes) -> Result<Fpdu, CodecError> {
    debug_assert!(frame.len() >= HEADER_LEN);
    let kind = FpduKind::from_wire(frame[2], frame[3])?;
    let id_dst = frame[4];
    let id_src = frame[5];
    let body_bytes = frame.slice(HEADER_LEN..);
    let body = match kind.phase() {
        Phase::Data => FpduBody::Data(body_bytes),
        Phase::Session | Phase::File => {
            FpduBody::Params(ParamList::decode(&body_bytes)?)
        },
    };
    Ok(Fpdu { kind, id_dst, id_src, body })
}

/// Parse a standalone frame, e.g. in tests or fixtures.
pub fn decode_one(frame: &[u8]) -> Result<Fpdu, CodecError> {
    let mut codec = FpduCodec::new();
    codec.feed(frame)?;
    codec
        .next_fpdu()
        .ok_or(CodecError::LengthTooSmall(frame.len().min(5) as u16))
}

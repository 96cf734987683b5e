// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! FPDU framing: the 6-byte header, the closed `(phase, type)` set, and
//! the streaming codec that splits concatenated frames.

/// Incremental frame codec.
pub mod codec;
/// Phases, type codes, and the ACK table.
pub mod kind;

use bytes::Bytes;

pub use crate::fpdu::{
    codec::{CodecError, FpduCodec},
    kind::{FpduKind, Phase},
};
use crate::params::ParamList;

/// Fixed header: 2-byte length, phase, type, idDst, idSrc.
pub const HEADER_LEN: usize = 6;
/// The length field is an unsigned 16-bit count of the whole frame.
pub const MAX_FPDU_LEN: usize = u16::MAX as usize;

/// Body of one FPDU; the shape is fixed by the phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FpduBody {
    /// Session- and file-phase frames carry a TLV parameter list.
    Params(ParamList),
    /// Data-phase frames carry raw article bytes.
    Data(Bytes),
}

/// One Formatted Protocol Data Unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fpdu {
    pub kind: FpduKind,
    /// Destination transfer id.
    pub id_dst: u8,
    /// Source transfer id; in the data phase this byte carries the packed
    /// article count (zero for a split record chunk).
    pub id_src: u8,
    pub body: FpduBody,
}

impl Fpdu {
    /// A session- or file-phase frame with both ids zeroed.
    pub fn control(kind: FpduKind, params: ParamList) -> Self {
        debug_assert!(kind.phase() != Phase::Data);
        Self { kind, id_dst: 0, id_src: 0, body: FpduBody::Params(params) }
    }

    /// A data-phase frame; `article_count` lands in `id_src`.
    pub fn data(kind: FpduKind, article_count: u8, bytes: Bytes) -> Self {
        debug_assert!(kind.phase() == Phase::Data);
        Self { kind, id_dst: 0, id_src: article_count, body: FpduBody::Data(bytes) }
    }

    pub fn params(&self) -> Option<&ParamList> {
        match &self.body {
            FpduBody::Params(p) => Some(p),
            FpduBody::Data(_) => None,
        }
    }

    pub fn data_bytes(&self) -> Option<&Bytes> {
        match &self.body {
            FpduBody::Data(d) => Some(d),
            FpduBody::Params(_) => None,
        }
    }

    pub fn body_len(&self) -> usize {
        match &self.body {
            FpduBody::Params(p) => p.encoded_len(),
            FpduBody::Data(d) => d.len(),
        }
    }
}

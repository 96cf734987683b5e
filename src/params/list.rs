// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::params::catalog::{Pgi, Pi};

/// TLV framing failure inside an FPDU body.
#[derive(Debug, Error)]
pub enum ParamError {
    #[error("parameter list truncated while reading {what}")]
    Truncated { what: &'static str },

    #[error("PI {pi} declares {declared} value bytes, {remaining} remain")]
    ValueOverrun { pi: u8, declared: usize, remaining: usize },

    #[error("PGI {pgi} declares {declared} group bytes, {remaining} remain")]
    GroupOverrun { pgi: u8, declared: usize, remaining: usize },
}

/// One raw TLV parameter. The value is kept verbatim; typed views live in
/// [`crate::params::values`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub pi: u8,
    pub value: Bytes,
}

impl Param {
    pub fn new(pi: Pi, value: impl Into<Bytes>) -> Self {
        Self { pi: pi.code(), value: value.into() }
    }
}

/// A top-level body item: a lone PI or a one-level group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamItem {
    Single(Param),
    Group { pgi: u8, params: Vec<Param> },
}

/// Ordered parameter list of a session- or file-phase FPDU body.
///
/// Unknown identifiers are preserved as raw parameters so a list always
/// re-encodes to the exact bytes it was parsed from. Lookups scan group
/// members too, and the *last* occurrence of a PI wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamList {
    items: Vec<ParamItem>,
}

/// Lengths 0..=254 are one byte; 255 escapes to a two-byte big-endian
/// extended length.
const LEN_ESCAPE: u8 = 0xFF;

fn put_len(buf: &mut BytesMut, len: usize) {
    debug_assert!(len <= u16::MAX as usize);
    if len < LEN_ESCAPE as usize {
        buf.put_u8(len as u8);
    } else {
        buf.put_u8(LEN_ESCAPE);
        buf.put_u16(len as u16);
    }
}

fn encoded_len_of(len: usize) -> usize {
    if len < LEN_ESCAPE as usize { 1 } else { 3 }
}

fn take_len(input: &mut &[u8]) -> Result<usize, ParamError> {
    let (&first, rest) = input
        .split_first()
        .ok_or(ParamError::Truncated { what: "length" })?;
    if first != LEN_ESCAPE {
        *input = rest;
        return Ok(first as usize);
    }
    if rest.len() < 2 {
        return Err(ParamError::Truncated { what: "extended length" });
    }
    let len = u16::from_be_bytes([rest[0], rest[1]]) as usize;
    *input = &rest[2..];
    Ok(len)
}

fn take_param(input: &mut &[u8]) -> Result<Param, ParamError> {
    let (&pi, rest) = input
        .split_first()
        .ok_or(ParamError::Truncated { what: "PI id" })?;
    *input = rest;
    let len = take_len(input)?;
    if input.len() < len {
        return Err(ParamError::ValueOverrun { pi, declared: len, remaining: input.len() });
    }
    let value = Bytes::copy_from_slice(&input[..len]);
    *input = &input[len..];
    Ok(Param { pi, value })
}

impl ParamList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[ParamItem] {
        &self.items
    }

    pub fn push(&mut self, param: Param) -> &mut Self {
        self.items.push(ParamItem::Single(param));
        self
    }

    pub fn push_group(&mut self, pgi: Pgi, params: Vec<Param>) -> &mut Self {
        self.items.push(ParamItem::Group { pgi: pgi.code(), params });
        self
    }

    /// Raw value of `pi`, searching groups too; last occurrence wins.
    pub fn get(&self, pi: Pi) -> Option<&Bytes> {
        let code = pi.code();
        let mut found = None;
        for item in &self.items {
            match item {
                ParamItem::Single(p) if p.pi == code => found = Some(&p.value),
                ParamItem::Group { params, .. } => {
                    for p in params {
                        if p.pi == code {
                            found = Some(&p.value);
                        }
                    }
                },
                ParamItem::Single(_) => {},
            }
        }
        found
    }

    /// The parameters of `pgi`, if the group is present.
    pub fn group(&self, pgi: Pgi) -> Option<&[Param]> {
        let code = pgi.code();
        self.items.iter().rev().find_map(|item| match item {
            ParamItem::Group { pgi, params } if *pgi == code => Some(params.as_slice()),
            _ => None,
        })
    }

    pub fn encoded_len(&self) -> usize {
        self.items
            .iter()
            .map(|item| match item {
                ParamItem::Single(p) => 1 + encoded_len_of(p.value.len()) + p.value.len(),
                ParamItem::Group { params, .. } => {
                    let inner: usize = params
                        .iter()
                        .map(|p| 1 + encoded_len_of(p.value.len()) + p.value.len())
                        .sum();
                    1 + encoded_len_of(inner) + inner
                },
            })
            .sum()
    }

    pub fn encode_into(&self, buf: &mut BytesMut) {
        for item in &self.items {
            match item {
                ParamItem::Single(p) => {
                    buf.put_u8(p.pi);
                    put_len(buf, p.value.len());
                    buf.put_slice(&p.value);
                },
                ParamItem::Group { pgi, params } => {
                    let inner: usize = params
                        .iter()
                        .map(|p| 1 + encoded_len_of(p.value.len()) + p.value.len())
                        .sum();
                    buf.put_u8(*pgi);
                    put_len(buf, inner);
                    for p in params {
                        buf.put_u8(p.pi);
                        put_len(buf, p.value.len());
                        buf.put_slice(&p.value);
                    }
                },
            }
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    pub fn decode(body: &[u8]) -> Result<Self, ParamError> {
        let mut input = body;
        let mut items = Vec::new();
        while !input.is_empty() {
            let id = input[0];
            if Pgi::from_code(id).is_some() {
                let mut rest = &input[1..];
                let glen = take_len(&mut rest)?;
                if rest.len() < glen {
                    return Err(ParamError::GroupOverrun {
                        pgi: id,
                        declared: glen,
                        remaining: rest.len(),
                    });
                }
                let mut inner = &rest[..glen];
                let mut params = Vec::new();
                while !inner.is_empty() {
                    params.push(take_param(&mut inner)?);
                }
                items.push(ParamItem::Group { pgi: id, params });
                input = &rest[glen..];
            } else {
                items.push(ParamItem::Single(take_param(&mut input)?));
            }
        }
        Ok(Self { items })
    }
}

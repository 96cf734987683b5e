// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Entity ↔ article translation.
//!
//! Two framings share the data phase:
//!
//! * **Packed articles**: whole records, each preceded by a 2-byte
//!   big-endian length, several to an entity when they fit; `id_src`
//!   carries the article count. Worst-case per-record overhead is 8
//!   bytes: the 6-byte header plus one prefix.
//! * **Split record**: a record too large for one entity travels raw
//!   (no prefixes, `id_src = 0`) across `DTFDA` / `DTFMA`… / `DTFFA`
//!   entities and is concatenated on arrival.
//!
//! Receivers distinguish the two by `id_src`, with a defensive fallback
//! for legacy peers that label packed entities `DTFDA`: packed parsing
//! must consume the body exactly, otherwise the entity is a split start.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    diag::{DiagCode, EngineError, EngineResult},
    fpdu::{Fpdu, FpduKind, HEADER_LEN},
};

/// Per-article cost in a packed entity: frame header plus length prefix.
pub const ARTICLE_OVERHEAD: usize = HEADER_LEN + 2;

/// Largest whole record that still fits a single packed entity.
pub fn packed_record_capacity(max_entity: u16) -> usize {
    (max_entity as usize).saturating_sub(ARTICLE_OVERHEAD)
}

/// Payload bytes one split-record chunk can carry.
pub fn split_chunk_capacity(max_entity: u16) -> usize {
    (max_entity as usize).saturating_sub(HEADER_LEN)
}

/// Pack whole records into one `DTF` entity body.
pub fn pack_entity(records: &[Bytes]) -> Fpdu {
    debug_assert!(!records.is_empty() && records.len() <= u8::MAX as usize);
    let body_len: usize = records.iter().map(|r| 2 + r.len()).sum();
    let mut body = BytesMut::with_capacity(body_len);
    for record in records {
        body.put_u16(record.len() as u16);
        body.put_slice(record);
    }
    Fpdu::data(FpduKind::Dtf, records.len() as u8, body.freeze())
}

/// Split one oversized record into its `DTFDA` / `DTFMA` / `DTFFA`
/// sequence.
pub fn split_record(record: &Bytes, max_entity: u16) -> Vec<Fpdu> {
    let cap = split_chunk_capacity(max_entity).max(1);
    let chunks: Vec<Bytes> = (0..record.len())
        .step_by(cap)
        .map(|at| record.slice(at..record.len().min(at + cap)))
        .collect();
    let last = chunks.len() - 1;
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            let kind = if i == 0 {
                FpduKind::Dtfda
            } else if i == last {
                FpduKind::Dtffa
            } else {
                FpduKind::Dtfma
            };
            Fpdu::data(kind, 0, chunk)
        })
        .collect()
}

fn record_too_long(len: usize) -> EngineError {
    EngineError::LimitExceeded {
        what: format!("article of {len} bytes exceeds the negotiated record length"),
        code: DiagCode::RECORD_TOO_LONG,
    }
}

/// Parse a packed body strictly: prefixes must tile the body, a zero
/// length terminates, an overrunning prefix is fatal `2.220`.
fn parse_packed(body: &Bytes) -> EngineResult<Vec<Bytes>> {
    let mut at = 0usize;
    let mut records = Vec::new();
    while at < body.len() {
        if body.len() - at < 2 {
            return Err(EngineError::MalformedFrame(
                "dangling byte in packed multi-article body".into(),
            ));
        }
        let len = u16::from_be_bytes([body[at], body[at + 1]]) as usize;
        at += 2;
        if len == 0 {
            break;
        }
        if len > body.len() - at {
            return Err(EngineError::LimitExceeded {
                what: format!(
                    "article prefix declares {len} bytes, {} remain in the entity",
                    body.len() - at
                ),
                code: DiagCode::RECORD_TOO_LONG,
            });
        }
        records.push(body.slice(at..at + len));
        at += len;
    }
    Ok(records)
}

/// Like [`parse_packed`] but quietly: used for the legacy `DTFDA`
/// fallback, where a parse failure just means "not packed".
fn try_parse_packed(body: &Bytes) -> Option<Vec<Bytes>> {
    parse_packed(body).ok()
}

/// Reassembles records from incoming data entities.
#[derive(Debug, Default)]
pub struct EntityAssembler {
    /// Fixed record length to enforce, if any.
    record_length: Option<u16>,
    /// Accumulation buffer of a record split across entities.
    partial: Option<BytesMut>,
}

impl EntityAssembler {
    pub fn new(record_length: u16) -> Self {
        Self {
            record_length: (record_length > 0).then_some(record_length),
            partial: None,
        }
    }

    fn check_length(&self, record: &Bytes) -> EngineResult<()> {
        if let Some(limit) = self.record_length
            && record.len() > limit as usize
        {
            return Err(record_too_long(record.len()));
        }
        Ok(())
    }

    /// Feed one data-phase FPDU, returning every record it completed.
    pub fn accept(&mut self, fpdu: &Fpdu) -> EngineResult<Vec<Bytes>> {
        let body = fpdu
            .data_bytes()
            .ok_or_else(|| {
                EngineError::MalformedFrame("data entity without raw body".into())
            })?
            .clone();

        let records = match fpdu.kind {
            FpduKind::Dtf => {
                if self.partial.is_some() {
                    return Err(EngineError::MalformedFrame(
                        "DTF inside a split record".into(),
                    ));
                }
                if fpdu.id_src >= 1 {
                    parse_packed(&body)?
                } else {
                    // Legacy single-record entity without a prefix.
                    vec![body]
                }
            },
            FpduKind::Dtfda => {
                if self.partial.is_some() {
                    return Err(EngineError::MalformedFrame(
                        "DTFDA inside a split record".into(),
                    ));
                }
                if fpdu.id_src >= 1
                    && let Some(packed) = try_parse_packed(&body)
                {
                    packed
                } else {
                    self.partial = Some(BytesMut::from(body.as_ref()));
                    Vec::new()
                }
            },
            FpduKind::Dtfma => match self.partial.as_mut() {
                Some(acc) => {
                    acc.extend_from_slice(&body);
                    Vec::new()
                },
                None => {
                    return Err(EngineError::MalformedFrame(
                        "DTFMA without a preceding DTFDA".into(),
                    ));
                },
            },
            FpduKind::Dtffa => match self.partial.take() {
                Some(mut acc) => {
                    acc.extend_from_slice(&body);
                    vec![acc.freeze()]
                },
                None => {
                    return Err(EngineError::MalformedFrame(
                        "DTFFA without a preceding DTFDA".into(),
                    ));
                },
            },
            other => {
                return Err(EngineError::MalformedFrame(format!(
                    "{other:?} is not a data entity"
                )));
            },
        };

        for record in &records {
            self.check_length(record)?;
        }
        Ok(records)
    }

    /// True while a split record is still being accumulated.
    pub fn mid_record(&self) -> bool {
        self.partial.is_some()
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Typed views over the raw TLV list.
//!
//! Writers use the catalog width for `N` values; readers accept any length
//! up to eight bytes (right-justified big-endian), which keeps the engine
//! liberal toward peers that trim leading zeroes.

use bitflags::bitflags;
use bytes::Bytes;
use chrono::NaiveDateTime;

use crate::{
    diag::DiagCode,
    ebcdic,
    params::{
        catalog::Pi,
        list::{Param, ParamList},
    },
};

/// Character coding negotiated for `C`-typed parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Coding {
    #[default]
    Ascii,
    Ebcdic,
}

/// `PI_16`: how the file payload bytes are to be interpreted.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataCode {
    Ascii = 0,
    Ebcdic = 1,
    #[default]
    Binary = 2,
}

impl DataCode {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Ascii,
            1 => Self::Ebcdic,
            2 => Self::Binary,
            _ => return None,
        })
    }
}

/// `PI_07`: resynchronization flag plus checkpoint interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    pub resync: bool,
    pub interval_kb: u16,
}

impl SyncConfig {
    pub const DISABLED: SyncConfig = SyncConfig { resync: false, interval_kb: 0 };

    pub fn to_wire(self) -> [u8; 3] {
        let kb = self.interval_kb.to_be_bytes();
        [self.resync as u8, kb[0], kb[1]]
    }

    pub fn from_wire(raw: &[u8]) -> Option<Self> {
        if raw.len() != 3 {
            return None;
        }
        Some(SyncConfig {
            resync: raw[0] != 0,
            interval_kb: u16::from_be_bytes([raw[1], raw[2]]),
        })
    }

    /// Bytes of net file data between two sync points; zero disables them.
    pub fn interval_bytes(self) -> u64 {
        self.interval_kb as u64 * 1024
    }
}

bitflags! {
    /// `PI_31`: logical record format mask. An empty mask means
    /// fixed-length, non-spanned records.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RecordFormat: u8 {
        /// Records are variable-length.
        const VARIABLE = 0b1000_0000;
        /// A record may span transport entities.
        const SPANNED  = 0b0100_0000;
    }
}

fn num_from_be(raw: &[u8]) -> Option<u64> {
    if raw.is_empty() || raw.len() > 8 {
        return None;
    }
    let mut out = [0u8; 8];
    out[8 - raw.len()..].copy_from_slice(raw);
    Some(u64::from_be_bytes(out))
}

fn num_to_be(value: u64, width: usize) -> Bytes {
    let be = value.to_be_bytes();
    Bytes::copy_from_slice(&be[8 - width..])
}

impl ParamList {
    pub fn put_code(&mut self, pi: Pi, value: u8) -> &mut Self {
        self.push(Param { pi: pi.code(), value: Bytes::copy_from_slice(&[value]) })
    }

    pub fn code_of(&self, pi: Pi) -> Option<u8> {
        match self.get(pi)?.as_ref() {
            [v] => Some(*v),
            _ => None,
        }
    }

    /// Encode `value` right-justified at the catalog width of `pi`.
    pub fn put_num(&mut self, pi: Pi, value: u64) -> &mut Self {
        self.push(Param { pi: pi.code(), value: num_to_be(value, pi.width()) })
    }

    pub fn num(&self, pi: Pi) -> Option<u64> {
        num_from_be(self.get(pi)?)
    }

    /// Encode a character string, truncated at the catalog bound and
    /// translated when the session negotiated EBCDIC.
    pub fn put_str(&mut self, pi: Pi, s: &str, coding: Coding) -> &mut Self {
        let bound = s.as_bytes().len().min(pi.width());
        let raw = &s.as_bytes()[..bound];
        let value = match coding {
            Coding::Ascii => Bytes::copy_from_slice(raw),
            Coding::Ebcdic => Bytes::from(ebcdic::encode(raw)),
        };
        self.push(Param { pi: pi.code(), value })
    }

    pub fn str_of(&self, pi: Pi, coding: Coding) -> Option<String> {
        let raw = self.get(pi)?;
        let bytes = match coding {
            Coding::Ascii => raw.to_vec(),
            Coding::Ebcdic => ebcdic::decode(raw),
        };
        String::from_utf8(bytes).ok()
    }

    pub fn put_date(&mut self, pi: Pi, at: NaiveDateTime) -> &mut Self {
        let s = at.format("%Y%m%d%H%M").to_string();
        self.push(Param { pi: pi.code(), value: Bytes::from(s.into_bytes()) })
    }

    pub fn date(&self, pi: Pi) -> Option<NaiveDateTime> {
        let raw = self.get(pi)?;
        let s = std::str::from_utf8(raw).ok()?;
        NaiveDateTime::parse_from_str(s, "%Y%m%d%H%M").ok()
    }

    pub fn put_diag(&mut self, code: DiagCode) -> &mut Self {
        self.push(Param {
            pi: Pi::Diagnostic.code(),
            value: Bytes::copy_from_slice(&code.to_wire()),
        })
    }

    pub fn diag(&self) -> Option<DiagCode> {
        DiagCode::from_wire(self.get(Pi::Diagnostic)?)
    }

    pub fn put_sync_config(&mut self, cfg: SyncConfig) -> &mut Self {
        self.push(Param {
            pi: Pi::SyncConfig.code(),
            value: Bytes::copy_from_slice(&cfg.to_wire()),
        })
    }

    pub fn sync_config(&self) -> Option<SyncConfig> {
        SyncConfig::from_wire(self.get(Pi::SyncConfig)?)
    }

    pub fn put_record_format(&mut self, fmt: RecordFormat) -> &mut Self {
        self.push(Param {
            pi: Pi::RecordFormat.code(),
            value: Bytes::copy_from_slice(&[fmt.bits()]),
        })
    }

    pub fn record_format(&self) -> Option<RecordFormat> {
        self.code_of(Pi::RecordFormat)
            .map(RecordFormat::from_bits_truncate)
    }

    pub fn data_code(&self) -> Option<DataCode> {
        DataCode::from_code(self.code_of(Pi::DataCode)?)
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The PI / PGI catalog for the Hors-SIT profile.
//!
//! Each parameter identifier is one byte. Identifiers are typed:
//!
//! * `S`: one-byte code
//! * `A`: ASCII digits
//! * `C`: character string (ASCII or EBCDIC per session coding)
//! * `N`: right-justified big-endian binary integer
//! * `D`: twelve-byte `YYYYMMDDhhmm` date
//! * `M`: packed bit-mask
//!
//! `PI_07` is the one outlier: its three bytes are a raw structure
//! (flag byte plus a big-endian KB count, see
//! [`SyncConfig`](crate::params::values::SyncConfig)), not digits.
//!
//! Group identifiers (PGI) share the id space with PIs; the profile keeps
//! them disjoint, so a single byte is enough to dispatch.

/// Wire type of a parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PiKind {
    Code,
    Digits,
    Chars,
    Num,
    Date,
    Mask,
    /// Structured raw bytes with their own codec (`PI_07`).
    Raw,
}

/// Parameter identifiers supported by this profile.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pi {
    Crc = 1,
    Diagnostic = 2,
    Demander = 3,
    Server = 4,
    AccessControl = 5,
    Version = 6,
    SyncConfig = 7,
    FileType = 11,
    Filename = 12,
    TransferId = 13,
    DataCode = 16,
    Priority = 17,
    RestartPoint = 18,
    EndCode = 19,
    SyncNumber = 20,
    AccessType = 22,
    Resync = 23,
    MaxEntitySize = 25,
    FileSize = 27,
    RecordCount = 28,
    RecordFormat = 31,
    RecordLength = 32,
    Organization = 33,
    Signature = 34,
    Label = 37,
    KeyLength = 38,
    KeyOffset = 39,
    ReservationUnit = 41,
    MaxReservation = 42,
    CreationDate = 51,
    ExtractionDate = 52,
    MessageBody = 61,
    MessageLength = 62,
}

impl Pi {
    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => Self::Crc,
            2 => Self::Diagnostic,
            3 => Self::Demander,
            4 => Self::Server,
            5 => Self::AccessControl,
            6 => Self::Version,
            7 => Self::SyncConfig,
            11 => Self::FileType,
            12 => Self::Filename,
            13 => Self::TransferId,
            16 => Self::DataCode,
            17 => Self::Priority,
            18 => Self::RestartPoint,
            19 => Self::EndCode,
            20 => Self::SyncNumber,
            22 => Self::AccessType,
            23 => Self::Resync,
            25 => Self::MaxEntitySize,
            27 => Self::FileSize,
            28 => Self::RecordCount,
            31 => Self::RecordFormat,
            32 => Self::RecordLength,
            33 => Self::Organization,
            34 => Self::Signature,
            37 => Self::Label,
            38 => Self::KeyLength,
            39 => Self::KeyOffset,
            41 => Self::ReservationUnit,
            42 => Self::MaxReservation,
            51 => Self::CreationDate,
            52 => Self::ExtractionDate,
            61 => Self::MessageBody,
            62 => Self::MessageLength,
            _ => return None,
        })
    }

    pub const fn kind(self) -> PiKind {
        match self {
            Self::Crc
            | Self::DataCode
            | Self::Priority
            | Self::EndCode
            | Self::AccessType
            | Self::Resync
            | Self::Organization => PiKind::Code,
            Self::Diagnostic => PiKind::Digits,
            Self::SyncConfig => PiKind::Raw,
            Self::Demander
            | Self::Server
            | Self::AccessControl
            | Self::Filename
            | Self::Signature
            | Self::Label
            | Self::MessageBody => PiKind::Chars,
            Self::Version
            | Self::FileType
            | Self::TransferId
            | Self::RestartPoint
            | Self::SyncNumber
            | Self::MaxEntitySize
            | Self::FileSize
            | Self::RecordCount
            | Self::RecordLength
            | Self::KeyLength
            | Self::KeyOffset
            | Self::ReservationUnit
            | Self::MaxReservation
            | Self::MessageLength => PiKind::Num,
            Self::CreationDate | Self::ExtractionDate => PiKind::Date,
            Self::RecordFormat => PiKind::Mask,
        }
    }

    /// Encoded width for `N`-typed values, fixed length for the rest where
    /// the profile fixes one, or the upper bound for strings.
    pub const fn width(self) -> usize {
        match self {
            Self::Crc
            | Self::DataCode
            | Self::Priority
            | Self::EndCode
            | Self::AccessType
            | Self::Resync
            | Self::Organization
            | Self::RecordFormat => 1,
            Self::Diagnostic | Self::SyncConfig => 3,
            Self::Version
            | Self::FileType
            | Self::MaxEntitySize
            | Self::RecordLength
            | Self::KeyLength
            | Self::KeyOffset
            | Self::ReservationUnit => 2,
            Self::TransferId | Self::RestartPoint | Self::SyncNumber => 3,
            Self::RecordCount | Self::MaxReservation | Self::MessageLength => 4,
            Self::FileSize => 8,
            Self::CreationDate | Self::ExtractionDate => 12,
            Self::AccessControl => 16,
            Self::Demander | Self::Server | Self::Filename => 24,
            Self::Signature | Self::Label => 80,
            Self::MessageBody => 254,
        }
    }
}

/// Parameter-group identifiers.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pgi {
    /// `PI_03`/`PI_04`/`PI_11`/`PI_12`: who transfers which file.
    FileIdentity = 9,
    /// `PI_31`/`PI_32`/`PI_33`/`PI_34`/`PI_37`/`PI_38`/`PI_39`.
    LogicalAttributes = 30,
    /// `PI_41`/`PI_42`.
    PhysicalAttributes = 40,
    /// `PI_51`/`PI_52`.
    HistoricalAttributes = 50,
}

impl Pgi {
    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            9 => Self::FileIdentity,
            30 => Self::LogicalAttributes,
            40 => Self::PhysicalAttributes,
            50 => Self::HistoricalAttributes,
            _ => return None,
        })
    }
}

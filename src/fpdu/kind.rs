// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The closed FPDU set of the Hors-SIT profile.
//!
//! A frame is identified by its `(phase, type)` byte pair. ACK type codes
//! occupy `0x30..=0x3B`; six of them happen to be request + `0x20`, the
//! other six do not, so conversions always go through the tables below and
//! never through arithmetic.

use thiserror::Error;

/// Phase byte of the FPDU header.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Session = 0x40,
    File = 0xC0,
    Data = 0x00,
}

/// Returned when the `(phase, type)` pair is outside the profile set.
#[derive(Debug, Error)]
#[error("unknown FPDU: phase 0x{phase:02x} type 0x{ty:02x}")]
pub struct UnknownFpdu {
    pub phase: u8,
    pub ty: u8,
}

/// Every FPDU of the profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FpduKind {
    // Session phase
    Connect,
    Aconnect,
    Rconnect,
    Release,
    Relconf,
    Abort,
    // File phase, requests
    Read,
    Write,
    Syn,
    DtfEnd,
    Resyn,
    Idt,
    TransEnd,
    Create,
    Select,
    Deselect,
    Open,
    Close,
    Msg,
    Msgdm,
    Msgmm,
    Msgfm,
    // File phase, acknowledgements
    AckTransEnd,
    AckCreate,
    AckSelect,
    AckDeselect,
    AckOpen,
    AckClose,
    AckMsg,
    AckRead,
    AckWrite,
    AckSyn,
    AckResyn,
    AckIdt,
    // Data phase
    Dtf,
    Dtfma,
    Dtfda,
    Dtffa,
}

macro_rules! fpdu_table {
    ($( $kind:ident = ($phase:ident, $ty:literal) ),+ $(,)?) => {
        impl FpduKind {
            pub const fn phase(self) -> Phase {
                match self {
                    $( FpduKind::$kind => Phase::$phase, )+
                }
            }

            pub const fn type_code(self) -> u8 {
                match self {
                    $( FpduKind::$kind => $ty, )+
                }
            }

            pub fn from_wire(phase: u8, ty: u8) -> Result<Self, UnknownFpdu> {
                match (phase, ty) {
                    $( (p, $ty) if p == Phase::$phase as u8 => Ok(FpduKind::$kind), )+
                    _ => Err(UnknownFpdu { phase, ty }),
                }
            }
        }
    };
}

fpdu_table! {
    Connect     = (Session, 0x20),
    Aconnect    = (Session, 0x21),
    Rconnect    = (Session, 0x22),
    Release     = (Session, 0x23),
    Relconf     = (Session, 0x24),
    Abort       = (Session, 0x25),
    Read        = (File, 0x01),
    Write       = (File, 0x02),
    Syn         = (File, 0x03),
    DtfEnd      = (File, 0x04),
    Resyn       = (File, 0x05),
    Idt         = (File, 0x06),
    TransEnd    = (File, 0x08),
    Create      = (File, 0x11),
    Select      = (File, 0x12),
    Deselect    = (File, 0x13),
    Open        = (File, 0x14),
    Close       = (File, 0x15),
    Msg         = (File, 0x16),
    Msgdm       = (File, 0x17),
    Msgmm       = (File, 0x18),
    Msgfm       = (File, 0x19),
    AckTransEnd = (File, 0x30),
    AckCreate   = (File, 0x31),
    AckSelect   = (File, 0x32),
    AckDeselect = (File, 0x33),
    AckOpen     = (File, 0x34),
    AckClose    = (File, 0x35),
    AckMsg      = (File, 0x36),
    AckRead     = (File, 0x37),
    AckWrite    = (File, 0x38),
    AckSyn      = (File, 0x39),
    AckResyn    = (File, 0x3A),
    AckIdt      = (File, 0x3B),
    Dtf         = (Data, 0x00),
    Dtfma       = (Data, 0x40),
    Dtfda       = (Data, 0x41),
    Dtffa       = (Data, 0x42),
}

impl FpduKind {
    /// The acknowledgement paired with this request, if the protocol
    /// defines one (data-bearing frames and `DTF_END` have none).
    pub const fn ack(self) -> Option<FpduKind> {
        Some(match self {
            FpduKind::Read => FpduKind::AckRead,
            FpduKind::Write => FpduKind::AckWrite,
            FpduKind::Syn => FpduKind::AckSyn,
            FpduKind::Resyn => FpduKind::AckResyn,
            FpduKind::Idt => FpduKind::AckIdt,
            FpduKind::TransEnd => FpduKind::AckTransEnd,
            FpduKind::Create => FpduKind::AckCreate,
            FpduKind::Select => FpduKind::AckSelect,
            FpduKind::Deselect => FpduKind::AckDeselect,
            FpduKind::Open => FpduKind::AckOpen,
            FpduKind::Close => FpduKind::AckClose,
            FpduKind::Msg | FpduKind::Msgfm => FpduKind::AckMsg,
            _ => return None,
        })
    }

    pub const fn is_data(self) -> bool {
        matches!(self.phase(), Phase::Data)
    }

    pub const fn is_ack(self) -> bool {
        matches!(
            self,
            FpduKind::Aconnect
                | FpduKind::Relconf
                | FpduKind::AckTransEnd
                | FpduKind::AckCreate
                | FpduKind::AckSelect
                | FpduKind::AckDeselect
                | FpduKind::AckOpen
                | FpduKind::AckClose
                | FpduKind::AckMsg
                | FpduKind::AckRead
                | FpduKind::AckWrite
                | FpduKind::AckSyn
                | FpduKind::AckResyn
                | FpduKind::AckIdt
        )
    }
}

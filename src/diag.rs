// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Diagnostic codes (`PI_02`) and the engine error taxonomy.
//!
//! A diagnostic travels on the wire as three ASCII digits; the first digit
//! selects the family (`0` success, `1` transport, `2` file, `3`
//! connection/state) and the remaining two the detail. Every fatal path in
//! the engine maps to exactly one `DiagCode`, which ends up in the `PI_02`
//! parameter of the `ABORT` / `RCONNECT` / `TRANS_END` that reports it.

use core::fmt;

use thiserror::Error;

/// A three-digit PeSIT diagnostic, e.g. `3.399`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagCode(pub u16);

impl DiagCode {
    pub const SUCCESS: DiagCode = DiagCode(0);
    /// Transport or ACK-wait timeout.
    pub const TRANSPORT_TIMEOUT: DiagCode = DiagCode(100);
    /// Received record longer than the negotiated record length.
    pub const RECORD_TOO_LONG: DiagCode = DiagCode(220);
    /// Sync-point numbering violated and resynchronization failed.
    pub const SYNC_VIOLATION: DiagCode = DiagCode(222);
    /// More bytes received than announced in `PI_27`.
    pub const SIZE_EXCEEDED: DiagCode = DiagCode(224);
    /// Storage object missing or unusable.
    pub const FILE_NOT_FOUND: DiagCode = DiagCode(230);
    /// Partner unknown, disabled, or password mismatch.
    pub const AUTH_FAILURE: DiagCode = DiagCode(300);
    /// Incompatible negotiation (`PI_06` / `PI_25` / `PI_16`).
    pub const BAD_VERSION: DiagCode = DiagCode(322);
    /// Generic protocol violation (malformed frame, bad transition).
    pub const PROTOCOL_VIOLATION: DiagCode = DiagCode(399);

    /// Parse the 3-ASCII-digit wire form.
    pub fn from_wire(raw: &[u8]) -> Option<Self> {
        if raw.len() != 3 || !raw.iter().all(u8::is_ascii_digit) {
            return None;
        }
        let n = (raw[0] - b'0') as u16 * 100
            + (raw[1] - b'0') as u16 * 10
            + (raw[2] - b'0') as u16;
        Some(DiagCode(n))
    }

    /// The 3-ASCII-digit wire form.
    pub fn to_wire(self) -> [u8; 3] {
        let n = self.0.min(999);
        [
            b'0' + (n / 100) as u8,
            b'0' + (n / 10 % 10) as u8,
            b'0' + (n % 10) as u8,
        ]
    }

    pub fn is_success(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03}", self.0 / 100, self.0)
    }
}

/// Typed failure surface of the protocol engine.
///
/// The disposition of every kind follows the failure table of the design:
/// most are fatal and answered with an `ABORT` carrying `code()`;
/// `TransportError` is local-only (the stream is already unusable);
/// `SyncViolation` is retried once through `RESYN` before turning fatal;
/// `TransferEnd` is not a protocol failure at all but the peer's verdict,
/// surfaced to the caller.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("protocol violation: {0}")]
    StateViolation(String),

    #[error("negotiation failure: {0}")]
    NegotiationFailure(String),

    #[error("authentication rejected: {0}")]
    Authentication(String),

    #[error("negotiated limit exceeded: {what}")]
    LimitExceeded { what: String, code: DiagCode },

    #[error("sync-point violation: expected {expected}, got {got}")]
    SyncViolation { expected: u32, got: u32 },

    #[error("storage failure: {0}")]
    StorageError(#[source] std::io::Error),

    #[error("transport failure: {0}")]
    TransportError(#[source] std::io::Error),

    #[error("{label} timed out")]
    Timeout { label: &'static str },

    #[error("session cancelled")]
    Cancelled,

    #[error("peer ended transfer with diagnostic {code}")]
    TransferEnd { code: DiagCode },

    /// Peer refused or tore the session down (`RCONNECT` / `ABORT`).
    #[error("peer aborted with diagnostic {code}")]
    PeerAbort { code: DiagCode },
}

impl EngineError {
    /// The `PI_02` diagnostic reported for this failure.
    pub fn code(&self) -> DiagCode {
        match self {
            EngineError::MalformedFrame(_) | EngineError::StateViolation(_) => {
                DiagCode::PROTOCOL_VIOLATION
            },
            EngineError::NegotiationFailure(_) => DiagCode::BAD_VERSION,
            EngineError::Authentication(_) => DiagCode::AUTH_FAILURE,
            EngineError::LimitExceeded { code, .. } => *code,
            EngineError::SyncViolation { .. } => DiagCode::SYNC_VIOLATION,
            EngineError::StorageError(_) => DiagCode::FILE_NOT_FOUND,
            EngineError::TransportError(_)
            | EngineError::Timeout { .. }
            | EngineError::Cancelled => DiagCode::TRANSPORT_TIMEOUT,
            EngineError::TransferEnd { code } | EngineError::PeerAbort { code } => *code,
        }
    }

    /// Whether the sync/restart path may absorb this error with a `RESYN`.
    pub fn is_retriable(&self) -> bool {
        matches!(self, EngineError::SyncViolation { .. })
    }

    /// Local-only failures: no `ABORT` can or should be sent.
    pub fn is_local_only(&self) -> bool {
        matches!(
            self,
            EngineError::TransportError(_)
                | EngineError::Cancelled
                | EngineError::PeerAbort { .. }
        )
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

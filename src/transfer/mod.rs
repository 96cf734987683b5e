// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The data-transfer phase: entity ↔ article translation, checkpointing,
//! and the two streaming loops that drive it.

/// Packing records into entities and reassembling them.
pub mod articles;
/// Receive-side loop.
pub mod receiver;
/// Send-side loop.
pub mod sender;
/// Sync-point accounting and restart.
pub mod sync_point;

use crate::params::{DataCode, RecordFormat};

/// A durable checkpoint the caller can restart a transfer from.
///
/// `sync_num` is what travels in `PI_18`; the byte offset is local
/// knowledge each side recorded when the checkpoint was acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPoint {
    pub sync_num: u32,
    pub byte_offset: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Receive,
}

/// Everything agreed about one file transfer before data flows.
///
/// Created at `CREATE`/`SELECT`, destroyed at `DESELECT`. The context
/// exclusively owns its storage stream for the whole data phase.
#[derive(Debug, Clone)]
pub struct TransferContext {
    /// `PI_13`.
    pub transfer_id: u32,
    /// `PI_12`: virtual filename.
    pub filename: String,
    pub direction: Direction,
    /// `PI_32`; zero means free-form streamed records.
    pub record_length: u16,
    /// `PI_31`.
    pub record_format: RecordFormat,
    /// `PI_16`.
    pub data_code: DataCode,
    /// `PI_27` as announced at `CREATE`/`OPEN`, when known.
    pub file_size: Option<u64>,
    /// Set when resuming from a checkpoint (`PI_18`).
    pub restart: Option<RestartPoint>,
}

impl TransferContext {
    pub fn start_offset(&self) -> u64 {
        self.restart.map(|r| r.byte_offset).unwrap_or(0)
    }

    pub fn start_sync_num(&self) -> u32 {
        self.restart.map(|r| r.sync_num).unwrap_or(0)
    }
}

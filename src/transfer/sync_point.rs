// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Sync-point accounting.
//!
//! `PI_20` numbers are strictly monotonic per transfer, starting at 1 (or
//! one past the restart checkpoint). Both sides keep the history of
//! `(sync number, byte offset)` pairs so a `RESYN` can agree on any
//! previously confirmed point, not just the newest one.

use crate::{
    diag::{EngineError, EngineResult},
    transfer::RestartPoint,
};

/// Checkpoint and interval bookkeeping for one direction of one transfer.
#[derive(Debug, Clone)]
pub struct SyncTracker {
    /// Net file bytes between sync points; zero disables them.
    interval: u64,
    last_sync_num: u32,
    bytes_at_last_sync: u64,
    bytes_since_last_sync: u64,
    /// Absolute position in the file.
    position: u64,
    /// Confirmed checkpoints, oldest first. Starts with the restart
    /// point (or the implicit point 0 at offset 0).
    history: Vec<RestartPoint>,
}

impl SyncTracker {
    pub fn new(interval_bytes: u64) -> Self {
        Self::resume(
            interval_bytes,
            RestartPoint { sync_num: 0, byte_offset: 0 },
        )
    }

    /// Resume numbering after the given confirmed checkpoint.
    pub fn resume(interval_bytes: u64, from: RestartPoint) -> Self {
        Self {
            interval: interval_bytes,
            last_sync_num: from.sync_num,
            bytes_at_last_sync: from.byte_offset,
            bytes_since_last_sync: 0,
            position: from.byte_offset,
            history: vec![from],
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn last_sync_num(&self) -> u32 {
        self.last_sync_num
    }

    /// The newest confirmed checkpoint.
    pub fn checkpoint(&self) -> RestartPoint {
        RestartPoint {
            sync_num: self.last_sync_num,
            byte_offset: self.bytes_at_last_sync,
        }
    }

    /// Account `n` net file bytes moved.
    pub fn account(&mut self, n: u64) {
        self.position += n;
        self.bytes_since_last_sync += n;
    }

    /// Whether the interval policy asks for a sync point now.
    pub fn due(&self) -> bool {
        self.interval > 0 && self.bytes_since_last_sync >= self.interval
    }

    /// Sender side: mint the next sync point to put on the wire.
    pub fn emit(&mut self) -> RestartPoint {
        self.last_sync_num += 1;
        self.bytes_at_last_sync = self.position;
        self.bytes_since_last_sync = 0;
        let point = self.checkpoint();
        self.history.push(point);
        point
    }

    /// Sender side: match an `ACK_SYN` against the awaited number.
    pub fn confirm(&self, acked: u32) -> EngineResult<()> {
        if acked == self.last_sync_num {
            Ok(())
        } else {
            Err(EngineError::SyncViolation { expected: self.last_sync_num, got: acked })
        }
    }

    /// Receiver side: admit the next sync point from the wire. Numbers
    /// must grow strictly.
    pub fn record(&mut self, num: u32) -> EngineResult<()> {
        if num <= self.last_sync_num {
            return Err(EngineError::SyncViolation {
                expected: self.last_sync_num + 1,
                got: num,
            });
        }
        self.last_sync_num = num;
        self.bytes_at_last_sync = self.position;
        self.bytes_since_last_sync = 0;
        self.history.push(self.checkpoint());
        Ok(())
    }

    /// Agree on the newest confirmed checkpoint at or below `num`, wind
    /// the tracker back to it, and return it. `None` when no such point
    /// was ever confirmed.
    pub fn rewind(&mut self, num: u32) -> Option<RestartPoint> {
        let idx = self
            .history
            .iter()
            .rposition(|p| p.sync_num <= num)?;
        self.history.truncate(idx + 1);
        let point = self.history[idx];
        self.last_sync_num = point.sync_num;
        self.bytes_at_last_sync = point.byte_offset;
        self.bytes_since_last_sync = 0;
        self.position = point.byte_offset;
        Some(point)
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Partner admission.
//!
//! The server consults a [`PartnerLookup`] exactly once while handling
//! `CONNECT`. The capability is read-mostly and must be safe to call from
//! every session task; [`Partners`] is the bundled concurrent
//! implementation with live-session counting.

use std::sync::Arc;

use dashmap::DashMap;

/// One configured remote partner.
#[derive(Debug, Clone)]
pub struct Partner {
    pub password: Vec<u8>,
    pub max_sessions: u32,
    pub enabled: bool,
}

/// Read-side capability resolved during `CONNECT` handling.
pub trait PartnerLookup: Send + Sync {
    fn lookup_partner(&self, id: &str) -> Option<Partner>;
}

/// Compare a presented password against the stored one without leaking
/// the mismatch position through timing.
pub fn password_matches(presented: &[u8], stored: &[u8]) -> bool {
    let mut diff = presented.len() ^ stored.len();
    for i in 0..stored.len().max(presented.len()) {
        let a = presented.get(i).copied().unwrap_or(0);
        let b = stored.get(i).copied().unwrap_or(0);
        diff |= (a ^ b) as usize;
    }
    diff == 0
}

/// In-memory partner directory with per-partner live-session caps.
#[derive(Debug, Default)]
pub struct Partners {
    entries: DashMap<String, Partner>,
    live: DashMap<String, u32>,
}

impl Partners {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, id: impl Into<String>, partner: Partner) {
        self.entries.insert(id.into(), partner);
    }

    /// Count a new session against `id`'s cap; the permit releases the
    /// slot when dropped.
    pub fn try_acquire(self: &Arc<Self>, id: &str) -> Option<SessionPermit> {
        let partner = self.entries.get(id)?;
        let max = partner.max_sessions;
        drop(partner);

        let mut slot = self.live.entry(id.to_string()).or_insert(0);
        if *slot >= max {
            return None;
        }
        *slot += 1;
        drop(slot);
        Some(SessionPermit { directory: Arc::clone(self), id: id.to_string() })
    }

    pub fn live_sessions(&self, id: &str) -> u32 {
        self.live.get(id).map(|v| *v).unwrap_or(0)
    }
}

impl PartnerLookup for Partners {
    fn lookup_partner(&self, id: &str) -> Option<Partner> {
        self.entries.get(id).map(|p| p.value().clone())
    }
}

impl PartnerLookup for Arc<Partners> {
    fn lookup_partner(&self, id: &str) -> Option<Partner> {
        self.as_ref().lookup_partner(id)
    }
}

/// Holds one live-session slot of a partner.
#[derive(Debug)]
pub struct SessionPermit {
    directory: Arc<Partners>,
    id: String,
}

impl Drop for SessionPermit {
    fn drop(&mut self) {
        if let Some(mut slot) = self.directory.live.get_mut(&self.id) {
            *slot = slot.saturating_sub(1);
        }
    }
}

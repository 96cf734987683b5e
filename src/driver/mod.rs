// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! High-level orchestration: the library API embedders call.
//!
//! The demander side opens sessions and pushes or pulls files; the server
//! side admits sessions and answers them. Both sit strictly above the
//! session layer: every wire interaction still flows through the state
//! machine, so a driver bug cannot emit an illegal FPDU.

/// Demander-side operations.
pub mod demander;
/// Server-side operations.
pub mod server;

pub use demander::{Demander, TransferOptions, open_session};
pub use server::{ServeSummary, ServerSession, TransferRecord, accept_session};

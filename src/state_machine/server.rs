// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Server-side states, mirroring the demander with a `B` suffix.
//!
//! The server has two receive-side substate pairs the demander lacks:
//! `TDE03B/TDE04B` for sync-point and resynchronization handling and
//! `TDE05B/TDE06B` for a transfer interrupted by `IDT` (with the same
//! pairs in the `TDL` read subtree, where the server is the data sender).

use crate::state_machine::transition_table;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Idle, listening.
    Cn01B,
    /// `CONNECT` received, admission pending.
    Cn02B,
    /// Session established.
    Cn03B,
    /// `RELEASE` received, owing `RELCONF`.
    Cn04B,
    /// Message received, owing `ACK_MSG`.
    Msg01B,
    /// Segmented message incoming.
    Msg02B,
    /// `CREATE` received, owing `ACK_CREATE`.
    Sf01B,
    /// `SELECT` received, owing `ACK_SELECT`.
    Sf02B,
    /// File selected.
    Sf03B,
    /// `DESELECT` received, owing `ACK_DESELECT`.
    Sf04B,
    /// `OPEN` received, owing `ACK_OPEN`.
    Of01B,
    /// File open, no transfer running.
    Of02B,
    /// `CLOSE` received, owing `ACK_CLOSE`.
    Of03B,
    /// `WRITE` received, owing `ACK_WRITE`.
    Tde01B,
    /// Consuming data entities.
    Tde02B,
    /// `SYN` received, owing `ACK_SYN`.
    Tde03B,
    /// `RESYN` received, owing `ACK_RESYN`.
    Tde04B,
    /// `IDT` received, owing `ACK_IDT`.
    Tde05B,
    /// Write transfer interrupted; file still open.
    Tde06B,
    /// `DTF_END` received.
    Tde07B,
    /// `TRANS_END` received, owing `ACK_TRANS_END`.
    Tde08B,
    /// `READ` received, owing `ACK_READ`.
    Tdl01B,
    /// Emitting data entities.
    Tdl02B,
    /// `SYN` sent, awaiting `ACK_SYN`.
    Tdl03B,
    /// `RESYN` sent, awaiting `ACK_RESYN`.
    Tdl04B,
    /// `IDT` received while sending, owing `ACK_IDT`.
    Tdl05B,
    /// Read transfer interrupted; file still open.
    Tdl06B,
    /// `DTF_END` sent.
    Tdl07B,
    /// `TRANS_END` sent, awaiting `ACK_TRANS_END`.
    Tdl08B,
    Error,
}

transition_table! {
    ServerState, Cn01B, Error {
        Cn01B: { Recv(Connect) => Cn02B }
        Cn02B: {
            Send(Aconnect) => Cn03B,
            Send(Rconnect) => Error,
        }
        Cn03B: {
            Recv(Create) => Sf01B,
            Recv(Select) => Sf02B,
            Recv(Release) => Cn04B,
            Recv(Msg) => Msg01B,
            Recv(Msgdm) => Msg02B,
        }
        Cn04B: { Send(Relconf) => Cn01B }
        Msg01B: { Send(AckMsg) => Cn03B }
        Msg02B: {
            Recv(Msgmm) => Msg02B,
            Recv(Msgfm) => Msg01B,
        }
        Sf01B: { Send(AckCreate) => Sf03B }
        Sf02B: { Send(AckSelect) => Sf03B }
        Sf03B: {
            Recv(Open) => Of01B,
            Recv(Deselect) => Sf04B,
        }
        Sf04B: { Send(AckDeselect) => Cn03B }
        Of01B: { Send(AckOpen) => Of02B }
        Of02B: {
            Recv(Write) => Tde01B,
            Recv(Read) => Tdl01B,
            Recv(Close) => Of03B,
        }
        Of03B: { Send(AckClose) => Sf03B }
        Tde01B: { Send(AckWrite) => Tde02B }
        Tde02B: {
            Recv(Dtf) => Tde02B,
            Recv(Dtfda) => Tde02B,
            Recv(Dtfma) => Tde02B,
            Recv(Dtffa) => Tde02B,
            Recv(Syn) => Tde03B,
            Recv(Resyn) => Tde04B,
            Recv(DtfEnd) => Tde07B,
            Recv(Idt) => Tde05B,
        }
        Tde03B: {
            Send(AckSyn) => Tde02B,
            Recv(Resyn) => Tde04B,
        }
        Tde04B: { Send(AckResyn) => Tde02B }
        Tde05B: { Send(AckIdt) => Tde06B }
        Tde06B: {
            Recv(Write) => Tde01B,
            Recv(Read) => Tdl01B,
            Recv(Close) => Of03B,
        }
        Tde07B: { Recv(TransEnd) => Tde08B }
        Tde08B: { Send(AckTransEnd) => Of02B }
        Tdl01B: { Send(AckRead) => Tdl02B }
        Tdl02B: {
            Send(Dtf) => Tdl02B,
            Send(Dtfda) => Tdl02B,
            Send(Dtfma) => Tdl02B,
            Send(Dtffa) => Tdl02B,
            Send(Syn) => Tdl03B,
            Send(DtfEnd) => Tdl07B,
            Send(Resyn) => Tdl04B,
            Recv(Idt) => Tdl05B,
        }
        Tdl03B: {
            Recv(AckSyn) => Tdl02B,
            Send(Resyn) => Tdl04B,
            Recv(Idt) => Tdl05B,
        }
        Tdl04B: { Recv(AckResyn) => Tdl02B }
        Tdl05B: { Send(AckIdt) => Tdl06B }
        Tdl06B: {
            Recv(Write) => Tde01B,
            Recv(Read) => Tdl01B,
            Recv(Close) => Of03B,
        }
        Tdl07B: { Send(TransEnd) => Tdl08B }
        Tdl08B: { Recv(AckTransEnd) => Of02B }
    }
}

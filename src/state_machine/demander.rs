// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Demander-side states.
//!
//! The `A` suffix marks states in which the demander has a request on the
//! wire and is blocked on the peer's acknowledgement. `TDE*` is the
//! write (data-out) subtree, `TDL*` the read (data-in) subtree.

use crate::state_machine::transition_table;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemanderState {
    /// Idle, no session.
    Cn01,
    /// `CONNECT` sent, awaiting `ACONNECT`.
    Cn02A,
    /// Session established.
    Cn03,
    /// `RELEASE` sent, awaiting `RELCONF`.
    Cn04A,
    /// Message sent, awaiting `ACK_MSG`.
    Msg01A,
    /// Segmented message in flight.
    Msg02,
    /// `CREATE` sent, awaiting `ACK_CREATE`.
    Sf01A,
    /// `SELECT` sent, awaiting `ACK_SELECT`.
    Sf02A,
    /// File selected.
    Sf03,
    /// `DESELECT` sent, awaiting `ACK_DESELECT`.
    Sf04A,
    /// `OPEN` sent, awaiting `ACK_OPEN`.
    Of01A,
    /// File open, no transfer running.
    Of02,
    /// `CLOSE` sent, awaiting `ACK_CLOSE`.
    Of03A,
    /// `WRITE` sent, awaiting `ACK_WRITE`.
    Tde01A,
    /// Emitting data entities.
    Tde02A,
    /// `SYN` sent, awaiting `ACK_SYN`.
    Tde03,
    /// `RESYN` sent, awaiting `ACK_RESYN`.
    Tde04A,
    /// `IDT` sent, awaiting `ACK_IDT`.
    Tde05A,
    /// `DTF_END` sent.
    Tde07,
    /// `TRANS_END` sent, awaiting `ACK_TRANS_END`.
    Tde08A,
    /// `READ` sent, awaiting `ACK_READ`.
    Tdl01A,
    /// Consuming data entities.
    Tdl02,
    /// `SYN` received, owing `ACK_SYN`.
    Tdl03,
    /// `RESYN` received, owing `ACK_RESYN`.
    Tdl04,
    /// `IDT` received, owing `ACK_IDT`.
    Tdl05,
    /// `DTF_END` received.
    Tdl07,
    /// `TRANS_END` received, owing `ACK_TRANS_END`.
    Tdl08,
    Error,
}

transition_table! {
    DemanderState, Cn01, Error {
        Cn01: { Send(Connect) => Cn02A }
        Cn02A: { Recv(Aconnect) => Cn03 }
        Cn03: {
            Send(Create) => Sf01A,
            Send(Select) => Sf02A,
            Send(Release) => Cn04A,
            Send(Msg) => Msg01A,
            Send(Msgdm) => Msg02,
        }
        Cn04A: { Recv(Relconf) => Cn01 }
        Msg01A: { Recv(AckMsg) => Cn03 }
        Msg02: {
            Send(Msgmm) => Msg02,
            Send(Msgfm) => Msg01A,
        }
        Sf01A: { Recv(AckCreate) => Sf03 }
        Sf02A: { Recv(AckSelect) => Sf03 }
        Sf03: {
            Send(Open) => Of01A,
            Send(Deselect) => Sf04A,
        }
        Sf04A: { Recv(AckDeselect) => Cn03 }
        Of01A: { Recv(AckOpen) => Of02 }
        Of02: {
            Send(Write) => Tde01A,
            Send(Read) => Tdl01A,
            Send(Close) => Of03A,
        }
        Of03A: { Recv(AckClose) => Sf03 }
        Tde01A: { Recv(AckWrite) => Tde02A }
        Tde02A: {
            Send(Dtf) => Tde02A,
            Send(Dtfda) => Tde02A,
            Send(Dtfma) => Tde02A,
            Send(Dtffa) => Tde02A,
            Send(Syn) => Tde03,
            Send(DtfEnd) => Tde07,
            Send(Resyn) => Tde04A,
            Send(Idt) => Tde05A,
        }
        Tde03: {
            Recv(AckSyn) => Tde02A,
            Send(Resyn) => Tde04A,
        }
        Tde04A: { Recv(AckResyn) => Tde02A }
        Tde05A: { Recv(AckIdt) => Of02 }
        Tde07: { Send(TransEnd) => Tde08A }
        Tde08A: { Recv(AckTransEnd) => Of02 }
        Tdl01A: { Recv(AckRead) => Tdl02 }
        Tdl02: {
            Recv(Dtf) => Tdl02,
            Recv(Dtfda) => Tdl02,
            Recv(Dtfma) => Tdl02,
            Recv(Dtffa) => Tdl02,
            Recv(Syn) => Tdl03,
            Recv(Resyn) => Tdl04,
            Recv(DtfEnd) => Tdl07,
            Recv(Idt) => Tdl05,
            Send(Idt) => Tde05A,
        }
        Tdl03: { Send(AckSyn) => Tdl02 }
        Tdl04: { Send(AckResyn) => Tdl02 }
        Tdl05: { Send(AckIdt) => Of02 }
        Tdl07: { Recv(TransEnd) => Tdl08 }
        Tdl08: { Send(AckTransEnd) => Of02 }
    }
}

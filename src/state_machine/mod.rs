// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The two peer state machines.
//!
//! Both machines validate traffic in *both* directions: every FPDU the
//! engine is about to send and every FPDU it has received passes through
//! `transition`, and anything outside the table is a protocol violation
//! answered with `ABORT 3.399`.
//!
//! The tables live in one declaration per machine. Three rules are global
//! and sit outside the tables: a received `ABORT`, a received `RCONNECT`,
//! and a sent `ABORT` take any state to `Error`; `Error` leaves only
//! through an explicit [`reset`](demander::DemanderState::reset) back to
//! the idle state.

/// Demander (initiator) machine.
pub mod demander;
/// Server (responder) machine.
pub mod server;

use thiserror::Error;

use crate::fpdu::FpduKind;

/// One validated step: the engine either emits or accepts an FPDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Send(FpduKind),
    Recv(FpduKind),
}

/// An FPDU that the current state does not admit.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("FPDU {event:?} not admissible in state {state}")]
pub struct StateViolation {
    pub state: &'static str,
    pub event: Event,
}

/// Generates the transition function of one machine from its table.
macro_rules! transition_table {
    (
        $state:ident, $idle:ident, $error:ident {
            $( $from:ident : { $( $dir:ident($kind:ident) => $to:ident ),+ $(,)? } )+
        }
    ) => {
        impl $state {
            const fn name(self) -> &'static str {
                match self {
                    $( Self::$from => stringify!($from), )+
                    Self::$error => stringify!($error),
                }
            }

            /// Table lookup; global abort rules are handled by
            /// [`Self::transition`].
            #[allow(unreachable_patterns)]
            fn table(self, event: $crate::state_machine::Event)
                -> Result<Self, $crate::state_machine::StateViolation>
            {
                use $crate::fpdu::FpduKind::*;
                use $crate::state_machine::Event::{Recv, Send};
                match (self, event) {
                    $( $( (Self::$from, $dir($kind)) => Ok(Self::$to), )+ )+
                    (state, event) => Err($crate::state_machine::StateViolation {
                        state: state.name(),
                        event,
                    }),
                }
            }

            /// Validate one step.
            pub fn transition(self, event: $crate::state_machine::Event)
                -> Result<Self, $crate::state_machine::StateViolation>
            {
                use $crate::fpdu::FpduKind;
                use $crate::state_machine::Event;
                match event {
                    Event::Recv(FpduKind::Abort)
                    | Event::Recv(FpduKind::Rconnect)
                    | Event::Send(FpduKind::Abort) => Ok(Self::$error),
                    _ => self.table(event),
                }
            }

            /// Leave `Error` for the idle state; the only way back.
            pub fn reset(self) -> Self {
                match self {
                    Self::$error => Self::$idle,
                    other => other,
                }
            }

            pub const fn is_error(self) -> bool {
                matches!(self, Self::$error)
            }
        }
    };
}

pub(crate) use transition_table;

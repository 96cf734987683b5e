// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The session layer: one transport stream, one state machine, one task.
//!
//! A [`Session`] exclusively owns its byte stream and drives a strict
//! read-one / validate / act loop. Parallelism in this engine exists only
//! across sessions, never inside one, so there are no locks here: the
//! borrow checker enforces the single-consumer rule the protocol demands.

/// Timeout/cancellation wrappers around raw stream I/O.
pub mod link;
/// The optional 24-byte EBCDIC Hors-SIT pre-connect exchange.
pub mod preconnect;

use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
    diag::{DiagCode, EngineError, EngineResult},
    fpdu::{Fpdu, FpduCodec, FpduKind},
    params::{Coding, ParamList, SyncConfig},
    state_machine::{Event, demander::DemanderState, server::ServerState},
};

/// Any reliable byte stream will do; framing lives in the FPDU codec.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

/// Read chunk size for the transport loop.
const READ_BUF: usize = 16 * 1024;
/// Bound on the best-effort `ABORT` write during teardown.
const ABORT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub struct SessionTimeouts {
    /// Maximum quiet time on the transport before the session is dead.
    pub idle: Duration,
    /// Maximum wait for a required acknowledgement.
    pub ack_wait: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        let idle = Duration::from_secs(60);
        Self { idle, ack_wait: idle }
    }
}

/// Values agreed during `CONNECT` / `ACONNECT`.
#[derive(Debug, Clone, Copy)]
pub struct Negotiated {
    pub version: u16,
    /// `PI_25`: the largest FPDU either side may emit.
    pub max_entity: u16,
    /// `PI_07`: checkpoint interval and resync permission.
    pub sync: SyncConfig,
    pub coding: Coding,
}

impl Default for Negotiated {
    fn default() -> Self {
        Self {
            version: 2,
            max_entity: 4096,
            sync: SyncConfig::DISABLED,
            coding: Coding::Ascii,
        }
    }
}

/// Current machine of the session, by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Demander(DemanderState),
    Server(ServerState),
}

impl PeerState {
    fn transition(self, event: Event) -> EngineResult<Self> {
        match self {
            PeerState::Demander(s) => s
                .transition(event)
                .map(PeerState::Demander)
                .map_err(|v| EngineError::StateViolation(v.to_string())),
            PeerState::Server(s) => s
                .transition(event)
                .map(PeerState::Server)
                .map_err(|v| EngineError::StateViolation(v.to_string())),
        }
    }

    fn reset(self) -> Self {
        match self {
            PeerState::Demander(s) => PeerState::Demander(s.reset()),
            PeerState::Server(s) => PeerState::Server(s.reset()),
        }
    }
}

/// One protocol session over one transport stream.
#[derive(Debug)]
pub struct Session<T> {
    transport: T,
    codec: FpduCodec,
    state: PeerState,
    pub negotiated: Negotiated,
    pub timeouts: SessionTimeouts,
    cancel: CancellationToken,
}

impl<T: Transport> Session<T> {
    pub fn demander(
        transport: T,
        timeouts: SessionTimeouts,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            codec: FpduCodec::new(),
            state: PeerState::Demander(DemanderState::Cn01),
            negotiated: Negotiated::default(),
            timeouts,
            cancel,
        }
    }

    pub fn server(
        transport: T,
        timeouts: SessionTimeouts,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            codec: FpduCodec::new(),
            state: PeerState::Server(ServerState::Cn01B),
            negotiated: Negotiated::default(),
            timeouts,
            cancel,
        }
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Validate and emit one FPDU.
    pub async fn send(&mut self, fpdu: &Fpdu) -> EngineResult<()> {
        self.state = self.state.transition(Event::Send(fpdu.kind))?;
        let frame = FpduCodec::encode(fpdu)
            .map_err(|e| EngineError::MalformedFrame(e.to_string()))?;
        trace!(kind = ?fpdu.kind, len = frame.len(), "send FPDU");
        link::io_with_timeout(
            "fpdu write",
            self.transport.write_all(&frame),
            self.timeouts.idle,
            &self.cancel,
        )
        .await?;
        Ok(())
    }

    /// Receive and validate the next FPDU.
    ///
    /// An out-of-band `ABORT` or `RCONNECT` lands the machine in `Error`
    /// and surfaces as [`EngineError::PeerAbort`] carrying the peer's
    /// `PI_02`; every other unexpected kind is a state violation.
    pub async fn recv(&mut self) -> EngineResult<Fpdu> {
        self.recv_with("fpdu read", self.timeouts.idle).await
    }

    async fn recv_with(
        &mut self,
        label: &'static str,
        timeout: Duration,
    ) -> EngineResult<Fpdu> {
        loop {
            if let Some(fpdu) = self.codec.next_fpdu() {
                trace!(kind = ?fpdu.kind, "recv FPDU");
                return self.admit(fpdu);
            }
            let mut buf = [0u8; READ_BUF];
            let n = link::io_with_timeout(
                label,
                self.transport.read(&mut buf),
                timeout,
                &self.cancel,
            )
            .await?;
            if n == 0 {
                return Err(EngineError::TransportError(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "peer closed the stream",
                )));
            }
            self.codec
                .feed(&buf[..n])
                .map_err(|e| EngineError::MalformedFrame(e.to_string()))?;
        }
    }

    fn admit(&mut self, fpdu: Fpdu) -> EngineResult<Fpdu> {
        match fpdu.kind {
            FpduKind::Abort | FpduKind::Rconnect => {
                self.state = self.state.transition(Event::Recv(fpdu.kind))?;
                let code = fpdu
                    .params()
                    .and_then(ParamList::diag)
                    .unwrap_or(DiagCode::PROTOCOL_VIOLATION);
                warn!(kind = ?fpdu.kind, %code, "peer tore the session down");
                Err(EngineError::PeerAbort { code })
            },
            _ => {
                self.state = self.state.transition(Event::Recv(fpdu.kind))?;
                Ok(fpdu)
            },
        }
    }

    /// Send a request and block until its acknowledgement arrives.
    pub async fn exchange(&mut self, req: Fpdu, ack: FpduKind) -> EngineResult<Fpdu> {
        debug_assert_eq!(req.kind.ack(), Some(ack));
        self.send(&req).await?;
        self.wait_for(ack).await
    }

    /// Wait for one specific acknowledgement under the ack timeout.
    pub async fn wait_for(&mut self, ack: FpduKind) -> EngineResult<Fpdu> {
        let fpdu = self.recv_with("ack wait", self.timeouts.ack_wait).await?;
        if fpdu.kind != ack {
            // The machine admitted it (e.g. an interleaved keep-alive SYN
            // would have been rejected there already), but the pairing
            // contract is still broken.
            return Err(EngineError::StateViolation(format!(
                "expected {ack:?}, peer sent {:?}",
                fpdu.kind
            )));
        }
        Ok(fpdu)
    }

    /// Best-effort `ABORT` with diagnostic, then machine reset. Transport
    /// errors during teardown are swallowed: the stream is dead anyway.
    pub async fn abort(&mut self, code: DiagCode) {
        let mut params = ParamList::new();
        params.put_diag(code);
        let fpdu = Fpdu::control(FpduKind::Abort, params);
        if let Ok(next) = self.state.transition(Event::Send(FpduKind::Abort)) {
            self.state = next;
        }
        if let Ok(frame) = FpduCodec::encode(&fpdu) {
            let res = link::io_with_timeout(
                "abort write",
                self.transport.write_all(&frame),
                ABORT_WRITE_TIMEOUT,
                &self.cancel,
            )
            .await;
            if let Err(e) = res {
                debug!("abort write failed: {e}");
            }
        }
        self.state = self.state.reset();
    }

    /// Report a failure to the peer per the failure table, then surface
    /// it. Local-only failures skip the wire.
    pub async fn fail(&mut self, err: EngineError) -> EngineError {
        if !err.is_local_only() {
            self.abort(err.code()).await;
        } else {
            self.state = self.state.reset();
        }
        err
    }

    /// Flush-and-close the write side, ending the conversation cleanly.
    pub async fn shutdown(&mut self) -> EngineResult<()> {
        self.transport
            .shutdown()
            .await
            .map_err(EngineError::TransportError)
    }

    pub(crate) fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub(crate) fn feed_codec(&mut self, bytes: &Bytes) -> EngineResult<()> {
        self.codec
            .feed(bytes)
            .map_err(|e| EngineError::MalformedFrame(e.to_string()))
    }
}

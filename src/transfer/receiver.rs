// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The receive-side data loop, shared by the server-write and
//! demander-read directions.

use tokio::io::{AsyncSeekExt, AsyncWriteExt, SeekFrom};
use tracing::{debug, trace, warn};

use crate::{
    diag::{DiagCode, EngineError, EngineResult},
    fpdu::{Fpdu, FpduKind},
    params::{ParamList, Pi},
    session::{Session, Transport, link},
    storage::ByteSink,
    transfer::{
        RestartPoint, TransferContext,
        articles::EntityAssembler,
        sync_point::SyncTracker,
    },
};

/// What a completed (or interrupted) receive looked like.
#[derive(Debug, Clone)]
pub struct ReceiveOutcome {
    /// Final byte position in the sink, restart offset included.
    pub bytes: u64,
    pub records: u64,
    /// Highest sync point confirmed to the sender.
    pub sync_points: u32,
    /// The sender's verdict from `TRANS_END` (`0.000` for a clean end) or
    /// the `IDT` diagnostic when the transfer was interrupted.
    pub end_code: DiagCode,
    pub interrupted: bool,
    /// Newest confirmed checkpoint, for the caller to persist.
    pub checkpoint: RestartPoint,
}

/// Consume data entities into the sink until the sender closes the
/// transfer (or interrupts it with `IDT`).
///
/// The session must already be inside the data phase (the `WRITE` or
/// `READ` exchange done); the sink must sit at the restart offset. On a
/// clean return the machine is back at the open-file state.
pub async fn run_receive<T: Transport>(
    session: &mut Session<T>,
    ctx: &TransferContext,
    sink: &mut ByteSink,
) -> EngineResult<ReceiveOutcome> {
    let cancel = session.cancel_token();
    let idle = session.timeouts.idle;

    let mut asm = EntityAssembler::new(ctx.record_length);
    let mut sync = SyncTracker::resume(
        session.negotiated.sync.interval_bytes(),
        RestartPoint {
            sync_num: ctx.start_sync_num(),
            byte_offset: ctx.start_offset(),
        },
    );
    let mut records = 0u64;

    loop {
        let fpdu = session.recv().await?;
        match fpdu.kind {
            FpduKind::Dtf | FpduKind::Dtfda | FpduKind::Dtfma | FpduKind::Dtffa => {
                for record in asm.accept(&fpdu)? {
                    link::io_with_timeout(
                        "sink write",
                        sink.write_all(&record),
                        idle,
                        &cancel,
                    )
                    .await
                    .map_err(storage_side)?;
                    sync.account(record.len() as u64);
                    records += 1;

                    if let Some(declared) = ctx.file_size
                        && sync.position() > declared
                    {
                        return Err(EngineError::LimitExceeded {
                            what: format!(
                                "{} bytes received, {declared} announced",
                                sync.position()
                            ),
                            code: DiagCode::SIZE_EXCEEDED,
                        });
                    }
                }
            },
            FpduKind::Syn => {
                // Data-less keep-alive SYNs are as valid as any other.
                let num = fpdu
                    .params()
                    .and_then(|p| p.num(Pi::SyncNumber))
                    .unwrap_or(0) as u32;
                link::io_with_timeout("sink flush", sink.flush(), idle, &cancel)
                    .await
                    .map_err(storage_side)?;
                sync.record(num)?;
                trace!(num, position = sync.position(), "sync point confirmed");

                let mut params = ParamList::new();
                params.put_num(Pi::SyncNumber, num as u64);
                params.put_num(Pi::FileSize, sync.position());
                session.send(&Fpdu::control(FpduKind::AckSyn, params)).await?;
            },
            FpduKind::Resyn => {
                let requested = fpdu
                    .params()
                    .and_then(|p| p.num(Pi::SyncNumber))
                    .unwrap_or(0) as u32;
                let agreed = resynchronize(
                    session,
                    &mut sync,
                    sink,
                    requested,
                )
                .await?;
                // Whatever was mid-assembly is beyond the agreed point.
                asm = EntityAssembler::new(ctx.record_length);
                debug!(requested, agreed = agreed.sync_num, "resynchronized");
            },
            FpduKind::DtfEnd => {
                if asm.mid_record() {
                    return Err(EngineError::MalformedFrame(
                        "DTF_END inside a split record".into(),
                    ));
                }
            },
            FpduKind::TransEnd => {
                let end_code = transfer_end_code(&fpdu);
                link::io_with_timeout("sink flush", sink.flush(), idle, &cancel)
                    .await
                    .map_err(storage_side)?;

                let records = final_record_count(ctx, records, sync.position());
                let mut params = ParamList::new();
                params.put_num(Pi::RecordCount, records);
                params.put_num(Pi::FileSize, sync.position());
                session
                    .send(&Fpdu::control(FpduKind::AckTransEnd, params))
                    .await?;

                debug!(bytes = sync.position(), records, "receive complete");
                return Ok(ReceiveOutcome {
                    bytes: sync.position(),
                    records,
                    sync_points: sync.last_sync_num(),
                    end_code,
                    interrupted: false,
                    checkpoint: sync.checkpoint(),
                });
            },
            FpduKind::Idt => {
                let code = fpdu
                    .params()
                    .and_then(ParamList::diag)
                    .unwrap_or(DiagCode::SUCCESS);
                warn!(%code, "transfer interrupted by peer");
                session
                    .send(&Fpdu::control(FpduKind::AckIdt, ParamList::new()))
                    .await?;
                return Ok(ReceiveOutcome {
                    bytes: sync.position(),
                    records,
                    sync_points: sync.last_sync_num(),
                    end_code: code,
                    interrupted: true,
                    checkpoint: sync.checkpoint(),
                });
            },
            other => {
                return Err(EngineError::StateViolation(format!(
                    "{other:?} during the data phase"
                )));
            },
        }
    }
}

fn storage_side(err: EngineError) -> EngineError {
    match err {
        EngineError::TransportError(io) => EngineError::StorageError(io),
        other => other,
    }
}

fn transfer_end_code(fpdu: &Fpdu) -> DiagCode {
    let end = fpdu
        .params()
        .and_then(|p| p.code_of(Pi::EndCode))
        .unwrap_or(0);
    if end == 0 {
        DiagCode::SUCCESS
    } else {
        fpdu.params()
            .and_then(ParamList::diag)
            .unwrap_or(DiagCode::PROTOCOL_VIOLATION)
    }
}

/// Fixed-record transfers report `⌈bytes / record⌉`, which stays correct
/// across a resynchronization; streamed transfers count what arrived.
fn final_record_count(ctx: &TransferContext, counted: u64, bytes: u64) -> u64 {
    if ctx.record_length > 0 {
        bytes.div_ceil(ctx.record_length as u64)
    } else {
        counted
    }
}

/// Agree on a checkpoint at or below the requested number, reposition the
/// sink there, and acknowledge. Refusal (no such checkpoint, or resync
/// never negotiated) is fatal for the transfer.
async fn resynchronize<T: Transport>(
    session: &mut Session<T>,
    sync: &mut SyncTracker,
    sink: &mut ByteSink,
    requested: u32,
) -> EngineResult<RestartPoint> {
    if !session.negotiated.sync.resync {
        return Err(EngineError::SyncViolation { expected: 0, got: requested });
    }
    let agreed = sync.rewind(requested).ok_or(EngineError::SyncViolation {
        expected: requested,
        got: requested,
    })?;

    let cancel = session.cancel_token();
    let idle = session.timeouts.idle;
    link::io_with_timeout("sink flush", sink.flush(), idle, &cancel)
        .await
        .map_err(storage_side)?;
    link::io_with_timeout(
        "sink reseek",
        sink.seek(SeekFrom::Start(agreed.byte_offset)),
        idle,
        &cancel,
    )
    .await
    .map_err(storage_side)?;

    let mut params = ParamList::new();
    params.put_num(Pi::SyncNumber, agreed.sync_num as u64);
    params.put_num(Pi::FileSize, agreed.byte_offset);
    session
        .send(&Fpdu::control(FpduKind::AckResyn, params))
        .await?;
    Ok(agreed)
}

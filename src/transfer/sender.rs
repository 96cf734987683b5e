// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The send-side data loop, shared by the demander-write and server-read
//! directions: both machines admit the same data-phase events once the
//! transfer is running, so one loop drives either role.

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tracing::{debug, trace};

use crate::{
    diag::{EngineError, EngineResult},
    fpdu::{Fpdu, FpduKind},
    params::{ParamList, Pi},
    session::{Session, Transport, link},
    storage::ByteSource,
    transfer::{
        TransferContext, articles,
        sync_point::SyncTracker,
    },
};

/// What a completed (or interrupted) send looked like.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    /// Net file bytes shipped, restart offset included.
    pub bytes: u64,
    pub articles: u64,
    pub entities: u64,
    /// Highest acknowledged `PI_20`.
    pub sync_points: u32,
    /// Newest confirmed checkpoint, for the caller to persist.
    pub checkpoint: crate::transfer::RestartPoint,
}

/// Stream the source through the negotiated entity size until EOF, then
/// close the transfer with `DTF_END` / `TRANS_END`.
///
/// The session must already be inside the data phase (the `WRITE` or
/// `READ` exchange done); on return it is back at the open-file state.
pub async fn run_send<T: Transport>(
    session: &mut Session<T>,
    ctx: &TransferContext,
    source: &mut ByteSource,
) -> EngineResult<SendOutcome> {
    let cancel = session.cancel_token();
    let idle = session.timeouts.idle;
    let max_entity = session.negotiated.max_entity;
    let packed_cap = articles::packed_record_capacity(max_entity);
    let entity_budget = articles::split_chunk_capacity(max_entity);

    // Fixed records cut at PI_32; streamed mode fills whole entities.
    let record_len = if ctx.record_length > 0 {
        ctx.record_length as usize
    } else {
        packed_cap.max(1)
    };

    let mut sync = SyncTracker::resume(
        session.negotiated.sync.interval_bytes(),
        crate::transfer::RestartPoint {
            sync_num: ctx.start_sync_num(),
            byte_offset: ctx.start_offset(),
        },
    );
    if ctx.start_offset() > 0 {
        link::io_with_timeout(
            "source seek",
            source.seek(SeekFrom::Start(ctx.start_offset())),
            idle,
            &cancel,
        )
        .await
        .map_err(storage_side)?;
    }

    let mut out = SendOutcome {
        bytes: ctx.start_offset(),
        articles: 0,
        entities: 0,
        sync_points: ctx.start_sync_num(),
        checkpoint: sync.checkpoint(),
    };
    let mut batch: Vec<Bytes> = Vec::new();
    let mut batch_cost = 0usize;
    let mut resyn_spent = false;

    loop {
        let record =
            read_record(source, record_len, idle, &cancel).await?;
        let Some(record) = record else { break };

        if entity_budget == 0 {
            // A 6-byte entity cap cannot move a single data byte.
            return Err(EngineError::NegotiationFailure(format!(
                "entity size {max_entity} leaves no room for data"
            )));
        }

        if record.len() > packed_cap {
            flush_batch(session, &mut batch, &mut batch_cost, &mut out).await?;
            let n = record.len() as u64;
            for part in articles::split_record(&record, max_entity) {
                session.send(&part).await?;
                out.entities += 1;
            }
            out.articles += 1;
            out.bytes += n;
            sync.account(n);
        } else {
            if batch_cost + 2 + record.len() > entity_budget
                || batch.len() == u8::MAX as usize
            {
                flush_batch(session, &mut batch, &mut batch_cost, &mut out).await?;
            }
            batch_cost += 2 + record.len();
            out.articles += 1;
            out.bytes += record.len() as u64;
            sync.account(record.len() as u64);
            batch.push(record);
        }

        if sync.due() {
            flush_batch(session, &mut batch, &mut batch_cost, &mut out).await?;
            sync_exchange(session, &mut sync, source, &mut out, &mut resyn_spent)
                .await?;
        }
    }

    flush_batch(session, &mut batch, &mut batch_cost, &mut out).await?;

    session
        .send(&Fpdu::control(FpduKind::DtfEnd, ParamList::new()))
        .await?;

    let mut params = ParamList::new();
    params.put_code(Pi::EndCode, 0);
    params.put_num(Pi::RecordCount, out.articles);
    params.put_num(Pi::FileSize, out.bytes);
    let ack = session
        .exchange(
            Fpdu::control(FpduKind::TransEnd, params),
            FpduKind::AckTransEnd,
        )
        .await?;
    if let Some(received) = ack.params().and_then(|p| p.num(Pi::RecordCount)) {
        trace!(sent = out.articles, received, "peer confirmed transfer end");
    }

    out.checkpoint = sync.checkpoint();
    out.sync_points = sync.last_sync_num();
    debug!(
        bytes = out.bytes,
        articles = out.articles,
        entities = out.entities,
        "send complete"
    );
    Ok(out)
}

fn storage_side(err: EngineError) -> EngineError {
    match err {
        EngineError::TransportError(io) => EngineError::StorageError(io),
        other => other,
    }
}

/// Read one record, short at EOF; `None` once the source is drained.
async fn read_record(
    source: &mut ByteSource,
    len: usize,
    idle: std::time::Duration,
    cancel: &tokio_util::sync::CancellationToken,
) -> EngineResult<Option<Bytes>> {
    let mut buf = vec![0u8; len];
    let mut filled = 0usize;
    while filled < len {
        let n = link::io_with_timeout(
            "source read",
            source.read(&mut buf[filled..]),
            idle,
            cancel,
        )
        .await
        .map_err(storage_side)?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    if filled == 0 {
        return Ok(None);
    }
    buf.truncate(filled);
    Ok(Some(Bytes::from(buf)))
}

async fn flush_batch<T: Transport>(
    session: &mut Session<T>,
    batch: &mut Vec<Bytes>,
    batch_cost: &mut usize,
    out: &mut SendOutcome,
) -> EngineResult<()> {
    if batch.is_empty() {
        return Ok(());
    }
    let fpdu = articles::pack_entity(batch);
    session.send(&fpdu).await?;
    out.entities += 1;
    batch.clear();
    *batch_cost = 0;
    Ok(())
}

/// Emit one sync point and wait for its acknowledgement. A mismatched
/// `ACK_SYN` is retried through a single `RESYN`; a second failure is
/// fatal.
async fn sync_exchange<T: Transport>(
    session: &mut Session<T>,
    sync: &mut SyncTracker,
    source: &mut ByteSource,
    out: &mut SendOutcome,
    resyn_spent: &mut bool,
) -> EngineResult<()> {
    let point = sync.emit();
    let mut params = ParamList::new();
    params.put_num(Pi::SyncNumber, point.sync_num as u64);
    params.put_num(Pi::FileSize, point.byte_offset);
    session.send(&Fpdu::control(FpduKind::Syn, params)).await?;

    let ack = session.wait_for(FpduKind::AckSyn).await?;
    let got = ack
        .params()
        .and_then(|p| p.num(Pi::SyncNumber))
        .unwrap_or(0) as u32;

    match sync.confirm(got) {
        Ok(()) => {
            out.sync_points = sync.last_sync_num();
            out.checkpoint = sync.checkpoint();
            Ok(())
        },
        Err(err) if !*resyn_spent && session.negotiated.sync.resync => {
            *resyn_spent = true;
            debug!(%err, "sync mismatch, attempting RESYN");
            resynchronize(session, sync, source, out, got).await
        },
        Err(err) => Err(err),
    }
}

/// Wind both sides back to a checkpoint the receiver confirms.
async fn resynchronize<T: Transport>(
    session: &mut Session<T>,
    sync: &mut SyncTracker,
    source: &mut ByteSource,
    out: &mut SendOutcome,
    receiver_num: u32,
) -> EngineResult<()> {
    let mut params = ParamList::new();
    params.put_num(Pi::SyncNumber, receiver_num as u64);
    let ack = session
        .exchange(Fpdu::control(FpduKind::Resyn, params), FpduKind::AckResyn)
        .await?;

    let agreed = ack
        .params()
        .and_then(|p| p.num(Pi::SyncNumber))
        .unwrap_or(receiver_num as u64) as u32;
    let point = sync.rewind(agreed).ok_or(EngineError::SyncViolation {
        expected: agreed,
        got: receiver_num,
    })?;

    let cancel = session.cancel_token();
    link::io_with_timeout(
        "source reseek",
        source.seek(SeekFrom::Start(point.byte_offset)),
        session.timeouts.idle,
        &cancel,
    )
    .await
    .map_err(storage_side)?;

    out.bytes = point.byte_offset;
    out.sync_points = point.sync_num;
    out.checkpoint = point;
    debug!(sync_num = point.sync_num, offset = point.byte_offset, "resynchronized");
    Ok(())
}

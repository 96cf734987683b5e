// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use anyhow::{Context, Result};
use crate::auth::PartnerLookup;
use tokio::io::{AsyncSeekExt, AsyncWriteExt, SeekFrom};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    auth::{Partners, SessionPermit, password_matches},
    cfg::config::{Config, SUPPORTED_VERSION},
    diag::{DiagCode, EngineError, EngineResult},
    fpdu::{Fpdu, FpduKind},
    params::{DataCode, ParamList, Pi, RecordFormat, SyncConfig},
    session::{Session, Transport, preconnect},
    storage::ObjectStore,
    transfer::{
        Direction, RestartPoint, TransferContext,
        receiver::run_receive,
        sender::run_send,
    },
};

/// One finished (or interrupted) transfer as the server saw it.
#[derive(Debug, Clone)]
pub struct TransferRecord {
    pub filename: String,
    pub direction: Direction,
    pub bytes: u64,
    pub records: u64,
    pub end_code: DiagCode,
    pub interrupted: bool,
}

/// Everything one served session produced.
#[derive(Debug, Default)]
pub struct ServeSummary {
    pub transfers: Vec<TransferRecord>,
    pub messages: Vec<Vec<u8>>,
}

/// An admitted server-side session.
#[derive(Debug)]
pub struct ServerSession<T: Transport> {
    session: Session<T>,
    pub partner_id: String,
    _permit: SessionPermit,
}

/// Admit one inbound connection: optional pre-connect, then the
/// `CONNECT` exchange with authentication and negotiation. Refusals go
/// out as `RCONNECT` with the matching diagnostic.
pub async fn accept_session<T: Transport>(
    transport: T,
    cfg: &Config,
    partners: &Arc<Partners>,
    cancel: CancellationToken,
) -> Result<ServerSession<T>> {
    let mut session = Session::server(transport, cfg.session_timeouts(), cancel);

    let flow: EngineResult<(String, SessionPermit)> = async {
        let pre = preconnect::server_detect(&mut session).await?;

        let connect = session.recv().await?;
        let params = connect.params().ok_or_else(|| {
            EngineError::MalformedFrame("CONNECT without parameters".into())
        })?;
        let coding = session.negotiated.coding;

        let partner_id = params
            .str_of(Pi::Demander, coding)
            .or_else(|| pre.as_ref().map(|p| p.id.clone()))
            .unwrap_or_default();
        let presented = params
            .str_of(Pi::AccessControl, coding)
            .or_else(|| pre.map(|p| p.password))
            .unwrap_or_default();

        let Some(partner) = partners.lookup_partner(&partner_id) else {
            warn!(%partner_id, "unknown partner");
            return Err(EngineError::Authentication(format!(
                "partner {partner_id:?} unknown"
            )));
        };
        if !partner.enabled
            || !password_matches(presented.as_bytes(), &partner.password)
        {
            warn!(%partner_id, "partner refused");
            return Err(EngineError::Authentication(format!(
                "partner {partner_id:?} refused"
            )));
        }
        let Some(permit) = partners.try_acquire(&partner_id) else {
            warn!(%partner_id, "session cap reached");
            return Err(EngineError::Authentication(format!(
                "partner {partner_id:?} exceeded its session cap"
            )));
        };

        let version = params.num(Pi::Version).unwrap_or(0) as u16;
        if version != SUPPORTED_VERSION {
            return Err(EngineError::NegotiationFailure(format!(
                "peer version {version}, supported {SUPPORTED_VERSION}"
            )));
        }

        let theirs_entity = params
            .num(Pi::MaxEntitySize)
            .unwrap_or(cfg.negotiation.max_entity_size as u64) as u16;
        session.negotiated.version = version;
        session.negotiated.max_entity =
            theirs_entity.min(cfg.negotiation.max_entity_size);
        session.negotiated.sync =
            merge_sync(params.sync_config(), cfg.sync_config());

        let mut answer = ParamList::new();
        answer.put_num(Pi::Version, version as u64);
        answer.put_num(Pi::MaxEntitySize, session.negotiated.max_entity as u64);
        answer.put_sync_config(session.negotiated.sync);
        session
            .send(&Fpdu::control(FpduKind::Aconnect, answer))
            .await?;

        Ok((partner_id, permit))
    }
    .await;

    match flow {
        Ok((partner_id, permit)) => {
            info!(%partner_id, "session admitted");
            Ok(ServerSession { session, partner_id, _permit: permit })
        },
        Err(err) => {
            refuse(&mut session, err.code()).await;
            Err(err).context("session admission failed")
        },
    }
}

/// `RCONNECT` with the diagnostic, falling back to `ABORT` when the
/// machine is already past the point where a refusal is legal.
async fn refuse<T: Transport>(session: &mut Session<T>, code: DiagCode) {
    let mut params = ParamList::new();
    params.put_diag(code);
    let fpdu = Fpdu::control(FpduKind::Rconnect, params);
    match session.send(&fpdu).await {
        Ok(()) => {},
        Err(_) => session.abort(code).await,
    }
}

fn merge_sync(theirs: Option<SyncConfig>, ours: SyncConfig) -> SyncConfig {
    let theirs = theirs.unwrap_or(SyncConfig::DISABLED);
    let interval_kb = match (theirs.interval_kb, ours.interval_kb) {
        (0, _) | (_, 0) => 0,
        (a, b) => a.min(b),
    };
    SyncConfig { resync: theirs.resync && ours.resync, interval_kb }
}

/// What the serve loop knows about the currently selected file.
#[derive(Debug, Clone)]
struct SelectedFile {
    filename: String,
    record_length: u16,
    data_code: DataCode,
    announced_size: Option<u64>,
    transfer_id: u32,
}

impl<T: Transport> ServerSession<T> {
    /// Answer the session until the demander releases it.
    ///
    /// Every file lands in (or leaves) `store`; the summary lists the
    /// transfers and messages the session carried.
    pub async fn serve<S: ObjectStore>(&mut self, store: &S) -> Result<ServeSummary> {
        let mut summary = ServeSummary::default();
        let flow = self.serve_inner(store, &mut summary).await;
        match flow {
            Ok(()) => Ok(summary),
            Err(err) => {
                let err = self.session.fail(err).await;
                Err(err).context("session failed")
            },
        }
    }

    async fn serve_inner<S: ObjectStore>(
        &mut self,
        store: &S,
        summary: &mut ServeSummary,
    ) -> EngineResult<()> {
        let mut selected: Option<SelectedFile> = None;
        let mut message_buf: Vec<u8> = Vec::new();

        loop {
            let fpdu = self.session.recv().await?;
            match fpdu.kind {
                FpduKind::Create => {
                    selected = Some(self.on_create(&fpdu)?);
                    self.reply(FpduKind::AckCreate, ParamList::new()).await?;
                },
                FpduKind::Select => {
                    let (file, answer) = self.on_select(store, &fpdu).await?;
                    selected = Some(file);
                    self.reply(FpduKind::AckSelect, answer).await?;
                },
                FpduKind::Deselect => {
                    selected = None;
                    self.reply(FpduKind::AckDeselect, ParamList::new()).await?;
                },
                FpduKind::Open => {
                    self.reply(FpduKind::AckOpen, ParamList::new()).await?;
                },
                FpduKind::Close => {
                    self.reply(FpduKind::AckClose, ParamList::new()).await?;
                },
                FpduKind::Write => {
                    let file = selected.clone().ok_or_else(|| {
                        EngineError::StateViolation("WRITE with no file selected".into())
                    })?;
                    let record = self.on_write(store, &file, &fpdu).await?;
                    summary.transfers.push(record);
                },
                FpduKind::Read => {
                    let file = selected.clone().ok_or_else(|| {
                        EngineError::StateViolation("READ with no file selected".into())
                    })?;
                    let record = self.on_read(store, &file, &fpdu).await?;
                    summary.transfers.push(record);
                },
                FpduKind::Msg => {
                    let body = message_body(&fpdu);
                    summary.messages.push(body);
                    self.reply(FpduKind::AckMsg, ParamList::new()).await?;
                },
                FpduKind::Msgdm => {
                    message_buf = message_body(&fpdu);
                },
                FpduKind::Msgmm => {
                    message_buf.extend(message_body(&fpdu));
                },
                FpduKind::Msgfm => {
                    message_buf.extend(message_body(&fpdu));
                    summary.messages.push(std::mem::take(&mut message_buf));
                    self.reply(FpduKind::AckMsg, ParamList::new()).await?;
                },
                FpduKind::Release => {
                    self.reply(FpduKind::Relconf, ParamList::new()).await?;
                    self.session.shutdown().await.ok();
                    debug!("session released by peer");
                    return Ok(());
                },
                other => {
                    return Err(EngineError::StateViolation(format!(
                        "{other:?} at session level"
                    )));
                },
            }
        }
    }

    async fn reply(&mut self, kind: FpduKind, params: ParamList) -> EngineResult<()> {
        self.session.send(&Fpdu::control(kind, params)).await
    }

    fn on_create(&self, fpdu: &Fpdu) -> EngineResult<SelectedFile> {
        let params = fpdu.params().ok_or_else(|| {
            EngineError::MalformedFrame("CREATE without parameters".into())
        })?;
        let coding = self.session.negotiated.coding;
        let filename = params.str_of(Pi::Filename, coding).ok_or_else(|| {
            EngineError::MalformedFrame("CREATE without a filename".into())
        })?;
        Ok(SelectedFile {
            filename,
            record_length: params.num(Pi::RecordLength).unwrap_or(0) as u16,
            data_code: params.data_code().unwrap_or_default(),
            announced_size: params.num(Pi::FileSize),
            transfer_id: params.num(Pi::TransferId).unwrap_or(0) as u32,
        })
    }

    async fn on_select<S: ObjectStore>(
        &mut self,
        store: &S,
        fpdu: &Fpdu,
    ) -> EngineResult<(SelectedFile, ParamList)> {
        let params = fpdu.params().ok_or_else(|| {
            EngineError::MalformedFrame("SELECT without parameters".into())
        })?;
        let coding = self.session.negotiated.coding;
        let filename = params.str_of(Pi::Filename, coding).ok_or_else(|| {
            EngineError::MalformedFrame("SELECT without a filename".into())
        })?;

        let len = match store.len(&filename).await {
            Ok(len) => len,
            Err(err) => {
                warn!(%filename, %err, "selected file unavailable");
                return Err(EngineError::StorageError(err));
            },
        };

        let file = SelectedFile {
            filename: filename.clone(),
            record_length: 0,
            data_code: DataCode::Binary,
            announced_size: Some(len),
            transfer_id: params.num(Pi::TransferId).unwrap_or(0) as u32,
        };

        let mut answer = ParamList::new();
        answer.put_record_format(RecordFormat::VARIABLE);
        answer.put_num(Pi::RecordLength, 0);
        answer.put_num(Pi::FileSize, len);
        Ok((file, answer))
    }

    async fn on_write<S: ObjectStore>(
        &mut self,
        store: &S,
        file: &SelectedFile,
        fpdu: &Fpdu,
    ) -> EngineResult<TransferRecord> {
        let restart = restart_from(fpdu);
        let mut sink = store
            .open_write(&file.filename, restart.is_some())
            .await
            .map_err(EngineError::StorageError)?;
        if let Some(point) = restart {
            sink.seek(SeekFrom::Start(point.byte_offset))
                .await
                .map_err(EngineError::StorageError)?;
        }

        self.reply(FpduKind::AckWrite, ParamList::new()).await?;

        let ctx = TransferContext {
            transfer_id: file.transfer_id,
            filename: file.filename.clone(),
            direction: Direction::Receive,
            record_length: file.record_length,
            record_format: RecordFormat::VARIABLE,
            data_code: file.data_code,
            file_size: file.announced_size,
            restart,
        };
        let outcome = run_receive(&mut self.session, &ctx, &mut sink).await?;
        sink.shutdown().await.map_err(EngineError::StorageError)?;

        info!(
            file = %file.filename,
            bytes = outcome.bytes,
            records = outcome.records,
            "file stored"
        );
        Ok(TransferRecord {
            filename: file.filename.clone(),
            direction: Direction::Receive,
            bytes: outcome.bytes,
            records: outcome.records,
            end_code: outcome.end_code,
            interrupted: outcome.interrupted,
        })
    }

    async fn on_read<S: ObjectStore>(
        &mut self,
        store: &S,
        file: &SelectedFile,
        fpdu: &Fpdu,
    ) -> EngineResult<TransferRecord> {
        let restart = restart_from(fpdu);
        let mut source = store
            .open_read(&file.filename)
            .await
            .map_err(EngineError::StorageError)?;

        self.reply(FpduKind::AckRead, ParamList::new()).await?;

        let ctx = TransferContext {
            transfer_id: file.transfer_id,
            filename: file.filename.clone(),
            direction: Direction::Send,
            record_length: file.record_length,
            record_format: RecordFormat::VARIABLE,
            data_code: file.data_code,
            file_size: file.announced_size,
            restart,
        };
        let outcome = run_send(&mut self.session, &ctx, &mut source).await?;

        info!(
            file = %file.filename,
            bytes = outcome.bytes,
            "file served"
        );
        Ok(TransferRecord {
            filename: file.filename.clone(),
            direction: Direction::Send,
            bytes: outcome.bytes,
            records: outcome.articles,
            end_code: DiagCode::SUCCESS,
            interrupted: false,
        })
    }
}

fn message_body(fpdu: &Fpdu) -> Vec<u8> {
    fpdu.params()
        .and_then(|p| p.get(Pi::MessageBody))
        .map(|b| b.to_vec())
        .unwrap_or_default()
}

fn restart_from(fpdu: &Fpdu) -> Option<RestartPoint> {
    let params = fpdu.params()?;
    let sync_num = params.num(Pi::RestartPoint)? as u32;
    let byte_offset = params.num(Pi::FileSize).unwrap_or(0);
    Some(RestartPoint { sync_num, byte_offset })
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result};
use chrono::Utc;
use rand::RngExt;
use tokio::io::{AsyncSeekExt, AsyncWriteExt, SeekFrom};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    cfg::config::Config,
    diag::{DiagCode, EngineError, EngineResult},
    fpdu::{Fpdu, FpduKind},
    params::{Param, ParamList, Pgi, Pi, RecordFormat},
    session::{Session, Transport, preconnect},
    storage::ObjectStore,
    transfer::{
        Direction, RestartPoint, TransferContext,
        receiver::{ReceiveOutcome, run_receive},
        sender::{SendOutcome, run_send},
    },
};

/// Per-transfer knobs for [`Demander::send_file`] and
/// [`Demander::receive_file`].
#[derive(Debug, Clone, Default)]
pub struct TransferOptions {
    /// Virtual filename announced in `PI_12`.
    pub remote_name: String,
    /// `PI_32`; zero streams free-form records.
    pub record_length: u16,
    /// Resume from a previously persisted checkpoint.
    pub restart: Option<RestartPoint>,
}

impl TransferOptions {
    pub fn named(remote_name: impl Into<String>) -> Self {
        Self { remote_name: remote_name.into(), ..Self::default() }
    }

    pub fn with_record_length(mut self, len: u16) -> Self {
        self.record_length = len;
        self
    }

    pub fn with_restart(mut self, restart: RestartPoint) -> Self {
        self.restart = Some(restart);
        self
    }
}

/// An established demander session.
#[derive(Debug)]
pub struct Demander<T: Transport> {
    session: Session<T>,
    cfg: Config,
}

/// Connect to a server over an established byte stream.
///
/// Runs the optional pre-connect, then the `CONNECT` / `ACONNECT`
/// negotiation. The returned handle owns the stream for its lifetime.
pub async fn open_session<T: Transport>(
    transport: T,
    cfg: Config,
    cancel: CancellationToken,
) -> Result<Demander<T>> {
    let mut session = Session::demander(transport, cfg.session_timeouts(), cancel);

    if cfg.identity.preconnect.as_bool() {
        preconnect::demander_preconnect(
            &mut session,
            &cfg.identity.local_id,
            &cfg.identity.password,
        )
        .await
        .context("pre-connect failed")?;
    }

    let coding = session.negotiated.coding;
    let mut params = ParamList::new();
    params.put_str(Pi::Demander, &cfg.identity.local_id, coding);
    params.put_str(Pi::Server, &cfg.identity.partner_id, coding);
    params.put_str(Pi::AccessControl, &cfg.identity.password, coding);
    params.put_num(Pi::Version, cfg.negotiation.version as u64);
    params.put_sync_config(cfg.sync_config());
    params.put_num(Pi::MaxEntitySize, cfg.negotiation.max_entity_size as u64);

    let handshake: EngineResult<()> = async {
        session.send(&Fpdu::control(FpduKind::Connect, params)).await?;
        let answer = session.wait_for(FpduKind::Aconnect).await?;
        adopt_negotiation(&mut session, &answer, &cfg)
    }
    .await;

    match handshake {
        Ok(()) => {
            info!(
                partner = %cfg.identity.partner_id,
                max_entity = session.negotiated.max_entity,
                "session established"
            );
            Ok(Demander { session, cfg })
        },
        Err(err) => {
            let err = session.fail(err).await;
            Err(err).context("CONNECT negotiation failed")
        },
    }
}

fn adopt_negotiation<T: Transport>(
    session: &mut Session<T>,
    answer: &Fpdu,
    cfg: &Config,
) -> EngineResult<()> {
    let params = answer.params().ok_or_else(|| {
        EngineError::MalformedFrame("ACONNECT without parameters".into())
    })?;

    let version = params.num(Pi::Version).unwrap_or(0) as u16;
    if version != cfg.negotiation.version {
        return Err(EngineError::NegotiationFailure(format!(
            "peer answered version {version}, we require {}",
            cfg.negotiation.version
        )));
    }
    session.negotiated.version = version;

    if let Some(entity) = params.num(Pi::MaxEntitySize) {
        session.negotiated.max_entity =
            (entity as u16).min(cfg.negotiation.max_entity_size);
    } else {
        session.negotiated.max_entity = cfg.negotiation.max_entity_size;
    }

    session.negotiated.sync = params.sync_config().unwrap_or(cfg.sync_config());
    Ok(())
}

impl<T: Transport> Demander<T> {
    fn fresh_transfer_id(&self) -> u32 {
        // PI_13 is three bytes on the wire.
        rand::rng().random::<u32>() & 0x00FF_FFFF
    }

    fn file_identity(&self, remote_name: &str) -> Vec<Param> {
        let coding = self.session.negotiated.coding;
        let mut id = ParamList::new();
        id.put_str(Pi::Demander, &self.cfg.identity.local_id, coding);
        id.put_str(Pi::Server, &self.cfg.identity.partner_id, coding);
        id.put_num(Pi::FileType, 0);
        id.put_str(Pi::Filename, remote_name, coding);
        single_params(id)
    }

    async fn guarded<R>(&mut self, res: EngineResult<R>) -> Result<R> {
        match res {
            Ok(v) => Ok(v),
            Err(err) => {
                let err = self.session.fail(err).await;
                Err(err.into())
            },
        }
    }

    /// Push a local object to the partner.
    pub async fn send_file<S: ObjectStore>(
        &mut self,
        store: &S,
        local_path: &str,
        opts: TransferOptions,
    ) -> Result<SendOutcome> {
        let size = store
            .len(local_path)
            .await
            .with_context(|| format!("source {local_path:?} unavailable"))?;
        let mut source = store
            .open_read(local_path)
            .await
            .with_context(|| format!("cannot open source {local_path:?}"))?;

        let ctx = TransferContext {
            transfer_id: self.fresh_transfer_id(),
            filename: opts.remote_name.clone(),
            direction: Direction::Send,
            record_length: opts.record_length,
            record_format: if opts.record_length > 0 {
                RecordFormat::empty()
            } else {
                RecordFormat::VARIABLE
            },
            data_code: self.cfg.negotiation.data_code.into(),
            file_size: Some(size),
            restart: opts.restart,
        };

        let flow: EngineResult<SendOutcome> = async {
            self.create(&ctx).await?;
            self.open().await?;
            self.begin_transfer(FpduKind::Write, FpduKind::AckWrite, &ctx).await?;
            let outcome = run_send(&mut self.session, &ctx, &mut source).await?;
            self.close_and_deselect().await?;
            Ok(outcome)
        }
        .await;

        let outcome = self.guarded(flow).await?;
        info!(
            file = %ctx.filename,
            bytes = outcome.bytes,
            sync_points = outcome.sync_points,
            "file sent"
        );
        Ok(outcome)
    }

    /// Pull a remote file into the store.
    ///
    /// A `TRANS_END` verdict other than `0.000` surfaces as
    /// [`EngineError::TransferEnd`] after the protocol closes cleanly.
    pub async fn receive_file<S: ObjectStore>(
        &mut self,
        store: &S,
        local_path: &str,
        opts: TransferOptions,
    ) -> Result<ReceiveOutcome> {
        let select_flow: EngineResult<(u16, Option<u64>)> =
            self.select(&opts).await;
        let (record_length, announced) = self.guarded(select_flow).await?;

        let restart = opts.restart;
        let mut sink = store
            .open_write(local_path, restart.is_some())
            .await
            .with_context(|| format!("cannot open sink {local_path:?}"))?;
        if let Some(point) = restart {
            sink.seek(SeekFrom::Start(point.byte_offset))
                .await
                .context("cannot position sink at the checkpoint")?;
        }

        let ctx = TransferContext {
            transfer_id: self.fresh_transfer_id(),
            filename: opts.remote_name.clone(),
            direction: Direction::Receive,
            record_length: if opts.record_length > 0 {
                opts.record_length
            } else {
                record_length
            },
            record_format: RecordFormat::VARIABLE,
            data_code: self.cfg.negotiation.data_code.into(),
            file_size: announced,
            restart,
        };

        let flow: EngineResult<ReceiveOutcome> = async {
            self.open().await?;
            self.begin_transfer(FpduKind::Read, FpduKind::AckRead, &ctx).await?;
            let outcome = run_receive(&mut self.session, &ctx, &mut sink).await?;
            self.close_and_deselect().await?;
            Ok(outcome)
        }
        .await;
        let outcome = self.guarded(flow).await?;

        sink.shutdown().await.context("cannot flush the sink durably")?;

        if !outcome.end_code.is_success() {
            return Err(EngineError::TransferEnd { code: outcome.end_code }.into());
        }
        info!(
            file = %ctx.filename,
            bytes = outcome.bytes,
            records = outcome.records,
            "file received"
        );
        Ok(outcome)
    }

    /// Send one free-text message, segmenting when it exceeds `PI_61`.
    pub async fn send_message(&mut self, text: &[u8]) -> Result<()> {
        let chunk = Pi::MessageBody.width();
        let flow: EngineResult<()> = async {
            if text.len() <= chunk {
                let mut params = ParamList::new();
                params.push(Param { pi: Pi::MessageBody.code(), value: text.to_vec().into() });
                self.session
                    .exchange(Fpdu::control(FpduKind::Msg, params), FpduKind::AckMsg)
                    .await?;
                return Ok(());
            }

            let mut chunks = text.chunks(chunk).peekable();
            let first = chunks.next().unwrap_or(&[]);
            let mut params = ParamList::new();
            params.put_num(Pi::MessageLength, text.len() as u64);
            params.push(Param { pi: Pi::MessageBody.code(), value: first.to_vec().into() });
            self.session.send(&Fpdu::control(FpduKind::Msgdm, params)).await?;

            while let Some(part) = chunks.next() {
                let mut params = ParamList::new();
                params.push(Param { pi: Pi::MessageBody.code(), value: part.to_vec().into() });
                let kind = if chunks.peek().is_some() {
                    FpduKind::Msgmm
                } else {
                    FpduKind::Msgfm
                };
                self.session.send(&Fpdu::control(kind, params)).await?;
            }
            self.session.wait_for(FpduKind::AckMsg).await?;
            Ok(())
        }
        .await;
        self.guarded(flow).await
    }

    /// End the session cleanly and close the stream.
    pub async fn release(mut self) -> Result<()> {
        let flow: EngineResult<()> = async {
            self.session
                .send(&Fpdu::control(FpduKind::Release, ParamList::new()))
                .await?;
            self.session.wait_for(FpduKind::Relconf).await?;
            Ok(())
        }
        .await;
        match flow {
            Ok(()) => {
                self.session.shutdown().await.ok();
                debug!("session released");
                Ok(())
            },
            Err(err) => {
                let err = self.session.fail(err).await;
                Err(err.into())
            },
        }
    }

    /// Tear the session down with an `ABORT`.
    pub async fn abort(mut self, code: DiagCode) {
        self.session.abort(code).await;
        self.session.shutdown().await.ok();
    }

    async fn create(&mut self, ctx: &TransferContext) -> EngineResult<()> {
        let mut params = ParamList::new();
        params.put_num(Pi::TransferId, ctx.transfer_id as u64);
        params.push_group(Pgi::FileIdentity, self.file_identity(&ctx.filename));
        params.push_group(
            Pgi::LogicalAttributes,
            logical_attributes(ctx),
        );
        params.put_code(Pi::DataCode, ctx.data_code as u8);
        if let Some(size) = ctx.file_size {
            params.put_num(Pi::FileSize, size);
        }
        let mut history = ParamList::new();
        history.put_date(Pi::CreationDate, Utc::now().naive_utc());
        params.push_group(
            Pgi::HistoricalAttributes,
            single_params(history),
        );

        self.session
            .exchange(Fpdu::control(FpduKind::Create, params), FpduKind::AckCreate)
            .await?;
        Ok(())
    }

    async fn select(
        &mut self,
        opts: &TransferOptions,
    ) -> EngineResult<(u16, Option<u64>)> {
        let mut params = ParamList::new();
        params.put_num(Pi::TransferId, self.fresh_transfer_id() as u64);
        params.push_group(Pgi::FileIdentity, self.file_identity(&opts.remote_name));
        if let Some(point) = opts.restart {
            params.put_num(Pi::RestartPoint, point.sync_num as u64);
        }
        let ack = self
            .session
            .exchange(Fpdu::control(FpduKind::Select, params), FpduKind::AckSelect)
            .await?;

        let attrs = ack.params();
        let record_length = attrs
            .and_then(|p| p.num(Pi::RecordLength))
            .unwrap_or(0) as u16;
        let announced = attrs.and_then(|p| p.num(Pi::FileSize));
        Ok((record_length, announced))
    }

    async fn open(&mut self) -> EngineResult<()> {
        self.session
            .exchange(
                Fpdu::control(FpduKind::Open, ParamList::new()),
                FpduKind::AckOpen,
            )
            .await?;
        Ok(())
    }

    async fn begin_transfer(
        &mut self,
        req: FpduKind,
        ack: FpduKind,
        ctx: &TransferContext,
    ) -> EngineResult<()> {
        let mut params = ParamList::new();
        if let Some(point) = ctx.restart {
            params.put_num(Pi::RestartPoint, point.sync_num as u64);
            params.put_num(Pi::FileSize, point.byte_offset);
        }
        self.session.exchange(Fpdu::control(req, params), ack).await?;
        Ok(())
    }

    async fn close_and_deselect(&mut self) -> EngineResult<()> {
        self.session
            .exchange(
                Fpdu::control(FpduKind::Close, ParamList::new()),
                FpduKind::AckClose,
            )
            .await?;
        self.session
            .exchange(
                Fpdu::control(FpduKind::Deselect, ParamList::new()),
                FpduKind::AckDeselect,
            )
            .await?;
        Ok(())
    }
}

fn logical_attributes(ctx: &TransferContext) -> Vec<Param> {
    let mut attrs = ParamList::new();
    attrs.put_record_format(ctx.record_format);
    attrs.put_num(Pi::RecordLength, ctx.record_length as u64);
    attrs.put_code(Pi::Organization, 0);
    single_params(attrs)
}

fn single_params(list: ParamList) -> Vec<Param> {
    list.items()
        .iter()
        .filter_map(|item| match item {
            crate::params::ParamItem::Single(p) => Some(p.clone()),
            crate::params::ParamItem::Group { .. } => None,
        })
        .collect()
}

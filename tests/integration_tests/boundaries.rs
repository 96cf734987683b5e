use anyhow::Result;
use pesit_engine::{
    driver::{TransferOptions, accept_session, open_session},
    storage::local::LocalStore,
};
use tokio_util::sync::CancellationToken;

use crate::integration_tests::common;

struct Rig {
    server: tokio::task::JoinHandle<Result<pesit_engine::driver::ServeSummary>>,
    server_store: LocalStore,
    _server_dir: tempfile::TempDir,
    demander_store: LocalStore,
    _demander_dir: tempfile::TempDir,
    demander_wire: tokio::io::DuplexStream,
    cfg: pesit_engine::cfg::config::Config,
}

fn rig(max_entity: u16) -> Result<Rig> {
    let (demander_wire, server_wire) = common::wire();
    let cfg = common::config(max_entity, 0, false);
    let partners = common::directory();

    let server_dir = tempfile::tempdir()?;
    let server_store = LocalStore::new(server_dir.path());
    let demander_dir = tempfile::tempdir()?;
    let demander_store = LocalStore::new(demander_dir.path());

    let server_cfg = cfg.clone();
    let task_store = server_store.clone();
    let server = tokio::spawn(async move {
        let mut session = accept_session(
            server_wire,
            &server_cfg,
            &partners,
            CancellationToken::new(),
        )
        .await?;
        session.serve(&task_store).await
    });

    Ok(Rig {
        server,
        server_store,
        _server_dir: server_dir,
        demander_store,
        _demander_dir: demander_dir,
        demander_wire,
        cfg,
    })
}

/// A record of exactly `PI_25 − 8` bytes fills one `DTF` to the brim.
#[tokio::test]
async fn record_at_capacity_is_a_single_entity() -> Result<()> {
    let rig = rig(512)?;
    let payload = common::pattern(504);
    common::put_file(&rig.demander_store, "one.rec", &payload).await?;

    let mut demander =
        open_session(rig.demander_wire, rig.cfg, CancellationToken::new()).await?;
    let outcome = demander
        .send_file(
            &rig.demander_store,
            "one.rec",
            TransferOptions::named("ONE.REC").with_record_length(504),
        )
        .await?;
    demander.release().await?;
    rig.server.await??;

    assert_eq!(outcome.articles, 1);
    assert_eq!(outcome.entities, 1);
    assert_eq!(common::get_file(&rig.server_store, "ONE.REC").await?, payload);
    Ok(())
}

/// Twice that size forces the split framing: exactly `DTFDA` + `DTFFA`.
#[tokio::test]
async fn double_capacity_record_splits_into_two_entities() -> Result<()> {
    let rig = rig(512)?;
    let payload = common::pattern(1008);
    common::put_file(&rig.demander_store, "two.rec", &payload).await?;

    let mut demander =
        open_session(rig.demander_wire, rig.cfg, CancellationToken::new()).await?;
    let outcome = demander
        .send_file(
            &rig.demander_store,
            "two.rec",
            TransferOptions::named("TWO.REC").with_record_length(1008),
        )
        .await?;
    demander.release().await?;
    rig.server.await??;

    assert_eq!(outcome.articles, 1);
    assert_eq!(outcome.entities, 2);
    assert_eq!(common::get_file(&rig.server_store, "TWO.REC").await?, payload);
    Ok(())
}

/// An empty source still runs the whole choreography; the stored file is
/// zero bytes and no data FPDU travels.
#[tokio::test]
async fn empty_source_creates_an_empty_file() -> Result<()> {
    let rig = rig(512)?;
    common::put_file(&rig.demander_store, "empty", &[]).await?;

    let mut demander =
        open_session(rig.demander_wire, rig.cfg, CancellationToken::new()).await?;
    let outcome = demander
        .send_file(&rig.demander_store, "empty", TransferOptions::named("EMPTY"))
        .await?;
    demander.release().await?;
    let summary = rig.server.await??;

    assert_eq!(outcome.bytes, 0);
    assert_eq!(outcome.entities, 0);
    assert_eq!(summary.transfers[0].bytes, 0);
    assert_eq!(common::get_file(&rig.server_store, "EMPTY").await?, Vec::<u8>::new());
    Ok(())
}

/// A 6-byte entity cap can carry control traffic but not a single data
/// byte: an empty transfer succeeds, a non-empty one fails fast instead
/// of spinning.
#[tokio::test]
async fn six_byte_entities_move_no_data() -> Result<()> {
    // Empty file: fine.
    let rig1 = rig(6)?;
    common::put_file(&rig1.demander_store, "empty", &[]).await?;
    let mut demander =
        open_session(rig1.demander_wire, rig1.cfg, CancellationToken::new()).await?;
    demander
        .send_file(&rig1.demander_store, "empty", TransferOptions::named("EMPTY"))
        .await?;
    demander.release().await?;
    rig1.server.await??;

    // One byte of payload: negotiation failure, not a hang.
    let rig2 = rig(6)?;
    common::put_file(&rig2.demander_store, "one", &[0x42]).await?;
    let mut demander =
        open_session(rig2.demander_wire, rig2.cfg, CancellationToken::new()).await?;
    let err = demander
        .send_file(&rig2.demander_store, "one", TransferOptions::named("ONE"))
        .await
        .expect_err("a byte cannot fit a 6-byte entity");
    assert!(err.to_string().contains("negotiation"), "{err:#}");
    assert!(rig2.server.await?.is_err());
    Ok(())
}

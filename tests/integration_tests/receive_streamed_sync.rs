use anyhow::Result;
use pesit_engine::{
    driver::{TransferOptions, accept_session, open_session},
    storage::local::LocalStore,
    transfer::Direction,
};
use tokio_util::sync::CancellationToken;

use crate::integration_tests::common;

/// A 10 MiB streamed pull with sync points every 1 MiB: exactly ten
/// `SYN`/`ACK_SYN` pairs with `PI_20` 1..10, and no data loss.
///
/// The entity size is picked so the streamed chunk (entity − 8) divides
/// the interval exactly, pinning the checkpoint positions to the MiB
/// boundaries.
#[tokio::test]
async fn streamed_receive_with_ten_sync_points() -> Result<()> {
    let (demander_wire, server_wire) = common::wire();
    let cfg = common::config(4104, 1024, true);
    let partners = common::directory();
    let payload = common::pattern(10 * 1024 * 1024);

    let server_dir = tempfile::tempdir()?;
    let server_store = LocalStore::new(server_dir.path());
    common::put_file(&server_store, "BULK.BIN", &payload).await?;

    let server_cfg = cfg.clone();
    let server = tokio::spawn(async move {
        let mut session = accept_session(
            server_wire,
            &server_cfg,
            &partners,
            CancellationToken::new(),
        )
        .await?;
        session.serve(&server_store).await
    });

    let demander_dir = tempfile::tempdir()?;
    let demander_store = LocalStore::new(demander_dir.path());

    let mut demander =
        open_session(demander_wire, cfg, CancellationToken::new()).await?;
    let outcome = demander
        .receive_file(
            &demander_store,
            "bulk.bin",
            TransferOptions::named("BULK.BIN"),
        )
        .await?;
    demander.release().await?;

    assert_eq!(outcome.bytes, payload.len() as u64);
    assert_eq!(outcome.sync_points, 10);
    assert!(outcome.end_code.is_success());
    assert_eq!(
        outcome.checkpoint.byte_offset,
        10 * 1024 * 1024,
        "last checkpoint sits on the final MiB boundary"
    );

    let summary = server.await??;
    assert_eq!(summary.transfers.len(), 1);
    assert!(matches!(summary.transfers[0].direction, Direction::Send));
    assert_eq!(summary.transfers[0].bytes, payload.len() as u64);

    let stored = common::get_file(&demander_store, "bulk.bin").await?;
    assert_eq!(stored.len(), payload.len());
    assert_eq!(stored, payload, "received bytes differ from the source");
    Ok(())
}

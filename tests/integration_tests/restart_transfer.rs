use anyhow::Result;
use pesit_engine::{
    driver::{TransferOptions, accept_session, open_session},
    storage::local::LocalStore,
    transfer::RestartPoint,
};
use tokio_util::sync::CancellationToken;

use crate::integration_tests::common;

async fn run_server(
    server_wire: tokio::io::DuplexStream,
    cfg: pesit_engine::cfg::config::Config,
    store: LocalStore,
) -> tokio::task::JoinHandle<Result<pesit_engine::driver::ServeSummary>> {
    let partners = common::directory();
    tokio::spawn(async move {
        let mut session =
            accept_session(server_wire, &cfg, &partners, CancellationToken::new())
                .await?;
        session.serve(&store).await
    })
}

/// A sender dies mid-file; a new session resumes from the persisted
/// checkpoint. The final file equals the source, and nothing below the
/// checkpoint is rewritten (proved by a sentinel planted in the stored
/// prefix between the two phases).
#[tokio::test]
async fn restart_resumes_without_rewriting_the_prefix() -> Result<()> {
    let cfg = common::config(1032, 256, true);
    let payload = common::pattern(1 << 20);
    let checkpoint = RestartPoint { sync_num: 2, byte_offset: 512 * 1024 };

    let server_dir = tempfile::tempdir()?;
    let server_store = LocalStore::new(server_dir.path());
    let demander_dir = tempfile::tempdir()?;
    let demander_store = LocalStore::new(demander_dir.path());
    common::put_file(&demander_store, "big.bin", &payload).await?;

    // Phase 1: ship only the prefix, standing in for a transfer that was
    // killed right after checkpoint 2 was confirmed.
    {
        let (demander_wire, server_wire) = common::wire();
        let server =
            run_server(server_wire, cfg.clone(), server_store.clone()).await;
        common::put_file(
            &demander_store,
            "prefix.bin",
            &payload[..checkpoint.byte_offset as usize],
        )
        .await?;
        let mut demander =
            open_session(demander_wire, cfg.clone(), CancellationToken::new())
                .await?;
        demander
            .send_file(
                &demander_store,
                "prefix.bin",
                TransferOptions::named("BIG.BIN"),
            )
            .await?;
        demander.release().await?;
        server.await??;
    }

    // Plant a sentinel inside the stored prefix. A restart must never
    // touch bytes below the checkpoint, so it must survive.
    let mut stored = common::get_file(&server_store, "BIG.BIN").await?;
    assert_eq!(stored.len(), checkpoint.byte_offset as usize);
    stored[0] = 0xEE;
    common::put_file(&server_store, "BIG.BIN", &stored).await?;

    // Phase 2: resume from the checkpoint.
    let (demander_wire, server_wire) = common::wire();
    let server = run_server(server_wire, cfg.clone(), server_store.clone()).await;
    let mut demander =
        open_session(demander_wire, cfg, CancellationToken::new()).await?;
    let outcome = demander
        .send_file(
            &demander_store,
            "big.bin",
            TransferOptions::named("BIG.BIN").with_restart(checkpoint),
        )
        .await?;
    demander.release().await?;
    server.await??;

    assert_eq!(outcome.bytes, payload.len() as u64);
    // Sync numbering continued after the restart point.
    assert!(outcome.sync_points > checkpoint.sync_num);

    let stored = common::get_file(&server_store, "BIG.BIN").await?;
    assert_eq!(stored.len(), payload.len());
    assert_eq!(stored[0], 0xEE, "restart rewrote bytes below the checkpoint");
    assert_eq!(stored[1..], payload[1..], "suffix differs from the source");
    Ok(())
}

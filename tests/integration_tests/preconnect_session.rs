use anyhow::Result;
use pesit_engine::{
    cfg::enums::YesNo,
    driver::{TransferOptions, accept_session, open_session},
    storage::local::LocalStore,
};
use tokio_util::sync::CancellationToken;

use crate::integration_tests::common;

/// The 24-byte EBCDIC pre-connect record flips the whole session to
/// EBCDIC coding; identifiers and filenames still come out right.
#[tokio::test]
async fn preconnect_session_transfers_under_ebcdic_coding() -> Result<()> {
    let (demander_wire, server_wire) = common::wire();
    let mut cfg = common::config(1024, 0, false);
    cfg.identity.preconnect = YesNo::Yes;
    let partners = common::directory();
    let payload = common::pattern(4000);

    let server_dir = tempfile::tempdir()?;
    let server_store = LocalStore::new(server_dir.path());
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

    let demander_dir = tempfile::tempdir()?;
    let demander_store = LocalStore::new(demander_dir.path());
    common::put_file(&demander_store, "report", &payload).await?;

    let mut demander =
        open_session(demander_wire, cfg, CancellationToken::new()).await?;
    demander
        .send_file(
            &demander_store,
            "report",
            TransferOptions::named("REPORT.TXT"),
        )
        .await?;
    demander.release().await?;

    let summary = server.await??;
    assert_eq!(summary.transfers.len(), 1);
    // The filename crossed the wire in EBCDIC and came back intact.
    assert_eq!(summary.transfers[0].filename, "REPORT.TXT");
    assert_eq!(common::get_file(&server_store, "REPORT.TXT").await?, payload);
    Ok(())
}

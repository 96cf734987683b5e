use anyhow::Result;
use pesit_engine::{
    driver::{accept_session, open_session},
    storage::local::LocalStore,
};
use tokio_util::sync::CancellationToken;

use crate::integration_tests::common;

#[tokio::test]
async fn connect_then_release_cleanly() -> Result<()> {
    let (demander_wire, server_wire) = common::wire();
    let cfg = common::config(4096, 64, true);
    let partners = common::directory();

    let server_cfg = cfg.clone();
    let server = tokio::spawn(async move {
        let dir = tempfile::tempdir()?;
        let store = LocalStore::new(dir.path());
        let mut session = accept_session(
            server_wire,
            &server_cfg,
            &partners,
            CancellationToken::new(),
        )
        .await?;
        session.serve(&store).await
    });

    let demander =
        open_session(demander_wire, cfg, CancellationToken::new()).await?;
    demander.release().await?;

    let summary = server.await??;
    assert!(summary.transfers.is_empty());
    assert!(summary.messages.is_empty());
    Ok(())
}

use anyhow::Result;
use pesit_engine::{
    driver::{accept_session, open_session},
    storage::local::LocalStore,
};
use tokio_util::sync::CancellationToken;

use crate::integration_tests::common;

#[tokio::test]
async fn short_and_segmented_messages_arrive_in_order() -> Result<()> {
    let (demander_wire, server_wire) = common::wire();
    let cfg = common::config(4096, 0, false);
    let partners = common::directory();

    let server = tokio::spawn(async move {
        let dir = tempfile::tempdir()?;
        let store = LocalStore::new(dir.path());
        let mut session = accept_session(
            server_wire,
            &cfg,
            &partners,
            CancellationToken::new(),
        )
        .await?;
        session.serve(&store).await
    });

    let cfg = common::config(4096, 0, false);
    let mut demander =
        open_session(demander_wire, cfg, CancellationToken::new()).await?;

    let short = b"transfer window opens at 22:00".to_vec();
    // Three PI_61 chunks: MSGDM + MSGMM + MSGFM.
    let long = common::pattern(600)
        .iter()
        .map(|b| b'A' + (b % 26))
        .collect::<Vec<u8>>();

    demander.send_message(&short).await?;
    demander.send_message(&long).await?;
    demander.release().await?;

    let summary = server.await??;
    assert_eq!(summary.messages.len(), 2);
    assert_eq!(summary.messages[0], short);
    assert_eq!(summary.messages[1], long);
    Ok(())
}

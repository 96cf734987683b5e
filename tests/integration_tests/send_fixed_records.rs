use anyhow::Result;
use pesit_engine::{
    driver::{TransferOptions, accept_session, open_session},
    storage::local::LocalStore,
    transfer::Direction,
};
use tokio_util::sync::CancellationToken;

use crate::integration_tests::common;

/// 1 KiB of 128-byte records through 512-byte entities: 3 articles fit
/// one entity (3 · (2 + 128) + 6 ≤ 512), so 8 records travel in 3 data
/// FPDUs, and the stored file is byte-identical.
#[tokio::test]
async fn fixed_records_pack_three_per_entity() -> Result<()> {
    let (demander_wire, server_wire) = common::wire();
    let cfg = common::config(512, 0, false);
    let partners = common::directory();
    let payload = common::pattern(1024);

    let server_dir = tempfile::tempdir()?;
    let server_store = LocalStore::new(server_dir.path());
    let server_cfg = cfg.clone();
    let server_store_task = server_store.clone();
    let server = tokio::spawn(async move {
        let mut session = accept_session(
            server_wire,
            &server_cfg,
            &partners,
            CancellationToken::new(),
        )
        .await?;
        session.serve(&server_store_task).await
    });

    let demander_dir = tempfile::tempdir()?;
    let demander_store = LocalStore::new(demander_dir.path());
    common::put_file(&demander_store, "payroll.dat", &payload).await?;

    let mut demander =
        open_session(demander_wire, cfg, CancellationToken::new()).await?;
    let outcome = demander
        .send_file(
            &demander_store,
            "payroll.dat",
            TransferOptions::named("PAYROLL.DAT").with_record_length(128),
        )
        .await?;
    demander.release().await?;

    assert_eq!(outcome.bytes, 1024);
    assert_eq!(outcome.articles, 8);
    assert_eq!(outcome.entities, 3);

    let summary = server.await??;
    assert_eq!(summary.transfers.len(), 1);
    let record = &summary.transfers[0];
    assert_eq!(record.filename, "PAYROLL.DAT");
    assert!(matches!(record.direction, Direction::Receive));
    assert_eq!(record.bytes, 1024);
    assert_eq!(record.records, 8);
    assert!(record.end_code.is_success());

    let stored = common::get_file(&server_store, "PAYROLL.DAT").await?;
    assert_eq!(stored, payload);
    Ok(())
}

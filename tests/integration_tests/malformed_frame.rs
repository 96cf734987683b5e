use anyhow::Result;
use pesit_engine::{
    diag::DiagCode,
    driver::accept_session,
    fpdu::FpduKind,
    params::ParamList,
    storage::local::LocalStore,
};
use tokio_util::sync::CancellationToken;

use crate::integration_tests::common;

/// A frame declaring a 3-byte length can exist on no PeSIT link: the
/// server answers `ABORT 3.399` and hangs up.
#[tokio::test]
async fn short_length_field_draws_an_abort() -> Result<()> {
    let (client_wire, server_wire) = common::wire();
    let cfg = common::config(4096, 0, false);
    let partners = common::directory();

    let server = tokio::spawn(async move {
        let dir = tempfile::tempdir()?;
        let _store = LocalStore::new(dir.path());
        accept_session(server_wire, &cfg, &partners, CancellationToken::new())
            .await
            .map(|_| ())
    });

    let mut peer = common::RawPeer::new(client_wire);
    peer.send_raw(&[0x00, 0x03, 0x00, 0x00]).await?;

    let answer = peer.recv().await?;
    assert_eq!(answer.kind, FpduKind::Abort);
    assert_eq!(
        answer.params().and_then(ParamList::diag),
        Some(DiagCode::PROTOCOL_VIOLATION)
    );

    assert!(server.await?.is_err(), "admission must fail on a malformed frame");
    Ok(())
}

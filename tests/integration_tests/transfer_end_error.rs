use anyhow::{Result, ensure};
use bytes::Bytes;
use pesit_engine::{
    diag::{DiagCode, EngineError},
    driver::{TransferOptions, open_session},
    fpdu::{Fpdu, FpduKind},
    params::{ParamList, Pi},
    storage::local::LocalStore,
};
use tokio_util::sync::CancellationToken;

use crate::integration_tests::common;

fn ack(kind: FpduKind) -> Fpdu {
    Fpdu::control(kind, ParamList::new())
}

/// A server that ends the transfer with `PI_19 ≠ 0`: the demander
/// finishes the protocol politely, then surfaces the diagnostic to the
/// caller instead of pretending the file is whole.
#[tokio::test]
async fn peer_error_verdict_surfaces_to_the_caller() -> Result<()> {
    let (demander_wire, server_wire) = common::wire();
    let cfg = common::config(1024, 0, false);

    let scripted = tokio::spawn(async move {
        let mut peer = common::RawPeer::new(server_wire);

        ensure!(peer.recv().await?.kind == FpduKind::Connect, "expected CONNECT");
        let mut answer = ParamList::new();
        answer.put_num(Pi::Version, 2);
        answer.put_num(Pi::MaxEntitySize, 1024);
        peer.send(&Fpdu::control(FpduKind::Aconnect, answer)).await?;

        ensure!(peer.recv().await?.kind == FpduKind::Select, "expected SELECT");
        let mut attrs = ParamList::new();
        attrs.put_num(Pi::RecordLength, 0);
        attrs.put_num(Pi::FileSize, 100);
        peer.send(&Fpdu::control(FpduKind::AckSelect, attrs)).await?;

        ensure!(peer.recv().await?.kind == FpduKind::Open, "expected OPEN");
        peer.send(&ack(FpduKind::AckOpen)).await?;
        ensure!(peer.recv().await?.kind == FpduKind::Read, "expected READ");
        peer.send(&ack(FpduKind::AckRead)).await?;

        // Some data, then a failure verdict.
        peer.send(&Fpdu::data(
            FpduKind::Dtf,
            1,
            Bytes::from_static(b"\x00\x05hello"),
        ))
        .await?;
        peer.send(&ack(FpduKind::DtfEnd)).await?;
        let mut end = ParamList::new();
        end.put_code(Pi::EndCode, 1);
        end.put_diag(DiagCode::FILE_NOT_FOUND);
        peer.send(&Fpdu::control(FpduKind::TransEnd, end)).await?;
        ensure!(
            peer.recv().await?.kind == FpduKind::AckTransEnd,
            "expected ACK_TRANS_END"
        );

        ensure!(peer.recv().await?.kind == FpduKind::Close, "expected CLOSE");
        peer.send(&ack(FpduKind::AckClose)).await?;
        ensure!(peer.recv().await?.kind == FpduKind::Deselect, "expected DESELECT");
        peer.send(&ack(FpduKind::AckDeselect)).await?;
        Ok(())
    });

    let dir = tempfile::tempdir()?;
    let store = LocalStore::new(dir.path());

    let mut demander =
        open_session(demander_wire, cfg, CancellationToken::new()).await?;
    let err = demander
        .receive_file(&store, "partial", TransferOptions::named("GONE.DAT"))
        .await
        .expect_err("the peer reported an error verdict");

    match err.downcast_ref::<EngineError>() {
        Some(EngineError::TransferEnd { code }) => {
            assert_eq!(*code, DiagCode::FILE_NOT_FOUND);
        },
        other => panic!("expected TransferEnd, got {other:?}"),
    }

    scripted.await??;
    // The partial data was still flushed; callers decide what to keep.
    assert_eq!(common::get_file(&store, "partial").await?, b"hello");
    Ok(())
}

use anyhow::Result;
use pesit_engine::{
    auth::{Partner, Partners},
    diag::{DiagCode, EngineError},
    driver::{accept_session, open_session},
    fpdu::{Fpdu, FpduKind},
    params::{Coding, ParamList, Pi},
};
use tokio_util::sync::CancellationToken;

use crate::integration_tests::common;

fn abort_code(err: &anyhow::Error) -> Option<DiagCode> {
    match err.downcast_ref::<EngineError>() {
        Some(EngineError::PeerAbort { code }) => Some(*code),
        _ => None,
    }
}

#[tokio::test]
async fn wrong_password_is_refused_with_3300() -> Result<()> {
    let (demander_wire, server_wire) = common::wire();
    let server_cfg = common::config(4096, 0, false);
    let partners = common::directory();

    let server = tokio::spawn(async move {
        accept_session(server_wire, &server_cfg, &partners, CancellationToken::new())
            .await
            .map(|_| ())
    });

    let mut cfg = common::config(4096, 0, false);
    cfg.identity.password = "letmein".into();
    let err = open_session(demander_wire, cfg, CancellationToken::new())
        .await
        .expect_err("bad password must be refused");
    assert_eq!(abort_code(&err), Some(DiagCode::AUTH_FAILURE), "{err:#}");
    assert!(server.await?.is_err());
    Ok(())
}

#[tokio::test]
async fn unknown_partner_is_refused_with_3300() -> Result<()> {
    let (demander_wire, server_wire) = common::wire();
    let server_cfg = common::config(4096, 0, false);
    let partners = Partners::new(); // empty directory

    let server = tokio::spawn(async move {
        accept_session(server_wire, &server_cfg, &partners, CancellationToken::new())
            .await
            .map(|_| ())
    });

    let err = open_session(
        demander_wire,
        common::config(4096, 0, false),
        CancellationToken::new(),
    )
    .await
    .expect_err("unknown partner must be refused");
    assert_eq!(abort_code(&err), Some(DiagCode::AUTH_FAILURE), "{err:#}");
    assert!(server.await?.is_err());
    Ok(())
}

#[tokio::test]
async fn disabled_partner_is_refused() -> Result<()> {
    let (demander_wire, server_wire) = common::wire();
    let server_cfg = common::config(4096, 0, false);
    let partners = Partners::new();
    partners.insert(
        "CLI",
        Partner {
            password: common::PASSWORD.as_bytes().to_vec(),
            max_sessions: 4,
            enabled: false,
        },
    );

    let server = tokio::spawn(async move {
        accept_session(server_wire, &server_cfg, &partners, CancellationToken::new())
            .await
            .map(|_| ())
    });

    let err = open_session(
        demander_wire,
        common::config(4096, 0, false),
        CancellationToken::new(),
    )
    .await
    .expect_err("disabled partner must be refused");
    assert_eq!(abort_code(&err), Some(DiagCode::AUTH_FAILURE), "{err:#}");
    assert!(server.await?.is_err());
    Ok(())
}

/// A scripted `CONNECT` announcing version 9: the server must refuse with
/// `3.322` rather than guess at compatibility.
#[tokio::test]
async fn version_mismatch_is_refused_with_3322() -> Result<()> {
    let (client_wire, server_wire) = common::wire();
    let server_cfg = common::config(4096, 0, false);
    let partners = common::directory();

    let server = tokio::spawn(async move {
        accept_session(server_wire, &server_cfg, &partners, CancellationToken::new())
            .await
            .map(|_| ())
    });

    let mut peer = common::RawPeer::new(client_wire);
    let mut connect = ParamList::new();
    connect.put_str(Pi::Demander, "CLI", Coding::Ascii);
    connect.put_str(Pi::AccessControl, common::PASSWORD, Coding::Ascii);
    connect.put_num(Pi::Version, 9);
    connect.put_num(Pi::MaxEntitySize, 4096);
    peer.send(&Fpdu::control(FpduKind::Connect, connect)).await?;

    let answer = peer.recv().await?;
    assert_eq!(answer.kind, FpduKind::Rconnect);
    assert_eq!(
        answer.params().and_then(ParamList::diag),
        Some(DiagCode::BAD_VERSION)
    );
    assert!(server.await?.is_err());
    Ok(())
}

/// The per-partner session cap counts live sessions, not historical ones.
#[tokio::test]
async fn session_cap_is_enforced_and_released() -> Result<()> {
    let partners = Partners::new();
    partners.insert(
        "CLI",
        Partner {
            password: common::PASSWORD.as_bytes().to_vec(),
            max_sessions: 1,
            enabled: true,
        },
    );
    let server_cfg = common::config(4096, 0, false);

    // First session occupies the only slot.
    let (demander_wire_1, server_wire_1) = common::wire();
    let partners_1 = partners.clone();
    let cfg_1 = server_cfg.clone();
    let server_1 = tokio::spawn(async move {
        let mut session = accept_session(
            server_wire_1,
            &cfg_1,
            &partners_1,
            CancellationToken::new(),
        )
        .await?;
        let dir = tempfile::tempdir()?;
        session.serve(&pesit_engine::storage::local::LocalStore::new(dir.path())).await
    });
    let demander_1 = open_session(
        demander_wire_1,
        common::config(4096, 0, false),
        CancellationToken::new(),
    )
    .await?;

    // Second concurrent session is over the cap.
    let (demander_wire_2, server_wire_2) = common::wire();
    let partners_2 = partners.clone();
    let cfg_2 = server_cfg.clone();
    let server_2 = tokio::spawn(async move {
        accept_session(server_wire_2, &cfg_2, &partners_2, CancellationToken::new())
            .await
            .map(|_| ())
    });
    let err = open_session(
        demander_wire_2,
        common::config(4096, 0, false),
        CancellationToken::new(),
    )
    .await
    .expect_err("second session exceeds the cap");
    assert_eq!(abort_code(&err), Some(DiagCode::AUTH_FAILURE), "{err:#}");
    assert!(server_2.await?.is_err());

    // Releasing the first frees the slot.
    demander_1.release().await?;
    server_1.await??;
    assert_eq!(partners.live_sessions("CLI"), 0);
    Ok(())
}

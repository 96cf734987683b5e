// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The optional Hors-SIT pre-connect record.
//!
//! Before any FPDU a demander may send a 24-byte EBCDIC record:
//! `"PESIT"` padded to 8 bytes, then the demander id and the connection
//! password, each space-padded to 8. The server answers `"ACK0"` in
//! EBCDIC and the whole session switches to EBCDIC coding for `C`-typed
//! parameters. A first read that does not open with the magic is replayed
//! into the FPDU codec and the session stays in ASCII.

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use crate::{
    diag::{EngineError, EngineResult},
    ebcdic,
    params::Coding,
    session::{Session, Transport, link},
};

pub const PRECONNECT_LEN: usize = 24;
const MAGIC: &[u8] = b"PESIT";
const ACK: &[u8] = b"ACK0";

fn build_record(id: &str, password: &str) -> [u8; PRECONNECT_LEN] {
    let mut out = [0u8; PRECONNECT_LEN];
    out[..8].copy_from_slice(&ebcdic::encode_padded(MAGIC, 8));
    out[8..16].copy_from_slice(&ebcdic::encode_padded(id.as_bytes(), 8));
    out[16..24].copy_from_slice(&ebcdic::encode_padded(password.as_bytes(), 8));
    out
}

/// Demander side: send the record, require `ACK0`, switch to EBCDIC.
pub async fn demander_preconnect<T: Transport>(
    session: &mut Session<T>,
    id: &str,
    password: &str,
) -> EngineResult<()> {
    let record = build_record(id, password);
    let idle = session.timeouts.idle;
    let cancel = session.cancel_token();

    link::io_with_timeout(
        "pre-connect write",
        session.transport_mut().write_all(&record),
        idle,
        &cancel,
    )
    .await?;

    let mut reply = [0u8; 4];
    link::io_with_timeout(
        "pre-connect ack read",
        session.transport_mut().read_exact(&mut reply),
        idle,
        &cancel,
    )
    .await?;

    if ebcdic::decode(&reply) != ACK {
        return Err(EngineError::NegotiationFailure(
            "pre-connect not acknowledged".into(),
        ));
    }
    session.negotiated.coding = Coding::Ebcdic;
    debug!("pre-connect accepted, session coded EBCDIC");
    Ok(())
}

/// Credentials carried by an accepted pre-connect record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreconnectIdentity {
    pub id: String,
    pub password: String,
}

/// Server side: peek the first bytes of the stream.
///
/// Returns the pre-connect identity if the peer opened with one; any
/// other opening bytes are replayed into the FPDU codec untouched.
pub async fn server_detect<T: Transport>(
    session: &mut Session<T>,
) -> EngineResult<Option<PreconnectIdentity>> {
    let idle = session.timeouts.idle;
    let cancel = session.cancel_token();

    let mut opening: Vec<u8> = Vec::with_capacity(PRECONNECT_LEN);
    let mut chunk = [0u8; PRECONNECT_LEN];

    // The first byte decides: an EBCDIC 'P' opens no plausible FPDU (it
    // would declare a >55 KiB CONNECT), so anything else goes straight
    // to the codec without waiting for more of the stream.
    let ebcdic_p = ebcdic::ascii_to_ebcdic(b'P');
    while opening.is_empty() {
        let n = link::io_with_timeout(
            "opening read",
            session.transport_mut().read(&mut chunk),
            idle,
            &cancel,
        )
        .await?;
        if n == 0 {
            return Err(EngineError::TransportError(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "peer closed before any traffic",
            )));
        }
        opening.extend_from_slice(&chunk[..n]);
    }
    if opening[0] != ebcdic_p {
        session.feed_codec(&Bytes::from(opening))?;
        return Ok(None);
    }

    // Enough bytes to check the whole magic.
    while opening.len() < MAGIC.len() {
        let n = link::io_with_timeout(
            "opening read",
            session.transport_mut().read(&mut chunk),
            idle,
            &cancel,
        )
        .await?;
        if n == 0 {
            return Err(EngineError::MalformedFrame(
                "stream ended inside the pre-connect magic".into(),
            ));
        }
        opening.extend_from_slice(&chunk[..n]);
    }

    if ebcdic::decode(&opening[..MAGIC.len()]) != MAGIC {
        session.feed_codec(&Bytes::from(opening))?;
        return Ok(None);
    }

    while opening.len() < PRECONNECT_LEN {
        let want = PRECONNECT_LEN - opening.len();
        let n = link::io_with_timeout(
            "pre-connect read",
            session.transport_mut().read(&mut chunk[..want]),
            idle,
            &cancel,
        )
        .await?;
        if n == 0 {
            return Err(EngineError::MalformedFrame(
                "truncated pre-connect record".into(),
            ));
        }
        opening.extend_from_slice(&chunk[..n]);
    }

    let id = String::from_utf8(ebcdic::decode_trimmed(&opening[8..16]))
        .map_err(|_| EngineError::MalformedFrame("pre-connect id".into()))?;
    let password = String::from_utf8(ebcdic::decode_trimmed(&opening[16..24]))
        .map_err(|_| EngineError::MalformedFrame("pre-connect password".into()))?;

    // Trailing bytes past the record belong to the first FPDU.
    if opening.len() > PRECONNECT_LEN {
        let rest = Bytes::copy_from_slice(&opening[PRECONNECT_LEN..]);
        session.feed_codec(&rest)?;
    }

    link::io_with_timeout(
        "pre-connect ack write",
        session.transport_mut().write_all(&ebcdic::encode(ACK)),
        idle,
        &cancel,
    )
    .await?;

    session.negotiated.coding = Coding::Ebcdic;
    debug!(%id, "pre-connect detected, session coded EBCDIC");
    Ok(Some(PreconnectIdentity { id, password }))
}

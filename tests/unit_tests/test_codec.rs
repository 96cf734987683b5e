use anyhow::Result;
use bytes::Bytes;
use pesit_engine::{
    fpdu::{CodecError, Fpdu, FpduCodec, FpduKind, HEADER_LEN, codec::decode_one},
    params::{Param, ParamList, Pgi, Pi},
};

fn sample_frames() -> Vec<Fpdu> {
    let mut connect = ParamList::new();
    connect
        .push(Param::new(Pi::Demander, &b"CLI"[..]))
        .push(Param::new(Pi::Server, &b"SRV"[..]));
    connect.put_num(Pi::Version, 2);
    connect.put_num(Pi::MaxEntitySize, 4096);

    let mut create = ParamList::new();
    create.put_num(Pi::TransferId, 7);
    create.push_group(
        Pgi::FileIdentity,
        vec![Param::new(Pi::Filename, &b"INVOICE.DAT"[..])],
    );

    let mut syn = ParamList::new();
    syn.put_num(Pi::SyncNumber, 3);
    syn.put_num(Pi::FileSize, 196608);

    vec![
        Fpdu::control(FpduKind::Connect, connect),
        Fpdu::control(FpduKind::Create, create),
        Fpdu::data(FpduKind::Dtf, 2, Bytes::from_static(b"\x00\x03abc\x00\x02xy")),
        Fpdu::control(FpduKind::Syn, syn),
        Fpdu::control(FpduKind::Release, ParamList::new()),
    ]
}

#[test]
fn every_sample_round_trips() -> Result<()> {
    for fpdu in sample_frames() {
        let wire = FpduCodec::encode(&fpdu)?;
        assert_eq!(decode_one(&wire)?, fpdu);
    }
    Ok(())
}

#[test]
fn concatenated_stream_preserves_the_sequence() -> Result<()> {
    let frames = sample_frames();
    let mut wire = Vec::new();
    for fpdu in &frames {
        wire.extend_from_slice(&FpduCodec::encode(fpdu)?);
    }

    let mut codec = FpduCodec::new();
    codec.feed(&wire)?;
    let mut seen = Vec::new();
    while let Some(f) = codec.next_fpdu() {
        seen.push(f);
    }
    assert_eq!(seen, frames);
    Ok(())
}

#[test]
fn byte_at_a_time_feeding_still_frames_correctly() -> Result<()> {
    let frames = sample_frames();
    let mut wire = Vec::new();
    for fpdu in &frames {
        wire.extend_from_slice(&FpduCodec::encode(fpdu)?);
    }

    let mut codec = FpduCodec::new();
    let mut seen = Vec::new();
    for byte in wire {
        codec.feed(&[byte])?;
        while let Some(f) = codec.next_fpdu() {
            seen.push(f);
        }
    }
    assert_eq!(seen, frames);
    assert_eq!(codec.buffered(), 0);
    Ok(())
}

#[test]
fn length_below_header_is_rejected() {
    let mut codec = FpduCodec::new();
    let err = codec.feed(&[0x00, 0x03, 0x00, 0x00]).expect_err("short length");
    assert!(matches!(err, CodecError::LengthTooSmall(3)));
}

#[test]
fn encoded_length_field_matches_reality() -> Result<()> {
    for fpdu in sample_frames() {
        let wire = FpduCodec::encode(&fpdu)?;
        let declared = u16::from_be_bytes([wire[0], wire[1]]) as usize;
        assert_eq!(declared, wire.len());
        assert_eq!(declared, HEADER_LEN + fpdu.body_len());
    }
    Ok(())
}

#[test]
fn bodies_too_large_for_u16_are_refused() {
    let huge = Fpdu::data(FpduKind::Dtf, 1, Bytes::from(vec![0u8; 70_000]));
    assert!(matches!(
        FpduCodec::encode(&huge),
        Err(CodecError::BodyTooLarge(_))
    ));
}

use hex_literal::hex;
use pesit_engine::ebcdic;

#[test]
fn invariant_charset_round_trips() {
    let sample = b"The quick BROWN fox 0123456789 .,:=()/-";
    let encoded = ebcdic::encode(sample);
    assert_eq!(ebcdic::decode(&encoded), sample);
}

#[test]
fn known_cp500_bytes() {
    // "PESIT" and "ACK0" as they appear on a real Hors-SIT link.
    assert_eq!(ebcdic::encode(b"PESIT"), hex!("D7 C5 E2 C9 E3"));
    assert_eq!(ebcdic::encode(b"ACK0"), hex!("C1 C3 D2 F0"));
}

#[test]
fn space_padding_is_ebcdic_space() {
    let field = ebcdic::encode_padded(b"AB", 4);
    assert_eq!(field, hex!("C1 C2 40 40"));
    assert_eq!(ebcdic::decode_trimmed(&field), b"AB");
}

#[test]
fn control_bytes_never_round_trip_into_controls() {
    for b in 0u8..0x20 {
        let e = ebcdic::ascii_to_ebcdic(b);
        let back = ebcdic::ebcdic_to_ascii(e);
        assert!(back == b'?' || back >= 0x20, "byte {b:#04x} -> {back:#04x}");
    }
}

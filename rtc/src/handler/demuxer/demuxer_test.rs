use super::*;

#[test]
fn test_range_boundaries() {
    assert_eq!(classify(&[0, 1, 0]), MessageKind::Stun);
    assert_eq!(classify(&[1, 1, 0]), MessageKind::Stun);
    assert_eq!(classify(&[2, 0, 0]), MessageKind::Unknown);
    assert_eq!(classify(&[19, 0, 0]), MessageKind::Unknown);
    assert_eq!(classify(&[20, 0, 0]), MessageKind::Dtls);
    assert_eq!(classify(&[63, 0, 0]), MessageKind::Dtls);
    assert_eq!(classify(&[64, 0, 0]), MessageKind::Unknown);
    assert_eq!(classify(&[127, 0, 0]), MessageKind::Unknown);
    assert_eq!(classify(&[128, 96, 0]), MessageKind::Srtp);
    assert_eq!(classify(&[191, 96, 0]), MessageKind::Srtp);
    assert_eq!(classify(&[192, 0, 0]), MessageKind::Unknown);
}

#[test]
fn test_rtcp_payload_types_split_from_rtp() {
    // second byte 200..=206 is RTCP
    assert_eq!(classify(&[0x80, 200]), MessageKind::Srtcp);
    assert_eq!(classify(&[0x80, 206]), MessageKind::Srtcp);
    assert_eq!(classify(&[0x80, 199]), MessageKind::Srtp);
    assert_eq!(classify(&[0x80, 207]), MessageKind::Srtp);
    // marker bit set on a video payload type stays RTP
    assert_eq!(classify(&[0x80, 102 | 0x80]), MessageKind::Srtp);
}

#[test]
fn test_empty_datagram_is_unknown() {
    assert_eq!(classify(&[]), MessageKind::Unknown);
}

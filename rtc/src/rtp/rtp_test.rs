use super::*;

fn packet_with_extension() -> BytesMut {
    let mut packet = BytesMut::new();
    // V=2, X=1, marker, PT=102
    packet.extend_from_slice(&[0x90, 0x80 | 102]);
    packet.extend_from_slice(&1000u16.to_be_bytes());
    packet.extend_from_slice(&90_000u32.to_be_bytes());
    packet.extend_from_slice(&0x1234_5678u32.to_be_bytes());
    // one-word MID extension
    packet.extend_from_slice(&0xBEDEu16.to_be_bytes());
    packet.extend_from_slice(&1u16.to_be_bytes());
    packet.extend_from_slice(&[0x10, b'0', 0x00, 0x00]);
    packet.extend_from_slice(b"h264 payload");
    packet
}

#[test]
fn test_parse_header_fields() {
    let packet = packet_with_extension();
    let header = RtpHeader::parse(&packet).unwrap();
    assert_eq!(header.version, 2);
    assert!(header.extension);
    assert!(header.marker);
    assert_eq!(header.payload_type, 102);
    assert_eq!(header.sequence_number, 1000);
    assert_eq!(header.timestamp, 90_000);
    assert_eq!(header.ssrc, 0x1234_5678);
    assert_eq!(header.extension_words, 1);
    assert_eq!(header.base_len(), 12);
    assert_eq!(header.extension_len(), 8);
}

#[test]
fn test_set_ssrc() {
    let mut packet = packet_with_extension();
    set_ssrc(&mut packet, crate::constants::VIDEO_SSRC);
    let header = RtpHeader::parse(&packet).unwrap();
    assert_eq!(header.ssrc, crate::constants::VIDEO_SSRC);
}

#[test]
fn test_strip_extension_preserves_header_and_payload() {
    let mut packet = packet_with_extension();
    let header = RtpHeader::parse(&packet).unwrap();
    let original_len = packet.len();

    strip_extension(&mut packet, &header).unwrap();
    assert_eq!(packet.len(), original_len - header.extension_len());

    let stripped = RtpHeader::parse(&packet).unwrap();
    assert!(!stripped.extension);
    assert_eq!(stripped.sequence_number, 1000);
    assert_eq!(stripped.timestamp, 90_000);
    assert_eq!(stripped.ssrc, 0x1234_5678);
    assert_eq!(&packet[12..], b"h264 payload");
}

#[test]
fn test_strip_without_extension_is_noop() {
    let mut packet = BytesMut::new();
    packet.extend_from_slice(&[0x80, 102]);
    packet.extend_from_slice(&[0u8; 10]);
    packet.extend_from_slice(b"payload");
    let header = RtpHeader::parse(&packet).unwrap();
    let before = packet.clone();
    strip_extension(&mut packet, &header).unwrap();
    assert_eq!(packet, before);
}

#[test]
fn test_truncated_headers_rejected() {
    assert_eq!(
        RtpHeader::parse(&[0x80; 8]),
        Err(Error::ErrHeaderSizeInsufficient)
    );
    // extension bit set but no extension header present
    let mut packet = BytesMut::new();
    packet.extend_from_slice(&[0x90, 102]);
    packet.extend_from_slice(&[0u8; 10]);
    assert_eq!(
        RtpHeader::parse(&packet),
        Err(Error::ErrHeaderSizeInsufficientForExtension)
    );
}

use super::*;
use std::str::FromStr;

fn sample_response() -> BytesMut {
    let peer = SocketAddr::from_str("1.2.3.4:50000").unwrap();
    let mut builder = MessageBuilder::new(BINDING_RESPONSE, [0xABu8; 12]);
    builder.add_xor_mapped_address(peer).unwrap();
    builder.add_attribute(ATTR_USERNAME, b"L:R").unwrap();
    builder.add_message_integrity(b"Lpwd").unwrap();
    builder.add_fingerprint().unwrap();
    builder.build().unwrap()
}

#[test]
fn test_unmarshal_round_trip() {
    let raw = sample_response();
    let msg = Message::unmarshal(&raw).unwrap();

    assert_eq!(msg.typ, BINDING_RESPONSE);
    assert_eq!(msg.transaction_id, [0xABu8; 12]);
    assert_eq!(
        msg.xor_mapped_address().unwrap(),
        SocketAddr::from_str("1.2.3.4:50000").unwrap()
    );
    assert_eq!(msg.username().unwrap(), ("L".to_owned(), "R".to_owned()));
    assert!(msg.get(ATTR_MESSAGE_INTEGRITY).is_some());
    assert!(msg.get(ATTR_FINGERPRINT).is_some());
}

#[test]
fn test_integrity_and_fingerprint_verify() {
    let raw = sample_response();
    verify_integrity(&raw, b"Lpwd").unwrap();
    verify_fingerprint(&raw).unwrap();
}

#[test]
fn test_integrity_rejects_wrong_key_and_tampering() {
    let raw = sample_response();
    assert_eq!(
        verify_integrity(&raw, b"not-the-password"),
        Err(Error::ErrIntegrityMismatch)
    );

    let mut tampered = raw.clone();
    // flip a bit inside the USERNAME value
    let len = tampered.len();
    tampered[len - 40] ^= 0x01;
    assert!(verify_integrity(&tampered, b"Lpwd").is_err());
}

#[test]
fn test_attribute_length_beyond_body_is_malformed() {
    let mut builder = MessageBuilder::new(BINDING_REQUEST, [1u8; 12]);
    builder.add_attribute(ATTR_USERNAME, b"L:R").unwrap();
    let mut raw = builder.build().unwrap();
    // claim the attribute value is longer than the message
    raw[22] = 0xFF;
    raw[23] = 0xFF;
    assert_eq!(
        Message::unmarshal(&raw),
        Err(Error::ErrAttributeSizeInvalid)
    );
}

#[test]
fn test_truncated_header() {
    assert_eq!(
        Message::unmarshal(&[0u8; 12]),
        Err(Error::ErrUnexpectedHeaderEof)
    );
}

#[test]
fn test_username_without_colon() {
    let mut builder = MessageBuilder::new(BINDING_REQUEST, [1u8; 12]);
    builder.add_attribute(ATTR_USERNAME, b"nocolon").unwrap();
    let msg = Message::unmarshal(&builder.build().unwrap()).unwrap();
    assert_eq!(msg.username(), Err(Error::ErrUsernameFormat));
}

#[test]
fn test_attribute_padding_is_skipped() {
    let mut builder = MessageBuilder::new(BINDING_REQUEST, [1u8; 12]);
    builder.add_attribute(ATTR_USERNAME, b"abcde").unwrap();
    builder.add_attribute(ATTR_SOFTWARE, b"relay").unwrap();
    let msg = Message::unmarshal(&builder.build().unwrap()).unwrap();
    assert_eq!(msg.get(ATTR_USERNAME).unwrap(), b"abcde");
    assert_eq!(msg.get(ATTR_SOFTWARE).unwrap(), b"relay");
}

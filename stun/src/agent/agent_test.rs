use super::*;
use crate::message::{verify_fingerprint, verify_integrity, MessageBuilder};
use shared::error::Error;
use std::net::SocketAddr;
use std::str::FromStr;

fn test_agent() -> Agent {
    Agent::new(Credentials {
        local_ufrag: "L".to_owned(),
        local_pwd: "Lpwd".to_owned(),
        remote_ufrag: "R".to_owned(),
        remote_pwd: "Rpwd".to_owned(),
    })
}

fn binding_request_from_peer(tid: [u8; 12]) -> Message {
    let mut request = MessageBuilder::new(BINDING_REQUEST, tid);
    request.add_attribute(ATTR_USERNAME, b"L:R").unwrap();
    request.add_message_integrity(b"Lpwd").unwrap();
    request.add_fingerprint().unwrap();
    Message::unmarshal(&request.build().unwrap()).unwrap()
}

#[test]
fn test_binding_request_yields_verifiable_response() {
    let mut agent = test_agent();
    let peer = SocketAddr::from_str("1.2.3.4:50000").unwrap();
    let tid = [7u8; 12];

    let request = binding_request_from_peer(tid);
    let response = agent
        .handle_message(&request, peer)
        .unwrap()
        .expect("binding request must produce a response");

    let parsed = Message::unmarshal(&response).unwrap();
    assert_eq!(parsed.typ, BINDING_RESPONSE);
    assert_eq!(parsed.transaction_id, tid);
    assert_eq!(parsed.xor_mapped_address().unwrap(), peer);
    assert_eq!(parsed.get(ATTR_USERNAME).unwrap(), b"L:R");

    verify_integrity(&response, b"Lpwd").unwrap();
    verify_fingerprint(&response).unwrap();
}

#[test]
fn test_malformed_username_is_rejected() {
    let mut agent = test_agent();
    let peer = SocketAddr::from_str("1.2.3.4:50000").unwrap();

    let mut request = MessageBuilder::new(BINDING_REQUEST, [1u8; 12]);
    request.add_attribute(ATTR_USERNAME, b"no-colon").unwrap();
    let msg = Message::unmarshal(&request.build().unwrap()).unwrap();

    assert_eq!(
        agent.handle_message(&msg, peer).unwrap_err(),
        Error::ErrUsernameFormat
    );
}

#[test]
fn test_binding_response_triggers_indication() {
    let mut agent = test_agent();
    let peer = SocketAddr::from_str("1.2.3.4:50000").unwrap();

    let response = Message {
        typ: BINDING_RESPONSE,
        transaction_id: [2u8; 12],
        attributes: vec![],
    };
    let indication = agent
        .handle_message(&response, peer)
        .unwrap()
        .expect("binding response must trigger an indication");

    let parsed = Message::unmarshal(&indication).unwrap();
    assert_eq!(parsed.typ, BINDING_INDICATION);
    verify_integrity(&indication, b"Rpwd").unwrap();
    verify_fingerprint(&indication).unwrap();
}

#[test]
fn test_unknown_message_type_accepted_silently() {
    let mut agent = test_agent();
    let peer = SocketAddr::from_str("1.2.3.4:50000").unwrap();

    let msg = Message {
        typ: 0x0002,
        transaction_id: [3u8; 12],
        attributes: vec![],
    };
    assert!(agent.handle_message(&msg, peer).unwrap().is_none());
}

#[test]
fn test_binding_request_reverses_username() {
    let agent = test_agent();
    let request = agent.binding_request().unwrap();
    let parsed = Message::unmarshal(&request).unwrap();
    assert_eq!(parsed.typ, BINDING_REQUEST);
    assert_eq!(parsed.get(ATTR_USERNAME).unwrap(), b"R:L");
    verify_integrity(&request, b"Rpwd").unwrap();
    verify_fingerprint(&request).unwrap();
}

//! ICE-lite binding responder.
//!
//! The agent never originates connectivity checks; it answers the peer's
//! Binding Requests and keeps the path warm with Binding Indications once
//! the peer's checks succeed.

#[cfg(test)]
mod agent_test;

use crate::message::{
    transaction_id, Message, MessageBuilder, ATTR_ICE_CONTROLLED, ATTR_PRIORITY, ATTR_USERNAME,
    BINDING_INDICATION, BINDING_REQUEST, BINDING_RESPONSE,
};
use bytes::BytesMut;
use log::debug;
use rand::Rng;
use shared::error::{Error, Result};
use std::net::SocketAddr;

/// ICE credentials for one session, local and remote halves.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub local_ufrag: String,
    pub local_pwd: String,
    pub remote_ufrag: String,
    pub remote_pwd: String,
}

/// ICE-lite responder bound to one session's credentials.
#[derive(Debug, Clone, Default)]
pub struct Agent {
    pub credentials: Credentials,
}

impl Agent {
    pub fn new(credentials: Credentials) -> Self {
        Agent { credentials }
    }

    /// React to one inbound STUN message. Returns the datagram to send
    /// back, if any. A malformed USERNAME fails the call and the caller
    /// drops the datagram; unknown message types are accepted silently.
    pub fn handle_message(&mut self, msg: &Message, peer: SocketAddr) -> Result<Option<BytesMut>> {
        match msg.typ {
            BINDING_REQUEST => {
                let (local_ufrag, remote_ufrag) = msg.username()?;
                debug!(
                    "binding request from {}, local_ufrag={}, remote_ufrag={}",
                    peer, local_ufrag, remote_ufrag
                );
                if self.credentials.remote_ufrag.is_empty() {
                    self.credentials.remote_ufrag = remote_ufrag;
                }
                Ok(Some(self.binding_response(msg, peer)?))
            }
            BINDING_RESPONSE => {
                debug!("binding response from {}, keep path warm", peer);
                Ok(Some(self.binding_indication()?))
            }
            other => {
                debug!("ignore stun message type 0x{:04x} from {}", other, peer);
                Ok(None)
            }
        }
    }

    /// Binding Response echoing the request's transaction id and USERNAME,
    /// with the reflexive peer address, keyed by `local_pwd`.
    fn binding_response(&self, request: &Message, peer: SocketAddr) -> Result<BytesMut> {
        let username = request
            .get(ATTR_USERNAME)
            .ok_or(Error::ErrAttributeNotFound)?
            .to_vec();

        let mut response = MessageBuilder::new(BINDING_RESPONSE, request.transaction_id);
        response.add_xor_mapped_address(peer)?;
        response.add_attribute(ATTR_USERNAME, &username)?;
        response.add_message_integrity(self.credentials.local_pwd.as_bytes())?;
        response.add_fingerprint()?;
        response.build()
    }

    /// Binding Indication carrying only MESSAGE-INTEGRITY (keyed by
    /// `remote_pwd`) and FINGERPRINT.
    pub fn binding_indication(&self) -> Result<BytesMut> {
        let mut indication = MessageBuilder::new(BINDING_INDICATION, transaction_id());
        indication.add_message_integrity(self.credentials.remote_pwd.as_bytes())?;
        indication.add_fingerprint()?;
        indication.build()
    }

    /// Binding Request for the controlled role: USERNAME is
    /// `remote_ufrag:local_ufrag` and the integrity key is `remote_pwd`.
    pub fn binding_request(&self) -> Result<BytesMut> {
        let username = format!(
            "{}:{}",
            self.credentials.remote_ufrag, self.credentials.local_ufrag
        );

        let mut request = MessageBuilder::new(BINDING_REQUEST, transaction_id());
        request.add_attribute(ATTR_USERNAME, username.as_bytes())?;

        let tie_breaker: u64 = rand::rng().random();
        request.add_attribute(ATTR_ICE_CONTROLLED, &tie_breaker.to_be_bytes())?;
        request.add_attribute(ATTR_PRIORITY, &host_priority(0xFFFF, true).to_be_bytes())?;
        request.add_message_integrity(self.credentials.remote_pwd.as_bytes())?;
        request.add_fingerprint()?;
        request.build()
    }
}

/// Host candidate priority: type preference 126, component 1 for RTP.
fn host_priority(local_pref: u16, is_rtp: bool) -> u32 {
    let component = if is_rtp { 1u32 } else { 2u32 };
    (126 << 24) + ((local_pref as u32) << 8) + (256 - component)
}

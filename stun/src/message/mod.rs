//! STUN message codec (RFC 5389 subset).
//!
//! The fixed 20-byte header is `type(2) | length(2) | magic | transaction(12)`,
//! followed by TLV attributes padded to 4-byte boundaries. MESSAGE-INTEGRITY
//! and FINGERPRINT are computed over the message as if the `length` field
//! already covered the attribute being appended.

#[cfg(test)]
mod message_test;

use bytes::BytesMut;
use hmac::{Hmac, Mac};
use rand::Rng;
use sha1::Sha1;
use shared::bits::{BitBuffer, BitStream};
use shared::crc::stun_fingerprint;
use shared::error::{Error, Result};
use std::net::{IpAddr, SocketAddr};

type HmacSha1 = Hmac<Sha1>;

pub const MAGIC_COOKIE: u32 = 0x2112_A442;
pub const HEADER_LEN: usize = 20;
pub const TRANSACTION_ID_LEN: usize = 12;

// Message types.
pub const BINDING_REQUEST: u16 = 0x0001;
pub const BINDING_INDICATION: u16 = 0x0011;
pub const BINDING_RESPONSE: u16 = 0x0101;
pub const BINDING_ERROR_RESPONSE: u16 = 0x0111;

// Attribute types.
pub const ATTR_MAPPED_ADDRESS: u16 = 0x0001;
pub const ATTR_USERNAME: u16 = 0x0006;
pub const ATTR_MESSAGE_INTEGRITY: u16 = 0x0008;
pub const ATTR_ERROR_CODE: u16 = 0x0009;
pub const ATTR_XOR_MAPPED_ADDRESS: u16 = 0x0020;
pub const ATTR_PRIORITY: u16 = 0x0024;
pub const ATTR_USE_CANDIDATE: u16 = 0x0025;
pub const ATTR_SOFTWARE: u16 = 0x8022;
pub const ATTR_FINGERPRINT: u16 = 0x8028;
pub const ATTR_ICE_CONTROLLED: u16 = 0x8029;
pub const ATTR_ICE_CONTROLLING: u16 = 0x802A;

const INTEGRITY_LEN: usize = 20;
const FINGERPRINT_LEN: usize = 4;

fn attr_padding(len: usize) -> usize {
    (4 - len % 4) % 4
}

fn hmac_sha1(key: &[u8], input: &[u8]) -> Result<[u8; 20]> {
    let mut mac = HmacSha1::new_from_slice(key).map_err(|e| Error::Other(e.to_string()))?;
    mac.update(input);
    let tag = mac.finalize().into_bytes();
    let mut out = [0u8; 20];
    out.copy_from_slice(&tag);
    Ok(out)
}

/// A single parsed attribute, value kept raw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAttribute {
    pub typ: u16,
    pub value: Vec<u8>,
}

/// A parsed STUN message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub typ: u16,
    pub transaction_id: [u8; TRANSACTION_ID_LEN],
    pub attributes: Vec<RawAttribute>,
}

impl Message {
    /// Parse a datagram already classified as STUN by the demuxer.
    pub fn unmarshal(data: &[u8]) -> Result<Self> {
        let mut buf = BitBuffer::new(data);
        if !buf.has_bytes(HEADER_LEN) {
            return Err(Error::ErrUnexpectedHeaderEof);
        }

        let typ = buf.read_uint(2)? as u16;
        let length = buf.read_uint(2)? as usize;
        let _magic = buf.read_uint(4)?;
        let mut transaction_id = [0u8; TRANSACTION_ID_LEN];
        transaction_id.copy_from_slice(buf.read_slice(TRANSACTION_ID_LEN)?);

        if buf.bytes_left() < length {
            return Err(Error::ErrAttributeSizeInvalid);
        }

        let mut attributes = Vec::new();
        let mut body = BitBuffer::new(buf.read_slice(length)?);
        while body.has_bytes(4) {
            let attr_typ = body.read_uint(2)? as u16;
            let attr_len = body.read_uint(2)? as usize;
            if body.bytes_left() < attr_len {
                return Err(Error::ErrAttributeSizeInvalid);
            }
            let value = body.read_slice(attr_len)?.to_vec();
            let pad = attr_padding(attr_len).min(body.bytes_left());
            body.read_slice(pad)?;
            attributes.push(RawAttribute {
                typ: attr_typ,
                value,
            });
        }

        Ok(Message {
            typ,
            transaction_id,
            attributes,
        })
    }

    pub fn get(&self, typ: u16) -> Option<&[u8]> {
        self.attributes
            .iter()
            .find(|a| a.typ == typ)
            .map(|a| a.value.as_slice())
    }

    /// USERNAME split at the first `:` into `(local_ufrag, remote_ufrag)`.
    pub fn username(&self) -> Result<(String, String)> {
        let raw = self.get(ATTR_USERNAME).ok_or(Error::ErrAttributeNotFound)?;
        let username = String::from_utf8(raw.to_vec())?;
        let (local, remote) = username
            .split_once(':')
            .ok_or(Error::ErrUsernameFormat)?;
        if local.is_empty() || remote.is_empty() {
            return Err(Error::ErrUsernameFormat);
        }
        Ok((local.to_owned(), remote.to_owned()))
    }

    /// Decode the XOR-MAPPED-ADDRESS attribute (IPv4 family only).
    pub fn xor_mapped_address(&self) -> Result<SocketAddr> {
        let raw = self
            .get(ATTR_XOR_MAPPED_ADDRESS)
            .ok_or(Error::ErrAttributeNotFound)?;
        if raw.len() != 8 {
            return Err(Error::ErrBadIpLength);
        }
        if raw[1] != 0x01 {
            return Err(Error::ErrUnsupportedFamily);
        }
        let port = u16::from_be_bytes([raw[2], raw[3]]) ^ (MAGIC_COOKIE >> 16) as u16;
        let ip = u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]) ^ MAGIC_COOKIE;
        Ok(SocketAddr::new(IpAddr::from(ip.to_be_bytes()), port))
    }
}

/// Incremental builder that appends attributes and finalizes the header.
pub struct MessageBuilder {
    typ: u16,
    transaction_id: [u8; TRANSACTION_ID_LEN],
    body: BitStream,
}

impl MessageBuilder {
    pub fn new(typ: u16, transaction_id: [u8; TRANSACTION_ID_LEN]) -> Self {
        MessageBuilder {
            typ,
            transaction_id,
            body: BitStream::new(),
        }
    }

    /// Append one TLV attribute, zero padded to a 4-byte boundary. The
    /// length field records the unpadded size.
    pub fn add_attribute(&mut self, typ: u16, value: &[u8]) -> Result<()> {
        self.body.write_uint(2, typ as u64)?;
        self.body.write_uint(2, value.len() as u64)?;
        self.body.write_all(value)?;
        for _ in 0..attr_padding(value.len()) {
            self.body.write_uint(1, 0)?;
        }
        Ok(())
    }

    /// XOR-MAPPED-ADDRESS for an IPv4 peer: port XORed with the magic
    /// cookie's high half, address XORed with the full cookie.
    pub fn add_xor_mapped_address(&mut self, addr: SocketAddr) -> Result<()> {
        let ip = match addr.ip() {
            IpAddr::V4(v4) => u32::from_be_bytes(v4.octets()),
            IpAddr::V6(_) => return Err(Error::ErrUnsupportedFamily),
        };
        let mut value = BitStream::new();
        value.write_uint(1, 0x00)?;
        value.write_uint(1, 0x01)?;
        value.write_uint(2, (addr.port() ^ (MAGIC_COOKIE >> 16) as u16) as u64)?;
        value.write_uint(4, (ip ^ MAGIC_COOKIE) as u64)?;
        self.add_attribute(ATTR_XOR_MAPPED_ADDRESS, value.as_slice())
    }

    /// HMAC-SHA1 over the message with the header length advanced past the
    /// MESSAGE-INTEGRITY attribute that is about to be appended.
    pub fn add_message_integrity(&mut self, key: &[u8]) -> Result<()> {
        let input = self.header_prefix(self.body.len() + 4 + INTEGRITY_LEN)?;
        let tag = hmac_sha1(key, input.as_slice())?;
        self.add_attribute(ATTR_MESSAGE_INTEGRITY, &tag)
    }

    /// CRC32 over the message with the header length advanced past the
    /// FINGERPRINT attribute, XORed with 0x5354554E.
    pub fn add_fingerprint(&mut self) -> Result<()> {
        let input = self.header_prefix(self.body.len() + 4 + FINGERPRINT_LEN)?;
        let crc = stun_fingerprint(input.as_slice());
        self.add_attribute(ATTR_FINGERPRINT, &crc.to_be_bytes())
    }

    pub fn build(self) -> Result<BytesMut> {
        let out = self.header_prefix(self.body.len())?;
        Ok(out.into_bytes())
    }

    fn header_prefix(&self, length: usize) -> Result<BitStream> {
        let mut out = BitStream::new();
        out.write_uint(2, self.typ as u64)?;
        out.write_uint(2, length as u64)?;
        out.write_uint(4, MAGIC_COOKIE as u64)?;
        out.write_all(&self.transaction_id)?;
        out.write_all(self.body.as_slice())?;
        Ok(out)
    }
}

/// Verify the MESSAGE-INTEGRITY attribute of an encoded message under `key`.
pub fn verify_integrity(data: &[u8], key: &[u8]) -> Result<()> {
    let (attr_offset, tag) = find_attribute(data, ATTR_MESSAGE_INTEGRITY)?;
    if tag.len() != INTEGRITY_LEN {
        return Err(Error::ErrAttributeSizeInvalid);
    }

    let mut input = BitStream::new();
    input.write_all(&data[..attr_offset])?;
    // length as if MESSAGE-INTEGRITY were the last attribute
    input.replace_uint(2, 2, (attr_offset - HEADER_LEN + 4 + INTEGRITY_LEN) as u64)?;

    let expected = hmac_sha1(key, input.as_slice())?;
    if expected[..] != tag[..] {
        return Err(Error::ErrIntegrityMismatch);
    }
    Ok(())
}

/// Verify the FINGERPRINT attribute of an encoded message.
pub fn verify_fingerprint(data: &[u8]) -> Result<()> {
    let (attr_offset, value) = find_attribute(data, ATTR_FINGERPRINT)?;
    if value.len() != FINGERPRINT_LEN {
        return Err(Error::ErrAttributeSizeInvalid);
    }

    let mut input = BitStream::new();
    input.write_all(&data[..attr_offset])?;
    input.replace_uint(2, 2, (attr_offset - HEADER_LEN + 4 + FINGERPRINT_LEN) as u64)?;

    let expected = stun_fingerprint(input.as_slice());
    if expected.to_be_bytes()[..] != value[..] {
        return Err(Error::ErrFingerprintMismatch);
    }
    Ok(())
}

/// Locate an attribute in an encoded message, returning the byte offset of
/// its TLV header and its value.
fn find_attribute(data: &[u8], typ: u16) -> Result<(usize, &[u8])> {
    if data.len() < HEADER_LEN {
        return Err(Error::ErrUnexpectedHeaderEof);
    }
    let mut offset = HEADER_LEN;
    while offset + 4 <= data.len() {
        let attr_typ = u16::from_be_bytes([data[offset], data[offset + 1]]);
        let attr_len = u16::from_be_bytes([data[offset + 2], data[offset + 3]]) as usize;
        let value_end = offset + 4 + attr_len;
        if value_end > data.len() {
            return Err(Error::ErrAttributeSizeInvalid);
        }
        if attr_typ == typ {
            return Ok((offset, &data[offset + 4..value_end]));
        }
        offset = value_end + attr_padding(attr_len);
    }
    Err(Error::ErrAttributeNotFound)
}

/// Fresh random transaction id.
pub fn transaction_id() -> [u8; TRANSACTION_ID_LEN] {
    let mut id = [0u8; TRANSACTION_ID_LEN];
    rand::rng().fill(&mut id[..]);
    id
}

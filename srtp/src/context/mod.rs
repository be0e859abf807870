//! SRTP/SRTCP protection context for one direction.
//!
//! The caller hands in a scratch copy of the datagram; protection and
//! unprotection happen in place and adjust the buffer length. A failed
//! unprotect only drops that packet, it never tears the session down.

#[cfg(test)]
mod context_test;

use crate::config::Config;
use crate::kdf::{compute_iv, derive_session_keys, Aes128Ctr, SessionKeys};
use crate::replay::ReplayWindow;
use crate::AUTH_TAG_LEN;
use aes::cipher::{KeyIvInit, StreamCipher};
use bytes::BytesMut;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use shared::error::{Error, Result};
use std::collections::HashMap;

type HmacSha1 = Hmac<Sha1>;

const RTP_FIXED_HEADER_LEN: usize = 12;
const RTCP_FIXED_HEADER_LEN: usize = 8;
const SRTCP_INDEX_LEN: usize = 4;
const SRTCP_E_BIT: u32 = 0x8000_0000;

struct RtpStream {
    roc: u32,
    last_seq: u16,
    started: bool,
    replay: ReplayWindow,
}

struct RtcpStream {
    next_index: u32,
    replay: ReplayWindow,
}

/// Protection context holding the derived session keys and per-SSRC state
/// for any number of inbound or outbound streams.
pub struct Context {
    keys: SessionKeys,
    window_size: usize,
    allow_repeat_tx: bool,
    rtp_streams: HashMap<u32, RtpStream>,
    rtcp_streams: HashMap<u32, RtcpStream>,
}

impl Context {
    pub fn new(config: Config) -> Self {
        let keys = derive_session_keys(&config.master_key, &config.master_salt);
        Context {
            keys,
            window_size: config.window_size,
            allow_repeat_tx: config.allow_repeat_tx,
            rtp_streams: HashMap::new(),
            rtcp_streams: HashMap::new(),
        }
    }

    /// Encrypt and authenticate an RTP packet in place, appending the tag.
    pub fn protect_rtp(&mut self, packet: &mut BytesMut) -> Result<()> {
        let header_len = rtp_header_len(packet)?;
        let seq = u16::from_be_bytes([packet[2], packet[3]]);
        let ssrc = u32::from_be_bytes([packet[8], packet[9], packet[10], packet[11]]);

        let (roc, index) = {
            let window_size = self.window_size;
            let stream = self
                .rtp_streams
                .entry(ssrc)
                .or_insert_with(|| RtpStream {
                    roc: 0,
                    last_seq: seq,
                    started: false,
                    replay: ReplayWindow::new(window_size),
                });
            let roc = stream.roc_for_send(seq);
            let index = ((roc as u64) << 16) | seq as u64;
            if !self.allow_repeat_tx && stream.replay.is_replay(index) {
                return Err(Error::ErrDuplicated);
            }
            stream.replay.record(index);
            (roc, index)
        };

        let iv = compute_iv(&self.keys.rtp_salt, ssrc, index);
        let mut cipher = Aes128Ctr::new(&self.keys.rtp_enc.into(), &iv.into());
        cipher.apply_keystream(&mut packet[header_len..]);

        let tag = self.rtp_tag(packet, roc)?;
        packet.extend_from_slice(&tag);
        Ok(())
    }

    /// Verify and decrypt an SRTP packet in place, stripping the tag.
    pub fn unprotect_rtp(&mut self, packet: &mut BytesMut) -> Result<()> {
        if packet.len() < RTP_FIXED_HEADER_LEN + AUTH_TAG_LEN {
            return Err(Error::ErrTooShortRtp);
        }
        let tag_start = packet.len() - AUTH_TAG_LEN;
        let seq = u16::from_be_bytes([packet[2], packet[3]]);
        let ssrc = u32::from_be_bytes([packet[8], packet[9], packet[10], packet[11]]);

        let window_size = self.window_size;
        let stream = self
            .rtp_streams
            .entry(ssrc)
            .or_insert_with(|| RtpStream {
                roc: 0,
                last_seq: seq,
                started: false,
                replay: ReplayWindow::new(window_size),
            });
        let roc = stream.roc_for_recv(seq);
        let index = ((roc as u64) << 16) | seq as u64;
        if stream.replay.is_replay(index) {
            return Err(Error::ErrDuplicated);
        }

        {
            let (content, tag) = packet.split_at(tag_start);
            let computed = rtp_tag_over(&self.keys.rtp_auth, content, roc)?;
            if !constant_time_eq(&computed, tag) {
                return Err(Error::ErrFailedToVerifyAuthTag);
            }
        }

        packet.truncate(tag_start);
        let header_len = rtp_header_len(packet)?;
        let iv = compute_iv(&self.keys.rtp_salt, ssrc, index);
        let mut cipher = Aes128Ctr::new(&self.keys.rtp_enc.into(), &iv.into());
        cipher.apply_keystream(&mut packet[header_len..]);

        if let Some(stream) = self.rtp_streams.get_mut(&ssrc) {
            stream.commit_recv(seq, roc);
            stream.replay.record(index);
        }
        Ok(())
    }

    /// Encrypt and authenticate a compound RTCP packet in place, appending
    /// the SRTCP index word and the tag.
    pub fn protect_rtcp(&mut self, packet: &mut BytesMut) -> Result<()> {
        if packet.len() < RTCP_FIXED_HEADER_LEN {
            return Err(Error::ErrTooShortRtcp);
        }
        let ssrc = u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]]);

        let window_size = self.window_size;
        let stream = self
            .rtcp_streams
            .entry(ssrc)
            .or_insert_with(|| RtcpStream {
                next_index: 0,
                replay: ReplayWindow::new(window_size),
            });
        // 31-bit index, allocated per protected packet
        let index = stream.next_index & 0x7FFF_FFFF;
        stream.next_index = (stream.next_index + 1) & 0x7FFF_FFFF;

        let iv = compute_iv(&self.keys.rtcp_salt, ssrc, index as u64);
        let mut cipher = Aes128Ctr::new(&self.keys.rtcp_enc.into(), &iv.into());
        cipher.apply_keystream(&mut packet[RTCP_FIXED_HEADER_LEN..]);

        packet.extend_from_slice(&(SRTCP_E_BIT | index).to_be_bytes());

        let tag = rtcp_tag_over(&self.keys.rtcp_auth, packet)?;
        packet.extend_from_slice(&tag);
        Ok(())
    }

    /// Verify and decrypt an SRTCP packet in place, stripping the index
    /// word and the tag.
    pub fn unprotect_rtcp(&mut self, packet: &mut BytesMut) -> Result<()> {
        if packet.len() < RTCP_FIXED_HEADER_LEN + SRTCP_INDEX_LEN + AUTH_TAG_LEN {
            return Err(Error::ErrTooShortRtcp);
        }
        let tag_start = packet.len() - AUTH_TAG_LEN;
        let index_start = tag_start - SRTCP_INDEX_LEN;
        let ssrc = u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]]);

        {
            let (content, tag) = packet.split_at(tag_start);
            let computed = rtcp_tag_over(&self.keys.rtcp_auth, content)?;
            if !constant_time_eq(&computed, tag) {
                return Err(Error::ErrFailedToVerifyAuthTag);
            }
        }

        let index_word = u32::from_be_bytes([
            packet[index_start],
            packet[index_start + 1],
            packet[index_start + 2],
            packet[index_start + 3],
        ]);
        let encrypted = index_word & SRTCP_E_BIT != 0;
        let index = index_word & 0x7FFF_FFFF;

        let window_size = self.window_size;
        let stream = self
            .rtcp_streams
            .entry(ssrc)
            .or_insert_with(|| RtcpStream {
                next_index: 0,
                replay: ReplayWindow::new(window_size),
            });
        if stream.replay.is_replay(index as u64) {
            return Err(Error::ErrDuplicated);
        }

        packet.truncate(index_start);
        if encrypted {
            let iv = compute_iv(&self.keys.rtcp_salt, ssrc, index as u64);
            let mut cipher = Aes128Ctr::new(&self.keys.rtcp_enc.into(), &iv.into());
            cipher.apply_keystream(&mut packet[RTCP_FIXED_HEADER_LEN..]);
        }

        if let Some(stream) = self.rtcp_streams.get_mut(&ssrc) {
            stream.replay.record(index as u64);
        }
        Ok(())
    }

    fn rtp_tag(&self, content: &[u8], roc: u32) -> Result<[u8; AUTH_TAG_LEN]> {
        rtp_tag_over(&self.keys.rtp_auth, content, roc)
    }
}

impl RtpStream {
    /// ROC bookkeeping on the send path: a wrap of the 16-bit sequence
    /// advances the rollover counter.
    fn roc_for_send(&mut self, seq: u16) -> u32 {
        if !self.started {
            self.started = true;
            self.last_seq = seq;
            return self.roc;
        }
        if seq < self.last_seq && self.last_seq - seq > 0x8000 {
            self.roc = self.roc.wrapping_add(1);
        }
        self.last_seq = seq;
        self.roc
    }

    /// ROC estimation on the receive path (RFC 3711 appendix A).
    fn roc_for_recv(&self, seq: u16) -> u32 {
        if !self.started {
            return 0;
        }
        let delta = seq as i32 - self.last_seq as i32;
        if delta <= -0x8000 {
            self.roc.wrapping_add(1)
        } else if delta >= 0x8000 {
            self.roc.wrapping_sub(1)
        } else {
            self.roc
        }
    }

    fn commit_recv(&mut self, seq: u16, roc: u32) {
        if !self.started
            || roc > self.roc
            || (roc == self.roc && seq > self.last_seq)
        {
            self.started = true;
            self.last_seq = seq;
            self.roc = roc;
        }
    }
}

fn rtp_tag_over(auth_key: &[u8], content: &[u8], roc: u32) -> Result<[u8; AUTH_TAG_LEN]> {
    let mut mac = HmacSha1::new_from_slice(auth_key).map_err(|e| Error::Other(e.to_string()))?;
    mac.update(content);
    mac.update(&roc.to_be_bytes());
    truncate_tag(mac)
}

fn rtcp_tag_over(auth_key: &[u8], content: &[u8]) -> Result<[u8; AUTH_TAG_LEN]> {
    let mut mac = HmacSha1::new_from_slice(auth_key).map_err(|e| Error::Other(e.to_string()))?;
    mac.update(content);
    truncate_tag(mac)
}

fn truncate_tag(mac: HmacSha1) -> Result<[u8; AUTH_TAG_LEN]> {
    let full = mac.finalize().into_bytes();
    let mut tag = [0u8; AUTH_TAG_LEN];
    tag.copy_from_slice(&full[..AUTH_TAG_LEN]);
    Ok(tag)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Fixed header + CSRC list + optional extension block.
fn rtp_header_len(packet: &[u8]) -> Result<usize> {
    if packet.len() < RTP_FIXED_HEADER_LEN {
        return Err(Error::ErrTooShortRtp);
    }
    let cc = (packet[0] & 0x0F) as usize;
    let has_extension = packet[0] & 0x10 != 0;

    let mut len = RTP_FIXED_HEADER_LEN + cc * 4;
    if has_extension {
        if packet.len() < len + 4 {
            return Err(Error::ErrHeaderSizeInsufficientForExtension);
        }
        let ext_len = u16::from_be_bytes([packet[len + 2], packet[len + 3]]) as usize;
        len += 4 + ext_len * 4;
    }
    if packet.len() < len {
        return Err(Error::ErrHeaderSizeInsufficient);
    }
    Ok(len)
}

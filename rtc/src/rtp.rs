//! RTP fixed-header parsing and the in-place rewrites the forward path
//! needs: SSRC replacement and header-extension stripping.

#[cfg(test)]
mod rtp_test;

use bytes::{Buf, BytesMut};
use shared::bits::BitBuffer;
use shared::error::{Error, Result};

pub const FIXED_HEADER_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpHeader {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub csrc_count: u8,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    /// Words in the extension body, excluding its own 4-byte header.
    pub extension_words: u16,
}

impl RtpHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut buf = BitBuffer::new(data);
        if !buf.has_bytes(FIXED_HEADER_LEN) {
            return Err(Error::ErrHeaderSizeInsufficient);
        }

        let version = buf.read_bits(2)? as u8;
        let padding = buf.read_bits(1)? != 0;
        let extension = buf.read_bits(1)? != 0;
        let csrc_count = buf.read_bits(4)? as u8;
        let marker = buf.read_bits(1)? != 0;
        let payload_type = buf.read_bits(7)? as u8;
        let sequence_number = buf.read_uint(2)? as u16;
        let timestamp = buf.read_uint(4)? as u32;
        let ssrc = buf.read_uint(4)? as u32;

        for _ in 0..csrc_count {
            let _csrc = buf.read_uint(4)?;
        }

        let mut extension_words = 0u16;
        if extension {
            if !buf.has_bytes(4) {
                return Err(Error::ErrHeaderSizeInsufficientForExtension);
            }
            let _defined_by_profile = buf.read_uint(2)?;
            extension_words = buf.read_uint(2)? as u16;
            if !buf.has_bytes(extension_words as usize * 4) {
                return Err(Error::ErrHeaderSizeInsufficientForExtension);
            }
        }

        Ok(RtpHeader {
            version,
            padding,
            extension,
            csrc_count,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            extension_words,
        })
    }

    /// Length of the fixed header plus the CSRC list, extension excluded.
    pub fn base_len(&self) -> usize {
        FIXED_HEADER_LEN + self.csrc_count as usize * 4
    }

    /// Bytes occupied by the extension block, its header included.
    pub fn extension_len(&self) -> usize {
        if self.extension {
            4 + self.extension_words as usize * 4
        } else {
            0
        }
    }
}

/// Overwrite the SSRC field in place.
pub fn set_ssrc(packet: &mut [u8], ssrc: u32) {
    packet[8..12].copy_from_slice(&ssrc.to_be_bytes());
}

/// Strip the header extension by shifting the fixed header and CSRC list
/// forward over it, then clearing the extension bit. Older peers demux the
/// resulting packet where they choke on the extension.
pub fn strip_extension(packet: &mut BytesMut, header: &RtpHeader) -> Result<()> {
    if !header.extension {
        return Ok(());
    }
    let base_len = header.base_len();
    let ext_len = header.extension_len();
    if packet.len() < base_len + ext_len {
        return Err(Error::ErrHeaderSizeInsufficientForExtension);
    }

    packet.copy_within(0..base_len, ext_len);
    packet.advance(ext_len);
    packet[0] &= !0x10;
    Ok(())
}

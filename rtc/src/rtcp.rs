//! RTCP compound-packet iteration and the feedback messages the session
//! reacts to: receiver reports, NACK, and the picture-refresh family.

#[cfg(test)]
mod rtcp_test;

use bytes::BytesMut;
use shared::bits::{BitBuffer, BitStream};
use shared::error::Result;

// RTCP payload types.
pub const PT_SENDER_REPORT: u8 = 200;
pub const PT_RECEIVER_REPORT: u8 = 201;
pub const PT_SOURCE_DESCRIPTION: u8 = 202;
pub const PT_BYE: u8 = 203;
pub const PT_APP: u8 = 204;
pub const PT_RTP_FEEDBACK: u8 = 205;
pub const PT_PAYLOAD_SPECIFIC_FEEDBACK: u8 = 206;

// Feedback message types (the FMT field).
pub const FMT_NACK: u8 = 1;
pub const FMT_PLI: u8 = 1;
pub const FMT_SLI: u8 = 2;
pub const FMT_FIR: u8 = 4;

/// One report block of a receiver report, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverReport {
    pub ssrc: u32,
    pub fraction_lost: u8,
    pub cumulative_lost: u32,
    pub highest_sequence: u32,
    pub jitter: u32,
    pub last_sr: u32,
    pub delay_since_last_sr: u32,
}

/// One `(packet id, bitmask)` pair of a generic NACK.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct NackEntry {
    pub packet_id: u16,
    pub bitmask: u16,
}

/// Feedback extracted from one chunk of a compound RTCP packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feedback {
    ReceiverReport(ReceiverReport),
    Nack {
        sender_ssrc: u32,
        media_ssrc: u32,
        entries: Vec<NackEntry>,
    },
    PictureLoss {
        sender_ssrc: u32,
        media_ssrc: u32,
    },
    SliceLoss {
        first: u16,
        number: u16,
        picture_id: u8,
    },
    FullIntraRequest {
        sender_ssrc: u32,
        media_ssrc: u32,
    },
    Other {
        payload_type: u8,
        fmt: u8,
    },
}

/// Iterate the chunks of an unprotected compound RTCP packet. Per-chunk
/// length on the wire is `(length_field + 1) * 4`; a chunk that claims
/// more than the buffer holds ends the iteration.
pub fn parse_compound(data: &[u8]) -> Result<Vec<Feedback>> {
    let mut feedback = Vec::new();
    let mut buf = BitBuffer::new(data);

    while buf.has_bytes(4) {
        let _version = buf.read_bits(2)?;
        let _padding = buf.read_bits(1)?;
        let fmt = buf.read_bits(5)? as u8;
        let payload_type = buf.read_bits(8)? as u8;
        let length = buf.read_uint(2)? as usize * 4;

        if !buf.has_bytes(length) {
            break;
        }
        let chunk = buf.read_slice(length)?;
        let mut chunk_buf = BitBuffer::new(chunk);

        match payload_type {
            PT_RECEIVER_REPORT => {
                let _sender_ssrc = chunk_buf.read_uint(4)?;
                // first report block only; multi-block senders repeat it
                if chunk_buf.has_bytes(24) {
                    feedback.push(Feedback::ReceiverReport(ReceiverReport {
                        ssrc: chunk_buf.read_uint(4)? as u32,
                        fraction_lost: chunk_buf.read_uint(1)? as u8,
                        cumulative_lost: chunk_buf.read_uint(3)? as u32,
                        highest_sequence: chunk_buf.read_uint(4)? as u32,
                        jitter: chunk_buf.read_uint(4)? as u32,
                        last_sr: chunk_buf.read_uint(4)? as u32,
                        delay_since_last_sr: chunk_buf.read_uint(4)? as u32,
                    }));
                }
            }
            PT_RTP_FEEDBACK if fmt == FMT_NACK => {
                let sender_ssrc = chunk_buf.read_uint(4)? as u32;
                let media_ssrc = chunk_buf.read_uint(4)? as u32;
                let mut entries = Vec::new();
                while chunk_buf.has_bytes(4) {
                    entries.push(NackEntry {
                        packet_id: chunk_buf.read_uint(2)? as u16,
                        bitmask: chunk_buf.read_uint(2)? as u16,
                    });
                }
                feedback.push(Feedback::Nack {
                    sender_ssrc,
                    media_ssrc,
                    entries,
                });
            }
            PT_PAYLOAD_SPECIFIC_FEEDBACK => {
                let sender_ssrc = chunk_buf.read_uint(4)? as u32;
                let media_ssrc = chunk_buf.read_uint(4)? as u32;
                match fmt {
                    FMT_PLI => feedback.push(Feedback::PictureLoss {
                        sender_ssrc,
                        media_ssrc,
                    }),
                    FMT_SLI => {
                        if chunk_buf.bits_left() >= 32 {
                            feedback.push(Feedback::SliceLoss {
                                first: chunk_buf.read_bits(13)? as u16,
                                number: chunk_buf.read_bits(13)? as u16,
                                picture_id: chunk_buf.read_bits(6)? as u8,
                            });
                        }
                    }
                    FMT_FIR => feedback.push(Feedback::FullIntraRequest {
                        sender_ssrc,
                        media_ssrc,
                    }),
                    other => feedback.push(Feedback::Other {
                        payload_type,
                        fmt: other,
                    }),
                }
            }
            other => {
                feedback.push(Feedback::Other {
                    payload_type: other,
                    fmt,
                });
            }
        }
    }
    Ok(feedback)
}

/// Picture Loss Indication: `PT=206, FMT=1, length=2`, no FCI.
pub fn build_pli(sender_ssrc: u32, media_ssrc: u32) -> Result<BytesMut> {
    let mut bs = BitStream::new();
    bs.write_bits(2, 0x02)?;
    bs.write_bits(1, 0x00)?;
    bs.write_bits(5, FMT_PLI as u64)?;
    bs.write_uint(1, PT_PAYLOAD_SPECIFIC_FEEDBACK as u64)?;
    bs.write_uint(2, 2)?;
    bs.write_uint(4, sender_ssrc as u64)?;
    bs.write_uint(4, media_ssrc as u64)?;
    Ok(bs.into_bytes())
}

/// Generic NACK: one `(packet id, bitmask)` pair per FCI entry.
pub fn build_nack(sender_ssrc: u32, media_ssrc: u32, entries: &[NackEntry]) -> Result<BytesMut> {
    let mut bs = BitStream::new();
    bs.write_bits(2, 0x02)?;
    bs.write_bits(1, 0x00)?;
    bs.write_bits(5, FMT_NACK as u64)?;
    bs.write_uint(1, PT_RTP_FEEDBACK as u64)?;
    bs.write_uint(2, (2 + entries.len()) as u64)?;
    bs.write_uint(4, sender_ssrc as u64)?;
    bs.write_uint(4, media_ssrc as u64)?;
    for entry in entries {
        bs.write_uint(2, entry.packet_id as u64)?;
        bs.write_uint(2, entry.bitmask as u64)?;
    }
    Ok(bs.into_bytes())
}

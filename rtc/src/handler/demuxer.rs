//! Leading-byte demultiplexer for the four sub-protocols sharing one UDP
//! 5-tuple, as described in RFC 7983:
//!
//! ```text
//!              +----------------+
//!              |        [0..1] -+--> STUN
//!              |                |
//!  packet -->  |      [20..63] -+--> DTLS
//!              |                |
//!              |    [128..191] -+--> RTP/RTCP
//!              +----------------+
//! ```
//!
//! SRTP and SRTCP share the last range and are told apart by the payload
//! type in the second byte: 200..=206 is RTCP.

#[cfg(test)]
mod demuxer_test;

/// Which protocol branch a datagram belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Stun,
    Dtls,
    Srtp,
    Srtcp,
    Unknown,
}

/// The RFC 7983 table, encoded as data.
const DEMUX_RANGES: [(u8, u8, MessageKind); 3] = [
    (0, 1, MessageKind::Stun),
    (20, 63, MessageKind::Dtls),
    (128, 191, MessageKind::Srtp),
];

const RTCP_PT_MIN: u8 = 200;
const RTCP_PT_MAX: u8 = 206;

/// Classify one inbound datagram by its leading byte. Anything outside the
/// table is [MessageKind::Unknown] and gets logged and dropped by the
/// caller.
pub fn classify(buf: &[u8]) -> MessageKind {
    let Some(&first) = buf.first() else {
        return MessageKind::Unknown;
    };

    for (lower, upper, kind) in DEMUX_RANGES {
        if first < lower || first > upper {
            continue;
        }
        if kind == MessageKind::Srtp {
            if let Some(&pt) = buf.get(1) {
                if (RTCP_PT_MIN..=RTCP_PT_MAX).contains(&pt) {
                    return MessageKind::Srtcp;
                }
            }
        }
        return kind;
    }
    MessageKind::Unknown
}

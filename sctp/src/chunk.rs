//! SCTP chunk and DataChannel wire constants.
//!
//! Every SCTP packet starts with the common 12-byte header
//! `src_port(2) | dst_port(2) | verification_tag(4) | checksum(4)` followed
//! by chunks of `type(1) | flags(1) | length(2) | value`, padded to 4-byte
//! boundaries. The checksum is Castagnoli CRC32 over the whole packet with
//! the checksum field zeroed.

pub const COMMON_HEADER_LEN: usize = 12;
pub const CHUNK_HEADER_LEN: usize = 4;
pub const CHECKSUM_OFFSET: usize = 8;

// Chunk types (RFC 4960).
pub const CT_DATA: u8 = 0;
pub const CT_INIT: u8 = 1;
pub const CT_INIT_ACK: u8 = 2;
pub const CT_SACK: u8 = 3;
pub const CT_HEARTBEAT: u8 = 4;
pub const CT_HEARTBEAT_ACK: u8 = 5;
pub const CT_ABORT: u8 = 6;
pub const CT_SHUTDOWN: u8 = 7;
pub const CT_SHUTDOWN_ACK: u8 = 8;
pub const CT_ERROR: u8 = 9;
pub const CT_COOKIE_ECHO: u8 = 10;
pub const CT_COOKIE_ACK: u8 = 11;
pub const CT_ECNE: u8 = 12;
pub const CT_CWR: u8 = 13;
pub const CT_SHUTDOWN_COMPLETE: u8 = 14;

/// DATA chunk flags: complete user message (B + E bits) delivered in order.
pub const DATA_FLAGS_COMPLETE: u8 = 0x07;

// DataChannel payload protocol identifiers (RFC 8831).
pub const PPID_CONTROL: u32 = 50;
pub const PPID_STRING: u32 = 51;
pub const PPID_BINARY: u32 = 53;
pub const PPID_STRING_EMPTY: u32 = 56;
pub const PPID_BINARY_EMPTY: u32 = 57;

// DataChannel control message types (RFC 8832).
pub const DC_MSG_ACK: u8 = 2;
pub const DC_MSG_OPEN: u8 = 3;

// INIT-ACK state-cookie stub parameters.
pub const PARAM_STATE_COOKIE: u16 = 0x0007;
pub const STATE_COOKIE_VALUE: u32 = 0x0B00_B1E5;
pub const PARAM_COOKIE_PAD: u16 = 0xC000;

/// Bytes of zero padding that align `len` to a 4-byte boundary.
pub fn padding(len: usize) -> usize {
    (4 - len % 4) % 4
}

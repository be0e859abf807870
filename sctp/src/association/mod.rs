//! Minimal SCTP-over-DTLS association, just enough state machine for the
//! WebRTC DataChannel bring-up:
//!
//! ```text
//! Closed -- rx INIT --> CookieWait        tx INIT-ACK (state-cookie stub)
//! CookieWait -- rx COOKIE-ECHO --> Established   tx COOKIE-ACK
//! Established: DATA / SACK / HEARTBEAT exchanges
//! ```
//!
//! Outbound packets are queued and drained with [Association::poll_transmit];
//! the session shuttles them through the DTLS endpoint.


use crate::chunk::*;
use bytes::BytesMut;
use log::{debug, warn};
use shared::bits::{BitBuffer, BitStream};
use shared::crc::Crc32;
use shared::error::{Error, Result};
use std::collections::VecDeque;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum State {
    Closed,
    CookieWait,
    Established,
}

/// What the association surfaced to its owner while handling a packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The peer finished the DataChannel OPEN/ACK exchange.
    DataChannelOpen,
    /// A user message arrived on the channel.
    Message {
        stream_id: u16,
        ppid: u32,
        data: Vec<u8>,
    },
}

pub struct Association {
    state: State,
    /// Ports as seen on the last inbound packet; replies swap them.
    src_port: u16,
    dst_port: u16,
    /// Peer's initiate tag, echoed as the verification tag on everything
    /// we send.
    initiate_tag: u32,
    /// Verification tag the peer put on its last packet.
    verification_tag: u32,
    a_rwnd: u32,
    number_of_outbound_streams: u16,
    number_of_inbound_streams: u16,
    local_tsn: u32,
    remote_tsn: u32,
    stream_id_s: u16,
    stream_seq_num_n: u16,
    datachannel_open: bool,
    transmits: VecDeque<BytesMut>,
    events: VecDeque<Event>,
}

impl Default for Association {
    fn default() -> Self {
        Association::new()
    }
}

impl Association {
    pub fn new() -> Self {
        Association {
            state: State::Closed,
            src_port: 0,
            dst_port: 0,
            initiate_tag: 0,
            verification_tag: 0,
            a_rwnd: 0,
            number_of_outbound_streams: 0,
            number_of_inbound_streams: 0,
            local_tsn: 0,
            remote_tsn: 0,
            stream_id_s: 0,
            stream_seq_num_n: 0,
            datachannel_open: false,
            transmits: VecDeque::new(),
            events: VecDeque::new(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_established(&self) -> bool {
        self.state == State::Established
    }

    pub fn datachannel_open(&self) -> bool {
        self.datachannel_open
    }

    pub fn poll_transmit(&mut self) -> Option<BytesMut> {
        self.transmits.pop_front()
    }

    pub fn poll_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    /// Handle one decrypted SCTP packet (DTLS application data). Chunks are
    /// processed in order and never read past the packet boundary.
    pub fn handle_packet(&mut self, data: &[u8]) -> Result<()> {
        let mut buf = BitBuffer::new(data);
        if !buf.has_bytes(COMMON_HEADER_LEN + CHUNK_HEADER_LEN) {
            return Err(Error::ErrPacketRawTooSmall);
        }

        self.src_port = buf.read_uint(2)? as u16;
        self.dst_port = buf.read_uint(2)? as u16;
        self.verification_tag = buf.read_uint(4)? as u32;
        let _checksum = buf.read_uint(4)?;

        while buf.has_bytes(CHUNK_HEADER_LEN) {
            let chunk_type = buf.read_uint(1)? as u8;
            let chunk_flags = buf.read_uint(1)? as u8;
            let chunk_length = buf.read_uint(2)? as usize;
            if chunk_length < CHUNK_HEADER_LEN
                || chunk_length - CHUNK_HEADER_LEN > buf.bytes_left()
            {
                return Err(Error::ErrChunkHeaderInvalidLength);
            }
            let value = buf.read_slice(chunk_length - CHUNK_HEADER_LEN)?;
            self.handle_chunk(chunk_type, chunk_flags, value)?;

            let pad = padding(chunk_length).min(buf.bytes_left());
            buf.read_slice(pad)?;
        }
        Ok(())
    }

    fn handle_chunk(&mut self, chunk_type: u8, chunk_flags: u8, value: &[u8]) -> Result<()> {
        debug!(
            "sctp chunk type={} flags={:#04x} len={}",
            chunk_type,
            chunk_flags,
            value.len()
        );
        match chunk_type {
            CT_INIT => self.on_init(value),
            CT_COOKIE_ECHO => self.on_cookie_echo(),
            CT_DATA => self.on_data(value),
            CT_SACK => self.on_sack(value),
            CT_HEARTBEAT => self.on_heartbeat(value),
            other => {
                debug!("ignore sctp chunk type {}", other);
                Ok(())
            }
        }
    }

    fn on_init(&mut self, value: &[u8]) -> Result<()> {
        if self.state != State::Closed {
            warn!("INIT in state {:?}, ignored", self.state);
            return Ok(());
        }

        let mut buf = BitBuffer::new(value);
        self.initiate_tag = buf.read_uint(4)? as u32;
        self.a_rwnd = buf.read_uint(4)? as u32;
        self.number_of_outbound_streams = buf.read_uint(2)? as u16;
        self.number_of_inbound_streams = buf.read_uint(2)? as u16;
        self.remote_tsn = buf.read_uint(4)? as u32;

        // optional parameters, read and ignored
        while buf.has_bytes(4) {
            let parameter_type = buf.read_uint(2)? as u16;
            let parameter_length = buf.read_uint(2)? as usize;
            if parameter_length < 4 {
                return Err(Error::ErrChunkHeaderInvalidLength);
            }
            let body_len = (parameter_length - 4).min(buf.bytes_left());
            buf.read_slice(body_len)?;
            let pad = padding(parameter_length).min(buf.bytes_left());
            buf.read_slice(pad)?;
            debug!(
                "init parameter type={:#06x} length={}",
                parameter_type, parameter_length
            );
        }

        let mut chunk = BitStream::new();
        chunk.write_uint(4, self.initiate_tag as u64)?;
        chunk.write_uint(4, self.a_rwnd as u64)?;
        // stream counts deliberately mirrored back
        chunk.write_uint(2, self.number_of_inbound_streams as u64)?;
        chunk.write_uint(2, self.number_of_outbound_streams as u64)?;
        chunk.write_uint(4, self.next_tsn() as u64)?;
        // state cookie stub
        chunk.write_uint(2, PARAM_STATE_COOKIE as u64)?;
        chunk.write_uint(2, 8)?;
        chunk.write_uint(4, STATE_COOKIE_VALUE as u64)?;
        chunk.write_uint(2, PARAM_COOKIE_PAD as u64)?;
        chunk.write_uint(2, 4)?;

        self.queue_packet(CT_INIT_ACK, 0x00, chunk.as_slice())?;
        self.state = State::CookieWait;
        Ok(())
    }

    fn on_cookie_echo(&mut self) -> Result<()> {
        if self.state == State::Closed {
            warn!("COOKIE-ECHO before INIT, ignored");
            return Ok(());
        }
        self.queue_packet(CT_COOKIE_ACK, 0x00, &[])?;
        self.state = State::Established;
        Ok(())
    }

    fn on_data(&mut self, value: &[u8]) -> Result<()> {
        if self.state != State::Established {
            warn!("DATA before association established, dropped");
            return Ok(());
        }

        let mut buf = BitBuffer::new(value);
        self.remote_tsn = buf.read_uint(4)? as u32;
        self.stream_id_s = buf.read_uint(2)? as u16;
        let _stream_seq_num = buf.read_uint(2)? as u16;
        let ppid = buf.read_uint(4)? as u32;
        let user_data = buf.read_remaining()?;

        match ppid {
            PPID_CONTROL => {
                let mut control = BitBuffer::new(user_data);
                let message_type = control.read_uint(1)? as u8;
                if message_type == DC_MSG_OPEN {
                    self.send_datachannel_ack()?;
                    self.datachannel_open = true;
                    self.send_sack()?;
                    self.events.push_back(Event::DataChannelOpen);
                }
            }
            PPID_STRING | PPID_BINARY | PPID_STRING_EMPTY | PPID_BINARY_EMPTY => {
                self.events.push_back(Event::Message {
                    stream_id: self.stream_id_s,
                    ppid,
                    data: user_data.to_vec(),
                });
            }
            other => {
                debug!("ignore datachannel ppid {}", other);
            }
        }
        Ok(())
    }

    fn on_sack(&mut self, value: &[u8]) -> Result<()> {
        let mut buf = BitBuffer::new(value);
        let cumulative_tsn_ack = buf.read_uint(4)? as u32;
        let a_rwnd = buf.read_uint(4)? as u32;
        let number_of_gap_ack_blocks = buf.read_uint(2)? as u16;
        let number_of_duplicate_tsn = buf.read_uint(2)? as u16;
        for _ in 0..number_of_gap_ack_blocks {
            let _start = buf.read_uint(2)?;
            let _end = buf.read_uint(2)?;
        }
        for _ in 0..number_of_duplicate_tsn {
            let _duplicate = buf.read_uint(4)?;
        }
        debug!(
            "sack cumulative_tsn_ack={} a_rwnd={} gaps={} dups={}",
            cumulative_tsn_ack, a_rwnd, number_of_gap_ack_blocks, number_of_duplicate_tsn
        );

        let mut chunk = BitStream::new();
        chunk.write_uint(4, self.local_tsn as u64)?;
        self.queue_packet(CT_CWR, 0x00, chunk.as_slice())
    }

    /// HEARTBEAT-ACK echoes the HB-INFO TLV byte-for-byte.
    fn on_heartbeat(&mut self, value: &[u8]) -> Result<()> {
        self.queue_packet(CT_HEARTBEAT_ACK, 0x00, value)
    }

    /// Queue a user message as a single complete DATA chunk.
    pub fn send_data(&mut self, ppid: u32, data: &[u8]) -> Result<()> {
        if self.state != State::Established {
            return Err(Error::ErrPayloadDataStateNotExist);
        }
        if !self.datachannel_open {
            return Err(Error::ErrDataChannelClosed);
        }
        self.queue_data_chunk(self.stream_id_s, self.stream_seq_num_n, ppid, data)
    }

    fn send_datachannel_ack(&mut self) -> Result<()> {
        let stream_id = self.stream_id_s;
        self.queue_data_chunk(stream_id, 0, PPID_CONTROL, &[DC_MSG_ACK])
    }

    fn send_sack(&mut self) -> Result<()> {
        let mut chunk = BitStream::new();
        chunk.write_uint(4, self.remote_tsn as u64)?;
        chunk.write_uint(4, self.a_rwnd as u64)?;
        chunk.write_uint(2, 0)?;
        chunk.write_uint(2, 0)?;
        self.queue_packet(CT_SACK, 0x00, chunk.as_slice())
    }

    fn queue_data_chunk(
        &mut self,
        stream_id: u16,
        stream_seq: u16,
        ppid: u32,
        data: &[u8],
    ) -> Result<()> {
        let mut chunk = BitStream::new();
        chunk.write_uint(4, self.next_tsn() as u64)?;
        chunk.write_uint(2, stream_id as u64)?;
        chunk.write_uint(2, stream_seq as u64)?;
        chunk.write_uint(4, ppid as u64)?;
        chunk.write_all(data)?;
        self.queue_packet(CT_DATA, DATA_FLAGS_COMPLETE, chunk.as_slice())
    }

    /// Serialize one chunk into a full SCTP packet: ports swapped back
    /// toward the peer, our initiate tag as verification tag, payload
    /// padded to a 4-byte boundary (padding is not counted in the chunk
    /// length) and the Castagnoli checksum patched in last.
    fn queue_packet(&mut self, chunk_type: u8, chunk_flags: u8, value: &[u8]) -> Result<()> {
        let mut bs = BitStream::new();
        bs.write_uint(2, self.dst_port as u64)?;
        bs.write_uint(2, self.src_port as u64)?;
        bs.write_uint(4, self.initiate_tag as u64)?;
        bs.write_uint(4, 0)?;
        bs.write_uint(1, chunk_type as u64)?;
        bs.write_uint(1, chunk_flags as u64)?;
        bs.write_uint(2, (value.len() + CHUNK_HEADER_LEN) as u64)?;
        bs.write_all(value)?;
        for _ in 0..padding(value.len()) {
            bs.write_uint(1, 0)?;
        }

        let crc = Crc32::sctp().checksum(bs.as_slice());
        bs.replace_uint(CHECKSUM_OFFSET, 4, crc as u64)?;

        self.transmits.push_back(bs.into_bytes());
        Ok(())
    }

    /// Allocate the next outbound TSN.
    fn next_tsn(&mut self) -> u32 {
        let tsn = self.local_tsn;
        self.local_tsn = self.local_tsn.wrapping_add(1);
        tsn
    }
}

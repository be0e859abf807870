//! The WebRTC session: one state-bearing object per peer connection,
//! owning the ICE-lite agent, the DTLS endpoint, the SCTP association and
//! the SRTP contexts, fed one datagram at a time by the runtime.
//!
//! The surface is sans-IO: `handle_read` consumes an inbound datagram,
//! `handle_timeout` services the periodic work, and the runtime drains
//! `poll_transmit` onto the UDP socket.

pub(crate) mod cache;

use crate::constants::*;
use crate::handler::demuxer::{classify, MessageKind};
use crate::media::{MediaCodec, MediaKind, MediaPublisher, MediaSubscriber, Payload};
use crate::registry::StreamRegistry;
use crate::rtcp::{self, Feedback, NackEntry, ReceiverReport};
use crate::rtp::{self, RtpHeader};
use crate::session::cache::RetransmitCache;
use crate::transport::dtls::{DtlsContext, DtlsEndpoint, DtlsRole};
use bytes::{Bytes, BytesMut};
use log::{debug, error, info, warn};
use sctp::chunk::PPID_STRING;
use sctp::{Association, Event};
use shared::error::{Error, Result};
use shared::{TaggedBytesMut, TransportContext};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::time::Instant;
use stun::agent::{Agent, Credentials};
use stun::message::Message;

/// `(app, stream)` identity a session publishes or subscribes under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub app: String,
    pub stream: String,
}

impl Default for SessionInfo {
    fn default() -> Self {
        SessionInfo {
            app: DEFAULT_APP.to_owned(),
            stream: DEFAULT_STREAM.to_owned(),
        }
    }
}

/// Whether the session feeds media in, takes media out, or both.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum SessionRole {
    Publisher,
    Subscriber,
    #[default]
    Both,
}

pub struct SessionConfig {
    pub transport: TransportContext,
    pub credentials: Credentials,
    pub session_info: SessionInfo,
    pub role: SessionRole,
    pub dtls_role: DtlsRole,
}

pub struct WebRtcSession {
    transport: TransportContext,
    session_info: SessionInfo,
    role: SessionRole,

    ice: Agent,
    dtls: DtlsEndpoint,
    sctp: Association,
    srtp_send: Option<srtp::Context>,
    srtp_recv: Option<srtp::Context>,

    weak_self: Weak<RefCell<WebRtcSession>>,
    publisher: Option<Weak<RefCell<dyn MediaPublisher>>>,
    subscribers: Vec<Weak<RefCell<dyn MediaSubscriber>>>,
    registered_publisher: bool,
    subscribed: bool,

    publisher_video_ssrc: u32,
    publisher_audio_ssrc: u32,
    /// Extended sequence of the last video packet sent to this peer.
    video_seq: u32,
    send_cache: RetransmitCache,
    last_receiver_report: Option<ReceiverReport>,

    created: Instant,
    /// Last observed time, the clock for everything queued from trait
    /// callbacks that carry no timestamp of their own.
    now: Instant,
    last_recv: Instant,
    closeable: bool,
    tick_count: u64,

    transmits: VecDeque<TaggedBytesMut>,
}

impl WebRtcSession {
    pub fn new(config: SessionConfig, dtls_context: &DtlsContext, now: Instant) -> Result<Self> {
        let dtls = dtls_context.new_endpoint(config.dtls_role)?;
        Ok(WebRtcSession {
            transport: config.transport,
            session_info: config.session_info,
            role: config.role,
            ice: Agent::new(config.credentials),
            dtls,
            sctp: Association::new(),
            srtp_send: None,
            srtp_recv: None,
            weak_self: Weak::new(),
            publisher: None,
            subscribers: Vec::new(),
            registered_publisher: false,
            subscribed: false,
            publisher_video_ssrc: 0,
            publisher_audio_ssrc: 0,
            video_seq: 0,
            send_cache: RetransmitCache::new(RETRANSMIT_CACHE_CAPACITY),
            last_receiver_report: None,
            created: now,
            now,
            last_recv: now,
            closeable: false,
            tick_count: 0,
            transmits: VecDeque::new(),
        })
    }

    /// Wrap a new session for the runtime's session set; the session keeps
    /// a weak handle to itself for registry registration.
    pub fn into_shared(
        config: SessionConfig,
        dtls_context: &DtlsContext,
        now: Instant,
    ) -> Result<Rc<RefCell<WebRtcSession>>> {
        let session = Rc::new(RefCell::new(WebRtcSession::new(config, dtls_context, now)?));
        session.borrow_mut().weak_self = Rc::downgrade(&session);
        // a connecting endpoint queued its first flight at construction
        session.borrow_mut().flush_dtls();
        Ok(session)
    }

    pub fn transport(&self) -> &TransportContext {
        &self.transport
    }

    pub fn session_info(&self) -> &SessionInfo {
        &self.session_info
    }

    pub fn handshake_done(&self) -> bool {
        self.dtls.handshake_done() && self.srtp_send.is_some()
    }

    pub fn datachannel_open(&self) -> bool {
        self.sctp.datachannel_open()
    }

    pub fn is_closeable(&self) -> bool {
        self.closeable
    }

    pub fn last_receiver_report(&self) -> Option<&ReceiverReport> {
        self.last_receiver_report.as_ref()
    }

    pub fn set_publisher(&mut self, publisher: Weak<RefCell<dyn MediaPublisher>>) {
        self.publisher = Some(publisher);
    }

    pub fn poll_transmit(&mut self) -> Option<TaggedBytesMut> {
        self.transmits.pop_front()
    }

    pub fn poll_timeout(&self) -> Option<Instant> {
        Some(self.now + TICK_INTERVAL)
    }

    /// Demultiplex and dispatch one inbound datagram. Failures are local:
    /// the caller logs them and drops the datagram, nothing more.
    pub fn handle_read(&mut self, msg: TaggedBytesMut, registry: &mut StreamRegistry) -> Result<()> {
        self.now = msg.now;
        self.last_recv = msg.now;

        match classify(&msg.message) {
            MessageKind::Stun => self.on_stun(msg),
            MessageKind::Dtls => self.on_dtls(msg, registry),
            MessageKind::Srtp => self.on_rtp(msg, registry),
            MessageKind::Srtcp => self.on_rtcp(msg),
            MessageKind::Unknown => {
                warn!(
                    "drop unknown datagram from {}, leading byte {:?}",
                    msg.transport.peer_addr,
                    msg.message.first()
                );
                Ok(())
            }
        }
    }

    /// Periodic work on the runtime's 20 ms cadence: the ~1 s DataChannel
    /// keep-alive, the ~1 s PLI toward the publisher, and the 10 s receive
    /// timeout.
    pub fn handle_timeout(&mut self, now: Instant) -> Result<()> {
        self.now = now;
        self.tick_count += 1;

        if self.tick_count % TICKS_PER_KEYFRAME_REQUEST == 0 {
            if self.sctp.datachannel_open() {
                let elapsed = now.duration_since(self.created).as_millis();
                let keepalive = format!("rtcrelay alive {elapsed}ms");
                if let Err(e) = self.sctp.send_data(PPID_STRING, keepalive.as_bytes()) {
                    debug!("datachannel keepalive skipped: {}", e);
                }
                self.shuttle_sctp()?;
            }
            if self.handshake_done() && self.publisher_video_ssrc != 0 {
                self.send_keyframe_request();
            }
        }

        if now.duration_since(self.last_recv) >= RECV_TIMEOUT {
            info!(
                "session {} timed out after {:?} of silence",
                self.transport.peer_addr, RECV_TIMEOUT
            );
            self.closeable = true;
        }
        Ok(())
    }

    fn on_stun(&mut self, msg: TaggedBytesMut) -> Result<()> {
        let message = Message::unmarshal(&msg.message)?;
        if let Some(reply) = self
            .ice
            .handle_message(&message, msg.transport.peer_addr)?
        {
            self.queue_transmit(reply);
        }
        Ok(())
    }

    fn on_dtls(&mut self, msg: TaggedBytesMut, registry: &mut StreamRegistry) -> Result<()> {
        self.dtls.feed(&msg.message);

        if !self.dtls.handshake_done() {
            if let Err(e) = self.dtls.drive_handshake() {
                error!("dtls handshake failed for {}: {}", self.transport.peer_addr, e);
                self.closeable = true;
                self.flush_dtls();
                return Err(e);
            }
            if self.dtls.handshake_done() {
                if let Some(keys) = self.dtls.take_exported_keys() {
                    self.srtp_send = Some(srtp::Context::new(keys.send));
                    self.srtp_recv = Some(srtp::Context::new(keys.recv));
                }
                info!("dtls-srtp ready for {}", self.transport.peer_addr);
                if self.role != SessionRole::Publisher {
                    self.subscribe_stream(registry);
                }
            }
        }

        if self.dtls.handshake_done() {
            loop {
                match self.dtls.read_application_data() {
                    Ok(Some(sctp_packet)) => self.sctp.handle_packet(&sctp_packet)?,
                    Ok(None) => break,
                    Err(Error::ErrDtlsClosed) => {
                        self.closeable = true;
                        break;
                    }
                    Err(e) => return Err(e),
                }
            }
            self.service_sctp_events();
            self.shuttle_sctp()?;
        }

        self.flush_dtls();
        Ok(())
    }

    /// Unprotected RTP from the peer: this session is the publisher side.
    fn on_rtp(&mut self, msg: TaggedBytesMut, registry: &mut StreamRegistry) -> Result<()> {
        if !self.handshake_done() {
            debug!("drop rtp before handshake from {}", msg.transport.peer_addr);
            return Ok(());
        }
        let mut packet = msg.message;
        let Some(srtp_recv) = self.srtp_recv.as_mut() else {
            return Ok(());
        };
        if let Err(e) = srtp_recv.unprotect_rtp(&mut packet) {
            warn!("srtp_unprotect failed: {}", e);
            return Ok(());
        }

        let header = RtpHeader::parse(&packet)?;
        if header.sequence_number % 1000 == 0 {
            debug!(
                "rtp pt={} seq={} ts={} ssrc={:#x} ext={}",
                header.payload_type,
                header.sequence_number,
                header.timestamp,
                header.ssrc,
                header.extension
            );
        }

        if !self.registered_publisher && self.role != SessionRole::Subscriber {
            self.registered_publisher = true;
            let publisher: Weak<RefCell<dyn MediaPublisher>> = self.weak_self.clone();
            registry.register_stream(&self.session_info.app, &self.session_info.stream, publisher);
        }

        match header.payload_type {
            PT_VP8 | PT_VP9 | PT_H264 => {
                self.publisher_video_ssrc = header.ssrc;
                rtp::set_ssrc(&mut packet, VIDEO_SSRC);
                // MID extension confuses older peers at demux time
                rtp::strip_extension(&mut packet, &header)?;
                self.fan_out(&packet, &header, MediaKind::Video);
            }
            PT_OPUS => {
                self.publisher_audio_ssrc = header.ssrc;
                rtp::set_ssrc(&mut packet, AUDIO_SSRC);
                rtp::strip_extension(&mut packet, &header)?;
                self.fan_out(&packet, &header, MediaKind::Audio);
            }
            other => {
                debug!("drop rtp with unmapped payload type {}", other);
            }
        }
        Ok(())
    }

    fn on_rtcp(&mut self, msg: TaggedBytesMut) -> Result<()> {
        if !self.handshake_done() {
            debug!("drop rtcp before handshake from {}", msg.transport.peer_addr);
            return Ok(());
        }
        let mut packet = msg.message;
        let Some(srtp_recv) = self.srtp_recv.as_mut() else {
            return Ok(());
        };
        if let Err(e) = srtp_recv.unprotect_rtcp(&mut packet) {
            warn!("srtp_unprotect_rtcp failed: {}", e);
            return Ok(());
        }

        for feedback in rtcp::parse_compound(&packet)? {
            match feedback {
                Feedback::ReceiverReport(report) => {
                    debug!(
                        "receiver report ssrc={:#x} lost={} jitter={}",
                        report.ssrc, report.cumulative_lost, report.jitter
                    );
                    self.last_receiver_report = Some(report);
                }
                Feedback::Nack { entries, .. } => self.handle_nack(&entries),
                Feedback::PictureLoss { .. } | Feedback::FullIntraRequest { .. } => {
                    self.forward_keyframe_request();
                }
                Feedback::SliceLoss {
                    first,
                    number,
                    picture_id,
                } => {
                    debug!(
                        "slice loss first={} number={} picture_id={}",
                        first, number, picture_id
                    );
                }
                Feedback::Other { payload_type, fmt } => {
                    debug!("ignore rtcp pt={} fmt={}", payload_type, fmt);
                }
            }
        }
        Ok(())
    }

    /// Resend cached protected packets named by a generic NACK. The 16-bit
    /// packet id is extended with the cycle of the last sent video
    /// sequence; an empty bitmask asks for the base and the 16 sequences
    /// after it.
    fn handle_nack(&mut self, entries: &[NackEntry]) {
        for entry in entries {
            let base = self.video_seq - (self.video_seq % 65_536) + entry.packet_id as u32;
            debug!(
                "nack packet_id={} bitmask={:#06x} video_seq={} base={}",
                entry.packet_id, entry.bitmask, self.video_seq, base
            );
            if entry.bitmask != 0 {
                for bit in 0..16u32 {
                    if entry.bitmask & (1 << bit) != 0 {
                        self.retransmit(base + bit + 1);
                    }
                }
            } else {
                self.retransmit(base);
                for offset in 1..=16u32 {
                    self.retransmit(base + offset);
                }
            }
        }
    }

    fn retransmit(&mut self, extended_seq: u32) {
        let cached = self.send_cache.get(VIDEO_SSRC, extended_seq).cloned();
        match cached {
            Some(packet) => {
                debug!("nack resend seq {}", extended_seq);
                self.queue_transmit(packet);
            }
            None => {
                debug!("nack can't find seq {}", extended_seq);
            }
        }
    }

    /// PLI or FIR from a subscribing peer is forwarded to the upstream
    /// publisher so the source emits a keyframe.
    fn forward_keyframe_request(&mut self) {
        let Some(publisher) = self.publisher.as_ref().and_then(Weak::upgrade) else {
            debug!("picture loss feedback with no upstream publisher");
            return;
        };
        match publisher.try_borrow_mut() {
            Ok(mut publisher) => publisher.request_keyframe(),
            Err(_) => debug!("skip keyframe forward, publisher busy"),
        };
    }

    /// SRTCP-protected PLI toward this session's peer.
    fn send_keyframe_request(&mut self) {
        let Some(srtp_send) = self.srtp_send.as_mut() else {
            return;
        };
        let pli = match rtcp::build_pli(VIDEO_SSRC, self.publisher_video_ssrc) {
            Ok(pli) => pli,
            Err(e) => {
                warn!("pli build failed: {}", e);
                return;
            }
        };
        let mut protected = pli;
        match srtp_send.protect_rtcp(&mut protected) {
            Ok(()) => self.queue_transmit(protected),
            Err(e) => warn!("protect_rtcp failed: {}", e),
        }
    }

    /// Look up the publisher for this session's stream and attach; falls
    /// back to any live publisher for development setups without signaling.
    fn subscribe_stream(&mut self, registry: &mut StreamRegistry) {
        if self.subscribed {
            return;
        }
        let subscriber: Weak<RefCell<dyn MediaSubscriber>> = self.weak_self.clone();

        if let Some(publisher) = registry
            .media_publisher_by_app_stream(&self.session_info.app, &self.session_info.stream)
        {
            registry.add_subscriber(&publisher, subscriber);
            self.publisher = Some(Rc::downgrade(&publisher));
            self.subscribed = true;
            info!(
                "subscribed {} to stream {}/{}",
                self.transport.peer_addr, self.session_info.app, self.session_info.stream
            );
        } else if let Some((app, stream, publisher)) = registry.debug_random_media_publisher() {
            registry.add_subscriber(&publisher, subscriber);
            self.publisher = Some(Rc::downgrade(&publisher));
            self.subscribed = true;
            info!(
                "stream {}/{} not found, subscribed {} to random publisher {}/{}",
                self.session_info.app,
                self.session_info.stream,
                self.transport.peer_addr,
                app,
                stream
            );
        } else {
            debug!(
                "no publisher for {}/{} yet",
                self.session_info.app, self.session_info.stream
            );
        }
    }

    /// Hand a rewritten packet to every live subscriber: raw RTP for
    /// WebRTC peers, an opaque frame for container-level consumers.
    fn fan_out(&mut self, packet: &[u8], header: &RtpHeader, kind: MediaKind) {
        self.subscribers.retain(|weak| weak.upgrade().is_some());
        if self.subscribers.is_empty() {
            return;
        }

        let payload = build_payload(packet, header, kind);
        for weak in &self.subscribers {
            let Some(subscriber) = weak.upgrade() else {
                continue;
            };
            // a session never fans out to itself
            let Ok(mut subscriber) = subscriber.try_borrow_mut() else {
                continue;
            };
            if subscriber.is_webrtc() {
                subscriber.send_data(packet);
            } else {
                subscriber.on_frame(&payload);
            }
        }
    }

    fn service_sctp_events(&mut self) {
        while let Some(event) = self.sctp.poll_event() {
            match event {
                Event::DataChannelOpen => {
                    info!("datachannel open for {}", self.transport.peer_addr);
                }
                Event::Message { ppid, data, .. } if ppid == PPID_STRING => {
                    debug!(
                        "datachannel string message, {} bytes; echoing uptime",
                        data.len()
                    );
                    let elapsed = self.now.duration_since(self.created).as_millis();
                    let echo = format!("rtcrelay {elapsed}ms");
                    if let Err(e) = self.sctp.send_data(PPID_STRING, echo.as_bytes()) {
                        debug!("datachannel echo skipped: {}", e);
                    }
                }
                Event::Message { ppid, data, .. } => {
                    debug!("datachannel message ppid={} {} bytes", ppid, data.len());
                }
            }
        }
    }

    /// Move queued SCTP packets through the DTLS endpoint onto the wire.
    fn shuttle_sctp(&mut self) -> Result<()> {
        while let Some(sctp_packet) = self.sctp.poll_transmit() {
            self.dtls.write_application_data(&sctp_packet)?;
        }
        self.flush_dtls();
        Ok(())
    }

    fn flush_dtls(&mut self) {
        while let Some(datagram) = self.dtls.poll_transmit() {
            self.queue_transmit(datagram);
        }
    }

    fn queue_transmit(&mut self, message: BytesMut) {
        self.transmits.push_back(TaggedBytesMut {
            now: self.now,
            transport: self.transport,
            message,
        });
    }
}

impl MediaSubscriber for WebRtcSession {
    /// Ready-to-send RTP from the publisher: protect, cache for NACK, and
    /// queue toward this session's peer.
    fn send_data(&mut self, data: &[u8]) {
        if !self.handshake_done() {
            debug!("subscriber {} not ready, drop", self.transport.peer_addr);
            return;
        }
        if data.len() < rtp::FIXED_HEADER_LEN {
            return;
        }
        let seq = u16::from_be_bytes([data[2], data[3]]);
        let ssrc = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);

        let mut protected = BytesMut::from(data);
        let Some(srtp_send) = self.srtp_send.as_mut() else {
            return;
        };
        match srtp_send.protect_rtp(&mut protected) {
            Ok(()) => {
                let extended = self.send_cache.insert(ssrc, seq, protected.clone());
                if ssrc == VIDEO_SSRC {
                    self.video_seq = extended;
                }
                self.queue_transmit(protected);
            }
            Err(e) => warn!("srtp_protect failed: {}", e),
        }
    }

    /// Container frames would need packetizing before they can reach a
    /// WebRTC peer; the RTMP-to-WebRTC direction stops here.
    fn on_frame(&mut self, payload: &Payload) {
        if !self.handshake_done() {
            debug!("dtls handshake not done, drop frame");
            return;
        }
        debug!(
            "unpacketized {:?} frame of {} bytes ignored",
            payload.kind,
            payload.data.len()
        );
    }

    fn on_header(&mut self, payload: &Payload) {
        debug!("ignore {:?} sequence header", payload.kind);
    }

    fn is_webrtc(&self) -> bool {
        true
    }
}

impl MediaPublisher for WebRtcSession {
    fn add_subscriber(&mut self, subscriber: Weak<RefCell<dyn MediaSubscriber>>) {
        let duplicate = self.subscribers.iter().any(|existing| {
            match (existing.upgrade(), subscriber.upgrade()) {
                (Some(a), Some(b)) => Rc::ptr_eq(&a, &b),
                _ => false,
            }
        });
        if !duplicate {
            self.subscribers.push(subscriber);
        }
    }

    fn request_keyframe(&mut self) {
        if self.handshake_done() && self.publisher_video_ssrc != 0 {
            self.send_keyframe_request();
        }
    }
}

fn build_payload(packet: &[u8], header: &RtpHeader, kind: MediaKind) -> Payload {
    let codec = match header.payload_type {
        PT_VP8 => MediaCodec::Vp8,
        PT_VP9 => MediaCodec::Vp9,
        PT_OPUS => MediaCodec::Opus,
        _ => MediaCodec::H264,
    };
    let media_offset = header.base_len().min(packet.len());
    let media = &packet[media_offset..];

    let pts_ms = match kind {
        MediaKind::Video => header.timestamp as u64 / 90,
        MediaKind::Audio => header.timestamp as u64 / 48,
    };
    let is_key = codec == MediaCodec::H264
        && media.first().is_some_and(|nal| {
            let nal_type = nal & 0x1F;
            nal_type == 5 || nal_type == 7 || nal_type == 8
        });

    Payload {
        data: Bytes::copy_from_slice(media),
        kind,
        codec,
        pts_ms,
        dts_ms: pts_ms,
        is_key,
    }
}

//! Media frame model and the trait seams the fan-out crosses. The RTMP
//! ingest and HLS/DASH egress sides live behind these traits; inside this
//! crate the WebRTC session implements both.

use bytes::Bytes;
use std::cell::RefCell;
use std::rc::Weak;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

/// Codec discriminator carried alongside an opaque frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MediaCodec {
    Vp8,
    Vp9,
    H264,
    Opus,
}

/// An opaque media frame: producers fill it on unprotect, the registry
/// fans it out read-only.
#[derive(Debug, Clone)]
pub struct Payload {
    pub data: Bytes,
    pub kind: MediaKind,
    pub codec: MediaCodec,
    pub pts_ms: u64,
    pub dts_ms: u64,
    pub is_key: bool,
}

/// Receives media from a publisher. `send_data` carries ready-to-send RTP
/// for WebRTC subscribers; `on_frame`/`on_header` carry opaque frames for
/// container-level subscribers (HLS, DASH).
pub trait MediaSubscriber {
    fn send_data(&mut self, data: &[u8]);
    fn on_frame(&mut self, payload: &Payload);
    fn on_header(&mut self, payload: &Payload);
    fn is_webrtc(&self) -> bool;
}

/// A live media source that fans frames out to subscribers.
pub trait MediaPublisher {
    /// Idempotent: subscribing the same session twice keeps one entry.
    fn add_subscriber(&mut self, subscriber: Weak<RefCell<dyn MediaSubscriber>>);
    /// Ask the source to produce a keyframe (PLI/FIR forwarded upstream).
    fn request_keyframe(&mut self);
}

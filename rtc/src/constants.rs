use std::time::Duration;

/// All subscribers see video under this SSRC regardless of the publisher.
pub const VIDEO_SSRC: u32 = 3_233_846_889;
/// All subscribers see audio under this SSRC regardless of the publisher.
pub const AUDIO_SSRC: u32 = 3_233_846_890;

// RTP payload types negotiated by the signaling layer.
pub const PT_VP8: u8 = 96;
pub const PT_VP9: u8 = 98;
pub const PT_H264: u8 = 102;
pub const PT_OPUS: u8 = 111;

/// A session with no inbound datagram for this long is closeable.
pub const RECV_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Housekeeping tick cadence driven by the runtime.
pub const TICK_INTERVAL: Duration = Duration::from_millis(20);

/// Ticks between periodic keyframe requests toward the publisher (~1 s).
pub const TICKS_PER_KEYFRAME_REQUEST: u64 = 50;

/// Per-SSRC retransmit ring size, at least one RTT's worth of packets.
pub const RETRANSMIT_CACHE_CAPACITY: usize = 1024;

/// Stream identity used when the signaling layer supplied none.
pub const DEFAULT_APP: &str = "webrtc";
pub const DEFAULT_STREAM: &str = "test";

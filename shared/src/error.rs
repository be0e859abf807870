#![allow(dead_code)]

use std::io;
use std::string::FromUtf8Error;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    //Bit codec errors
    #[error("buffer: short")]
    ErrBufferShort,
    #[error("buffer: write out of bounds")]
    ErrBufferOutOfBounds,
    #[error("unsupported field width")]
    ErrFieldWidth,
    #[error("read/write is not byte aligned")]
    ErrNotByteAligned,

    //STUN errors
    #[error("unexpected EOF: not enough bytes to read header")]
    ErrUnexpectedHeaderEof,
    #[error("attribute size is invalid")]
    ErrAttributeSizeInvalid,
    #[error("attribute not found")]
    ErrAttributeNotFound,
    #[error("username is not of the form ufrag:ufrag")]
    ErrUsernameFormat,
    #[error("integrity check failed")]
    ErrIntegrityMismatch,
    #[error("fingerprint check failed")]
    ErrFingerprintMismatch,
    #[error("invalid length of IP value")]
    ErrBadIpLength,
    #[error("unsupported address family")]
    ErrUnsupportedFamily,

    //SCTP errors
    #[error("raw is smaller than the minimum length for a SCTP packet")]
    ErrPacketRawTooSmall,
    #[error("raw is too small for a SCTP chunk")]
    ErrChunkHeaderTooSmall,
    #[error("chunk has invalid length")]
    ErrChunkHeaderInvalidLength,
    #[error("checksum mismatch theirs")]
    ErrChecksumMismatch,
    #[error("unhandled chunk type")]
    ErrChunkTypeUnhandled,
    #[error("sending payload data in non-Established state")]
    ErrPayloadDataStateNotExist,
    #[error("data channel is not open")]
    ErrDataChannelClosed,

    //SRTP errors
    #[error("SRTP master key is not long enough")]
    ErrShortSrtpMasterKey,
    #[error("SRTP master salt is not long enough")]
    ErrShortSrtpMasterSalt,
    #[error("packet is too short to be RTP packet")]
    ErrTooShortRtp,
    #[error("packet is too short to be RTCP packet")]
    ErrTooShortRtcp,
    #[error("failed to verify auth tag")]
    ErrFailedToVerifyAuthTag,
    #[error("duplicated packet")]
    ErrDuplicated,
    #[error("srtcp index is missing")]
    ErrSrtcpIndexMissing,

    //RTP/RTCP errors
    #[error("RTP header size insufficient")]
    ErrHeaderSizeInsufficient,
    #[error("RTP header size insufficient for extension")]
    ErrHeaderSizeInsufficientForExtension,
    #[error("packet is not large enough")]
    ErrShortPacket,
    #[error("Invalid packet version")]
    BadVersion,
    #[error("Wrong packet type")]
    WrongType,

    //DTLS errors
    #[error("dtls handshake failed: {0}")]
    ErrDtlsHandshake(String),
    #[error("dtls endpoint is closed")]
    ErrDtlsClosed,
    #[error("srtp keying material is not exported yet")]
    ErrKeyingMaterialNotReady,

    #[error("parse utf8: {0}")]
    Utf8(String),
    #[error("io: {0}")]
    Io(String),
    #[error("{0}")]
    Other(String),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<FromUtf8Error> for Error {
    fn from(e: FromUtf8Error) -> Self {
        Error::Utf8(e.to_string())
    }
}

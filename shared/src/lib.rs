#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod bits;
pub mod crc;
pub mod error;
pub(crate) mod transport;

pub use transport::{
    FiveTuple, TaggedBytesMut, TransportContext, TransportMessage, TransportProtocol,
};

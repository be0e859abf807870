#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod config;
pub mod context;
pub(crate) mod kdf;
pub(crate) mod replay;

pub use config::Config;
pub use context::Context;

/// AES_CM_128 master key length in bytes.
pub const MASTER_KEY_LEN: usize = 16;
/// AES_CM_128 master salt length in bytes.
pub const MASTER_SALT_LEN: usize = 14;
/// HMAC-SHA1 tag truncated to 80 bits for both SRTP and SRTCP.
pub const AUTH_TAG_LEN: usize = 10;

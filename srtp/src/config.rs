use crate::{MASTER_KEY_LEN, MASTER_SALT_LEN};
use shared::error::{Error, Result};

/// Default anti-replay window: sequence numbers further behind than this
/// are treated as invalid.
pub const DEFAULT_WINDOW_SIZE: usize = 8192;

/// Keying material and policy for one protection direction
/// (AES_CM_128_HMAC_SHA1_80 for both RTP and RTCP).
#[derive(Debug, Clone)]
pub struct Config {
    pub master_key: [u8; MASTER_KEY_LEN],
    pub master_salt: [u8; MASTER_SALT_LEN],
    pub window_size: usize,
    /// Permit re-sending a packet index that was already protected, which
    /// retransmission paths rely on.
    pub allow_repeat_tx: bool,
}

impl Config {
    /// Build a config from exported keying material slices.
    pub fn new(master_key: &[u8], master_salt: &[u8]) -> Result<Self> {
        if master_key.len() < MASTER_KEY_LEN {
            return Err(Error::ErrShortSrtpMasterKey);
        }
        if master_salt.len() < MASTER_SALT_LEN {
            return Err(Error::ErrShortSrtpMasterSalt);
        }
        let mut key = [0u8; MASTER_KEY_LEN];
        key.copy_from_slice(&master_key[..MASTER_KEY_LEN]);
        let mut salt = [0u8; MASTER_SALT_LEN];
        salt.copy_from_slice(&master_salt[..MASTER_SALT_LEN]);
        Ok(Config {
            master_key: key,
            master_salt: salt,
            window_size: DEFAULT_WINDOW_SIZE,
            allow_repeat_tx: true,
        })
    }
}

//! RFC 3711 AES-CM key derivation (key derivation rate 0).


use crate::{MASTER_KEY_LEN, MASTER_SALT_LEN};
use aes::cipher::{KeyIvInit, StreamCipher};
use aes::Aes128;
use ctr::Ctr128BE;

pub(crate) type Aes128Ctr = Ctr128BE<Aes128>;

pub(crate) const SESSION_KEY_LEN: usize = 16;
pub(crate) const SESSION_AUTH_LEN: usize = 20;
pub(crate) const SESSION_SALT_LEN: usize = 14;

const LABEL_RTP_ENCRYPTION: u8 = 0x00;
const LABEL_RTP_AUTH: u8 = 0x01;
const LABEL_RTP_SALT: u8 = 0x02;
const LABEL_RTCP_ENCRYPTION: u8 = 0x03;
const LABEL_RTCP_AUTH: u8 = 0x04;
const LABEL_RTCP_SALT: u8 = 0x05;

/// Session keys for one direction, RTP and RTCP halves.
pub(crate) struct SessionKeys {
    pub(crate) rtp_enc: [u8; SESSION_KEY_LEN],
    pub(crate) rtp_auth: [u8; SESSION_AUTH_LEN],
    pub(crate) rtp_salt: [u8; SESSION_SALT_LEN],
    pub(crate) rtcp_enc: [u8; SESSION_KEY_LEN],
    pub(crate) rtcp_auth: [u8; SESSION_AUTH_LEN],
    pub(crate) rtcp_salt: [u8; SESSION_SALT_LEN],
}

pub(crate) fn derive_session_keys(
    master_key: &[u8; MASTER_KEY_LEN],
    master_salt: &[u8; MASTER_SALT_LEN],
) -> SessionKeys {
    let mut salt_pad = [0u8; 16];
    salt_pad[..MASTER_SALT_LEN].copy_from_slice(master_salt);

    let mut keys = SessionKeys {
        rtp_enc: [0u8; SESSION_KEY_LEN],
        rtp_auth: [0u8; SESSION_AUTH_LEN],
        rtp_salt: [0u8; SESSION_SALT_LEN],
        rtcp_enc: [0u8; SESSION_KEY_LEN],
        rtcp_auth: [0u8; SESSION_AUTH_LEN],
        rtcp_salt: [0u8; SESSION_SALT_LEN],
    };
    aes_cm_prf(master_key, &salt_pad, LABEL_RTP_ENCRYPTION, &mut keys.rtp_enc);
    aes_cm_prf(master_key, &salt_pad, LABEL_RTP_AUTH, &mut keys.rtp_auth);
    aes_cm_prf(master_key, &salt_pad, LABEL_RTP_SALT, &mut keys.rtp_salt);
    aes_cm_prf(master_key, &salt_pad, LABEL_RTCP_ENCRYPTION, &mut keys.rtcp_enc);
    aes_cm_prf(master_key, &salt_pad, LABEL_RTCP_AUTH, &mut keys.rtcp_auth);
    aes_cm_prf(master_key, &salt_pad, LABEL_RTCP_SALT, &mut keys.rtcp_salt);
    keys
}

/// x = label placed at byte 7 of the padded salt (index term is zero with
/// kdr = 0); the key stream AES-CM(master_key, x * 2^16) fills `out`.
fn aes_cm_prf(master_key: &[u8; 16], master_salt_padded: &[u8; 16], label: u8, out: &mut [u8]) {
    let mut iv = *master_salt_padded;
    iv[7] ^= label;

    let mut cipher = Aes128Ctr::new(master_key.into(), &iv.into());
    out.fill(0);
    cipher.apply_keystream(out);
}

/// IV for payload encryption: (salt * 2^16) ⊕ (ssrc * 2^64) ⊕ (index * 2^16).
/// `index` is ROC||SEQ for SRTP and the 31-bit packet index for SRTCP.
pub(crate) fn compute_iv(session_salt: &[u8; SESSION_SALT_LEN], ssrc: u32, index: u64) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[..SESSION_SALT_LEN].copy_from_slice(session_salt);

    let ssrc_bytes = ssrc.to_be_bytes();
    for i in 0..4 {
        iv[4 + i] ^= ssrc_bytes[i];
    }

    let index_bytes = index.to_be_bytes();
    for i in 0..6 {
        iv[8 + i] ^= index_bytes[2 + i];
    }
    iv
}

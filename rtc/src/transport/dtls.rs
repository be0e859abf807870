//! DTLS engine adapter over in-memory BIOs.
//!
//! [DtlsContext] is the process-wide service holding the server certificate
//! and the negotiated `use_srtp` profile; each session owns a
//! [DtlsEndpoint] that is fed raw datagrams, drives the handshake, exports
//! the SRTP keying material on completion and carries SCTP as application
//! data afterwards.


use bytes::BytesMut;
use log::{debug, warn};
use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::ssl::{
    ErrorCode, Ssl, SslContext, SslContextBuilder, SslMethod, SslStream, SslVerifyMode,
};
use openssl::x509::{X509Builder, X509NameBuilder, X509};
use shared::error::{Error, Result};
use srtp::{Config, MASTER_KEY_LEN, MASTER_SALT_LEN};
use std::collections::VecDeque;
use std::io::{self, Read, Write};

const SRTP_PROFILE: &str = "SRTP_AES128_CM_SHA1_80";
const KEYING_MATERIAL_LABEL: &str = "EXTRACTOR-dtls_srtp";
const KEYING_MATERIAL_LEN: usize = 2 * (MASTER_KEY_LEN + MASTER_SALT_LEN);

/// Which side of the handshake this endpoint drives.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DtlsRole {
    /// Wait for the peer's ClientHello.
    Accept,
    /// Send the first flight immediately.
    Connect,
}

/// In-memory BIO pair: inbound datagrams are queued for the SSL stack to
/// read, records it writes are queued as outbound datagrams.
#[derive(Default)]
struct MemoryBio {
    incoming: VecDeque<u8>,
    outgoing: VecDeque<BytesMut>,
}

impl Read for MemoryBio {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.incoming.is_empty() {
            return Err(io::Error::from(io::ErrorKind::WouldBlock));
        }
        let n = buf.len().min(self.incoming.len());
        for (slot, byte) in buf.iter_mut().zip(self.incoming.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MemoryBio {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // one write per record; each queued entry goes out as one datagram
        self.outgoing.push_back(BytesMut::from(buf));
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// SRTP keying material split out of the finished handshake, already
/// assigned to directions by role.
pub struct ExportedKeys {
    pub send: Config,
    pub recv: Config,
}

/// Process-wide DTLS service: certificate, key and `use_srtp` negotiation.
pub struct DtlsContext {
    context: SslContext,
    fingerprint: String,
}

impl DtlsContext {
    /// Context from PEM-encoded certificate and private key.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self> {
        let cert = X509::from_pem(cert_pem).map_err(ssl_err)?;
        let pkey = PKey::private_key_from_pem(key_pem).map_err(ssl_err)?;
        Self::from_parts(cert, pkey)
    }

    /// Context with a fresh self-signed ECDSA P-256 certificate, for
    /// deployments that do not provide one.
    pub fn generate_self_signed() -> Result<Self> {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).map_err(ssl_err)?;
        let ec_key = EcKey::generate(&group).map_err(ssl_err)?;
        let pkey = PKey::from_ec_key(ec_key).map_err(ssl_err)?;

        let mut name = X509NameBuilder::new().map_err(ssl_err)?;
        name.append_entry_by_text("CN", "rtcrelay").map_err(ssl_err)?;
        let name = name.build();

        let mut builder = X509Builder::new().map_err(ssl_err)?;
        builder.set_version(2).map_err(ssl_err)?;
        let serial = {
            let mut bn = BigNum::new().map_err(ssl_err)?;
            bn.rand(64, MsbOption::MAYBE_ZERO, false).map_err(ssl_err)?;
            bn.to_asn1_integer().map_err(ssl_err)?
        };
        builder.set_serial_number(&serial).map_err(ssl_err)?;
        builder.set_subject_name(&name).map_err(ssl_err)?;
        builder.set_issuer_name(&name).map_err(ssl_err)?;
        let not_before = Asn1Time::days_from_now(0).map_err(ssl_err)?;
        builder.set_not_before(&not_before).map_err(ssl_err)?;
        let not_after = Asn1Time::days_from_now(365).map_err(ssl_err)?;
        builder.set_not_after(&not_after).map_err(ssl_err)?;
        builder.set_pubkey(&pkey).map_err(ssl_err)?;
        builder
            .sign(&pkey, MessageDigest::sha256())
            .map_err(ssl_err)?;

        Self::from_parts(builder.build(), pkey)
    }

    fn from_parts(cert: X509, pkey: PKey<Private>) -> Result<Self> {
        let fingerprint = cert
            .digest(MessageDigest::sha256())
            .map_err(ssl_err)?
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(":");

        let mut builder = SslContextBuilder::new(SslMethod::dtls()).map_err(ssl_err)?;
        builder.set_tlsext_use_srtp(SRTP_PROFILE).map_err(ssl_err)?;
        builder
            .set_cipher_list("DEFAULT:@SECLEVEL=0")
            .map_err(ssl_err)?;
        // the signaling layer pins the peer by SDP fingerprint
        builder.set_verify(SslVerifyMode::NONE);
        builder.set_certificate(&cert).map_err(ssl_err)?;
        builder.set_private_key(&pkey).map_err(ssl_err)?;
        builder.check_private_key().map_err(ssl_err)?;

        Ok(DtlsContext {
            context: builder.build(),
            fingerprint,
        })
    }

    /// SHA-256 certificate fingerprint for the SDP exchanged by signaling.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn new_endpoint(&self, role: DtlsRole) -> Result<DtlsEndpoint> {
        let mut ssl = Ssl::new(&self.context).map_err(ssl_err)?;
        match role {
            DtlsRole::Accept => ssl.set_accept_state(),
            DtlsRole::Connect => ssl.set_connect_state(),
        }
        // memory BIOs cannot answer MTU queries
        ssl.set_mtu(1200).map_err(ssl_err)?;
        let stream = SslStream::new(ssl, MemoryBio::default()).map_err(ssl_err)?;

        let mut endpoint = DtlsEndpoint {
            stream,
            role,
            handshake_done: false,
            exported: None,
        };
        if role == DtlsRole::Connect {
            // produce the first flight right away
            endpoint.drive_handshake()?;
        }
        Ok(endpoint)
    }
}

/// Per-session DTLS endpoint.
pub struct DtlsEndpoint {
    stream: SslStream<MemoryBio>,
    role: DtlsRole,
    handshake_done: bool,
    exported: Option<ExportedKeys>,
}

impl DtlsEndpoint {
    pub fn role(&self) -> DtlsRole {
        self.role
    }

    pub fn handshake_done(&self) -> bool {
        self.handshake_done
    }

    /// Keying material, available once after handshake completion.
    pub fn take_exported_keys(&mut self) -> Option<ExportedKeys> {
        self.exported.take()
    }

    /// Queue one inbound datagram for the SSL stack.
    pub fn feed(&mut self, datagram: &[u8]) {
        self.stream.get_mut().incoming.extend(datagram.iter().copied());
    }

    /// Advance the handshake as far as the buffered input allows. On
    /// completion the SRTP keys are exported and held for the session.
    pub fn drive_handshake(&mut self) -> Result<()> {
        if self.handshake_done {
            return Ok(());
        }
        match self.stream.do_handshake() {
            Ok(()) => {
                self.handshake_done = true;
                self.exported = Some(self.export_keying_material()?);
                debug!("dtls handshake done, role {:?}", self.role);
                Ok(())
            }
            Err(e) if e.code() == ErrorCode::WANT_READ || e.code() == ErrorCode::WANT_WRITE => {
                debug!("dtls handshake wants more datagrams");
                Ok(())
            }
            Err(e) => Err(Error::ErrDtlsHandshake(e.to_string())),
        }
    }

    /// Read one decrypted application-data message (an SCTP packet), if a
    /// complete record is buffered.
    pub fn read_application_data(&mut self) -> Result<Option<BytesMut>> {
        let mut buf = [0u8; 8192];
        match self.stream.ssl_read(&mut buf) {
            Ok(0) => Ok(None),
            Ok(n) => Ok(Some(BytesMut::from(&buf[..n]))),
            Err(e) if e.code() == ErrorCode::WANT_READ || e.code() == ErrorCode::WANT_WRITE => {
                Ok(None)
            }
            Err(e) if e.code() == ErrorCode::ZERO_RETURN => Err(Error::ErrDtlsClosed),
            Err(e) => {
                warn!("dtls read error: {}", e);
                Err(Error::ErrDtlsHandshake(e.to_string()))
            }
        }
    }

    /// Encrypt one application-data message (an SCTP packet) into outbound
    /// datagrams.
    pub fn write_application_data(&mut self, data: &[u8]) -> Result<()> {
        match self.stream.ssl_write(data) {
            Ok(_) => Ok(()),
            Err(e) => Err(Error::ErrDtlsHandshake(e.to_string())),
        }
    }

    /// Drain the next outbound datagram produced by the SSL stack.
    pub fn poll_transmit(&mut self) -> Option<BytesMut> {
        self.stream.get_mut().outgoing.pop_front()
    }

    /// Export 60 bytes under `EXTRACTOR-dtls_srtp` and split
    /// `client_key || server_key || client_salt || server_salt`; local and
    /// remote halves follow the handshake role.
    fn export_keying_material(&mut self) -> Result<ExportedKeys> {
        let mut material = [0u8; KEYING_MATERIAL_LEN];
        self.stream
            .ssl()
            .export_keying_material(&mut material, KEYING_MATERIAL_LABEL, None)
            .map_err(ssl_err)?;

        let (client_key, rest) = material.split_at(MASTER_KEY_LEN);
        let (server_key, rest) = rest.split_at(MASTER_KEY_LEN);
        let (client_salt, server_salt) = rest.split_at(MASTER_SALT_LEN);

        let client = Config::new(client_key, client_salt)?;
        let server = Config::new(server_key, server_salt)?;

        let (send, recv) = match self.role {
            DtlsRole::Connect => (client, server),
            DtlsRole::Accept => (server, client),
        };
        Ok(ExportedKeys { send, recv })
    }
}

fn ssl_err<E: std::fmt::Display>(e: E) -> Error {
    Error::ErrDtlsHandshake(e.to_string())
}

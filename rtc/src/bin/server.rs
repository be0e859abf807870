//! Single-threaded UDP runtime for the WebRTC session engine: one socket,
//! one session per peer address, a 20 ms housekeeping cadence, and the
//! process-wide stream registry.

use bytes::BytesMut;
use clap::Parser;
use log::{debug, info, warn};
use rand::distr::{Alphanumeric, SampleString};
use rtcrelay::constants::TICK_INTERVAL;
use rtcrelay::registry::StreamRegistry;
use rtcrelay::session::{SessionConfig, SessionInfo, SessionRole, WebRtcSession};
use rtcrelay::transport::dtls::{DtlsContext, DtlsRole};
use shared::{FiveTuple, TaggedBytesMut, TransportContext, TransportProtocol};
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::rc::Rc;
use std::time::Instant;
use stun::agent::Credentials;

#[derive(Parser)]
#[command(name = "rtcrelay-server", about = "WebRTC live fan-out media server")]
struct Args {
    /// UDP address all sub-protocols multiplex on
    #[arg(long, default_value = "0.0.0.0:8000")]
    listen: SocketAddr,

    /// PEM certificate path; a self-signed certificate is generated when
    /// omitted
    #[arg(long, requires = "key")]
    cert: Option<String>,

    /// PEM private key path
    #[arg(long, requires = "cert")]
    key: Option<String>,

    /// Local ICE username fragment; random when omitted
    #[arg(long)]
    ufrag: Option<String>,

    /// Local ICE password; random when omitted
    #[arg(long)]
    pwd: Option<String>,

    /// Application name sessions publish and subscribe under
    #[arg(long, default_value = "webrtc")]
    app: String,

    /// Stream name sessions publish and subscribe under
    #[arg(long, default_value = "test")]
    stream: String,

    /// Act as the DTLS client toward publishing peers
    #[arg(long)]
    dtls_connect: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let dtls_context = match (&args.cert, &args.key) {
        (Some(cert), Some(key)) => {
            DtlsContext::from_pem(&std::fs::read(cert)?, &std::fs::read(key)?)?
        }
        _ => DtlsContext::generate_self_signed()?,
    };
    info!("certificate fingerprint sha-256 {}", dtls_context.fingerprint());

    let mut rng = rand::rng();
    let local_ufrag = args
        .ufrag
        .clone()
        .unwrap_or_else(|| Alphanumeric.sample_string(&mut rng, 8));
    let local_pwd = args
        .pwd
        .clone()
        .unwrap_or_else(|| Alphanumeric.sample_string(&mut rng, 24));
    info!("ice-lite credentials {}:{}", local_ufrag, local_pwd);

    let socket = UdpSocket::bind(args.listen)?;
    socket.set_nonblocking(true)?;
    let local_addr = socket.local_addr()?;
    info!("listening on udp {}", local_addr);

    let dtls_role = if args.dtls_connect {
        DtlsRole::Connect
    } else {
        DtlsRole::Accept
    };

    let mut registry = StreamRegistry::new();
    let mut sessions: HashMap<FiveTuple, Rc<RefCell<WebRtcSession>>> = HashMap::new();
    let mut recv_buf = [0u8; 2048];
    let mut next_tick = Instant::now() + TICK_INTERVAL;

    loop {
        let now = Instant::now();

        match socket.recv_from(&mut recv_buf) {
            Ok((len, peer_addr)) => {
                let transport = TransportContext {
                    local_addr,
                    peer_addr,
                    transport_protocol: TransportProtocol::UDP,
                };
                let five_tuple = FiveTuple::from(&transport);
                let session = match sessions.get(&five_tuple) {
                    Some(session) => session.clone(),
                    None => {
                        info!("new session for {}", peer_addr);
                        let config = SessionConfig {
                            transport,
                            credentials: Credentials {
                                local_ufrag: local_ufrag.clone(),
                                local_pwd: local_pwd.clone(),
                                remote_ufrag: String::new(),
                                remote_pwd: String::new(),
                            },
                            session_info: SessionInfo {
                                app: args.app.clone(),
                                stream: args.stream.clone(),
                            },
                            role: SessionRole::Both,
                            dtls_role,
                        };
                        let session = WebRtcSession::into_shared(config, &dtls_context, now)?;
                        sessions.insert(five_tuple, session.clone());
                        session
                    }
                };

                let msg = TaggedBytesMut {
                    now,
                    transport: *session.borrow().transport(),
                    message: BytesMut::from(&recv_buf[..len]),
                };
                if let Err(e) = session.borrow_mut().handle_read(msg, &mut registry) {
                    warn!("session {} dropped datagram: {}", peer_addr, e);
                }
                // fan-out fills other sessions' queues too
                for session in sessions.values() {
                    drain(&socket, session);
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                std::thread::sleep(std::time::Duration::from_millis(1));
            }
            Err(e) => return Err(e.into()),
        }

        if now >= next_tick {
            next_tick = now + TICK_INTERVAL;
            for session in sessions.values() {
                if let Err(e) = session.borrow_mut().handle_timeout(now) {
                    warn!("tick failed: {}", e);
                }
                drain(&socket, session);
            }

            sessions.retain(|five_tuple, session| {
                let closeable = session.borrow().is_closeable();
                if closeable {
                    info!("release session {}", five_tuple.peer_addr);
                }
                !closeable
            });
            registry.prune();
        }
    }
}

/// Move a session's queued datagrams onto the socket. Write failures are
/// swallowed; a dead peer times out on its own.
fn drain(socket: &UdpSocket, session: &Rc<RefCell<WebRtcSession>>) {
    let mut session = session.borrow_mut();
    while let Some(transmit) = session.poll_transmit() {
        if let Err(e) = socket.send_to(&transmit.message, transmit.transport.peer_addr) {
            debug!(
                "udp send to {} failed: {}",
                transmit.transport.peer_addr, e
            );
        }
    }
}

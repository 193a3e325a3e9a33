//! TCP control channel to the host.
//!
//! [`ControlChannel::connect`] dials the host, performs the handshake, and
//! spawns two background tasks:
//!
//! - a read loop that frames inbound messages (header first, then exactly
//!   `payload_len` bytes), auto-answers PING with PONG, and publishes
//!   system-state snapshots and launch outcomes to the observers;
//! - a keepalive loop that sends PING every interval and declares the
//!   connection dead after three silent intervals. Any inbound frame counts
//!   as liveness, not just PONG.
//!
//! The channel never reconnects on its own; when it is lost it reports
//! through the observers and goes quiet. Reconnecting is a session-manager
//! decision.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use iobus_core::{
    decode_payload, encode_message,
    protocol::messages::{
        HandshakeAck, HandshakeReq, Message, HEADER_SIZE, KEEPALIVE_TIMEOUT_MULTIPLIER,
        MAX_PAYLOAD_LENGTH, PROTOCOL_VERSION,
    },
    ProtocolError,
};
use thiserror::Error;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    sync::Mutex,
    task::{AbortHandle, JoinHandle},
    time::{interval, Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use super::{ConnectionState, LaunchOutcome, NetworkObservers};

/// Errors that can occur on the control channel.
#[derive(Debug, Error)]
pub enum ControlError {
    /// TCP connection to the host failed.
    #[error("failed to connect to {host}:{port}: {source}")]
    ConnectFailed {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// An I/O error occurred on the established connection.
    #[error("control channel I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream carried bytes that cannot be decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The server refused the handshake.
    #[error("handshake rejected: {0}")]
    Rejected(String),

    /// The server speaks a different protocol version.
    #[error("protocol version mismatch: server speaks v{server}")]
    VersionMismatch { server: u16 },

    /// The server replied to the handshake with something unexpected.
    #[error("unexpected handshake reply: message type 0x{0:02X}")]
    UnexpectedReply(u8),

    /// The channel has already been closed.
    #[error("control channel closed")]
    Closed,
}

/// Reliable TCP control plane of one session.
#[derive(Debug)]
pub struct ControlChannel {
    writer: Arc<Mutex<OwnedWriteHalf>>,
    alive: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ControlChannel {
    /// Connects to the host, performs the handshake, and starts the read and
    /// keepalive loops.
    ///
    /// Publishes `Connecting` → `Handshaking` → `Connected` transitions on
    /// `observers.state` as it goes; any failure leaves the state at `Error`.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::ConnectFailed`] if the TCP dial fails,
    /// [`ControlError::Rejected`] if the server refuses the session, and
    /// [`ControlError::VersionMismatch`] if the acked version differs from
    /// ours.
    pub async fn connect(
        host: &str,
        port: u16,
        client_name: &str,
        observers: NetworkObservers,
    ) -> Result<(Self, HandshakeAck), ControlError> {
        observers.state.send_replace(ConnectionState::Connecting);

        let stream = match TcpStream::connect((host, port)).await {
            Ok(stream) => stream,
            Err(source) => {
                observers.state.send_replace(ConnectionState::Error);
                return Err(ControlError::ConnectFailed {
                    host: host.to_string(),
                    port,
                    source,
                });
            }
        };
        // Control frames are tiny; Nagle only adds latency here.
        if let Err(e) = stream.set_nodelay(true) {
            warn!("could not set TCP_NODELAY: {e}");
        }

        let (mut reader, mut writer) = stream.into_split();

        let ack = match handshake(&mut reader, &mut writer, client_name, &observers).await {
            Ok(ack) => ack,
            Err(e) => {
                observers.state.send_replace(ConnectionState::Error);
                return Err(e);
            }
        };

        observers.state.send_replace(ConnectionState::Connected);
        info!(
            "handshake accepted: server v{}, udp port {}, keepalive {}s",
            ack.server_version, ack.udp_port, ack.keepalive_interval
        );

        let writer = Arc::new(Mutex::new(writer));
        let alive = Arc::new(AtomicBool::new(true));
        let last_inbound = Arc::new(Mutex::new(Instant::now()));
        let keepalive = Duration::from_secs(u64::from(ack.keepalive_interval.max(1)));

        let read_task = tokio::spawn(read_loop(
            reader,
            Arc::clone(&writer),
            Arc::clone(&alive),
            Arc::clone(&last_inbound),
            observers.clone(),
        ));
        let keepalive_task = tokio::spawn(keepalive_loop(
            Arc::clone(&writer),
            Arc::clone(&alive),
            Arc::clone(&last_inbound),
            keepalive,
            observers,
            read_task.abort_handle(),
        ));

        Ok((
            Self {
                writer,
                alive,
                tasks: vec![read_task, keepalive_task],
            },
            ack,
        ))
    }

    /// Encodes and writes one message to the control stream.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Closed`] after the channel has been torn down,
    /// or the underlying I/O error if the write fails.
    pub async fn send_message(&self, msg: &Message) -> Result<(), ControlError> {
        if !self.alive.load(Ordering::Relaxed) {
            return Err(ControlError::Closed);
        }
        let bytes = encode_message(msg);
        let mut guard = self.writer.lock().await;
        guard.write_all(&bytes).await?;
        Ok(())
    }

    /// Whether the channel is still usable.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    /// Gracefully closes the channel: sends DISCONNECT best-effort, shuts the
    /// stream down, and stops both background tasks. Safe to call twice.
    pub async fn close(&self) {
        if self.alive.swap(false, Ordering::Relaxed) {
            let bytes = encode_message(&Message::Disconnect);
            let mut guard = self.writer.lock().await;
            let _ = guard.write_all(&bytes).await;
            let _ = guard.shutdown().await;
        }
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Sends HANDSHAKE_REQ and waits for the server's verdict.
///
/// The server's answer is exactly one frame, and it must be a well-formed
/// ack or reject. A frame that fails to decode aborts the handshake instead
/// of being skipped; waiting for a second frame here could block forever
/// against a server that only ever sends one.
async fn handshake(
    reader: &mut OwnedReadHalf,
    writer: &mut OwnedWriteHalf,
    client_name: &str,
    observers: &NetworkObservers,
) -> Result<HandshakeAck, ControlError> {
    let req = Message::HandshakeReq(HandshakeReq {
        client_version: u16::from(PROTOCOL_VERSION),
        flags: 0,
        client_name: client_name.to_string(),
    });
    writer.write_all(&encode_message(&req)).await?;
    observers.state.send_replace(ConnectionState::Handshaking);

    let (msg_type, payload) = read_raw_frame(reader).await?;
    match decode_payload(msg_type, &payload)? {
        Message::HandshakeAck(ack) => {
            if ack.server_version != u16::from(PROTOCOL_VERSION) {
                return Err(ControlError::VersionMismatch {
                    server: ack.server_version,
                });
            }
            Ok(ack)
        }
        Message::HandshakeReject(rej) => Err(ControlError::Rejected(rej.reason)),
        other => Err(ControlError::UnexpectedReply(other.message_type() as u8)),
    }
}

/// Reads one length-framed frame off the stream: 4-byte header, then exactly
/// the declared payload. Returns the raw type byte and payload bytes.
///
/// Errors are fatal to the stream: I/O failures, wrong protocol version, or
/// a length field past the framing limit.
async fn read_raw_frame(reader: &mut OwnedReadHalf) -> Result<(u8, Vec<u8>), ControlError> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header).await?;

    // Version is checked before the type so a foreign stream fails fast.
    if header[0] != PROTOCOL_VERSION {
        return Err(ControlError::Protocol(ProtocolError::UnsupportedVersion(
            header[0],
        )));
    }
    let payload_len = u16::from_be_bytes([header[2], header[3]]) as usize;
    if payload_len > MAX_PAYLOAD_LENGTH {
        return Err(ControlError::Protocol(ProtocolError::MalformedPayload(
            format!("declared payload length {payload_len} exceeds maximum {MAX_PAYLOAD_LENGTH}"),
        )));
    }

    let mut payload = vec![0u8; payload_len];
    if payload_len > 0 {
        reader.read_exact(&mut payload).await?;
    }
    Ok((header[1], payload))
}

/// Reads one frame and decodes it, skipping frames an established session
/// can tolerate losing: unknown types and bad payloads of known types come
/// back as `Ok(None)`. Framing-level errors from [`read_raw_frame`] stay
/// fatal.
async fn read_frame(reader: &mut OwnedReadHalf) -> Result<Option<Message>, ControlError> {
    let (msg_type, payload) = read_raw_frame(reader).await?;
    match decode_payload(msg_type, &payload) {
        Ok(msg) => Ok(Some(msg)),
        Err(ProtocolError::UnknownMessageType(t)) => {
            debug!("skipping unknown message type 0x{t:02X} ({} bytes)", payload.len());
            Ok(None)
        }
        Err(e) => {
            warn!("dropping malformed frame (type 0x{msg_type:02X}): {e}");
            Ok(None)
        }
    }
}

/// Frames inbound messages until the stream ends or the server disconnects.
async fn read_loop(
    mut reader: OwnedReadHalf,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    alive: Arc<AtomicBool>,
    last_inbound: Arc<Mutex<Instant>>,
    observers: NetworkObservers,
) {
    let failure: Option<String> = loop {
        let msg = match read_frame(&mut reader).await {
            Ok(Some(msg)) => msg,
            Ok(None) => {
                *last_inbound.lock().await = Instant::now();
                continue;
            }
            Err(ControlError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break Some("connection closed by server".to_string());
            }
            Err(e) => break Some(e.to_string()),
        };

        *last_inbound.lock().await = Instant::now();

        match msg {
            Message::Ping => {
                let pong = encode_message(&Message::Pong);
                if let Err(e) = writer.lock().await.write_all(&pong).await {
                    break Some(format!("failed to answer ping: {e}"));
                }
            }
            Message::Pong => {}
            Message::Disconnect => break None,
            Message::SystemStateResponse(state) => {
                debug!(
                    "system state: brightness={}, volume={}, muted={}, locked={}",
                    state.brightness, state.volume, state.is_muted, state.is_locked
                );
                observers.system_state.send_replace(Some(state));
            }
            Message::Ack { request_id } => {
                let _ = observers.launch_outcomes.send(LaunchOutcome {
                    request_id,
                    success: true,
                });
            }
            Message::CommandError { request_id } => {
                warn!("server reported command failure (request {request_id})");
                let _ = observers.launch_outcomes.send(LaunchOutcome {
                    request_id,
                    success: false,
                });
            }
            Message::Error(text) => {
                warn!("server error: {text}");
                observers.errors.send_replace(Some(text));
            }
            other => {
                debug!(
                    "ignoring {:?} on control channel",
                    other.message_type()
                );
            }
        }
    };

    // Report only if we lost the connection; a local close() already flipped
    // the flag and owns the state transition.
    if alive.swap(false, Ordering::Relaxed) {
        match failure {
            Some(reason) => {
                error!("control channel lost: {reason}");
                observers.errors.send_replace(Some(reason));
                observers.state.send_replace(ConnectionState::Error);
            }
            None => info!("server requested disconnect"),
        }
        observers.state.send_replace(ConnectionState::Disconnected);
    }
}

/// Sends PING every `interval` and enforces the silence timeout.
///
/// A peer quiet for [`KEEPALIVE_TIMEOUT_MULTIPLIER`] intervals is considered
/// dead; the read task is aborted since it may be blocked mid-read on a
/// half-dead socket.
async fn keepalive_loop(
    writer: Arc<Mutex<OwnedWriteHalf>>,
    alive: Arc<AtomicBool>,
    last_inbound: Arc<Mutex<Instant>>,
    keepalive: Duration,
    observers: NetworkObservers,
    read_abort: AbortHandle,
) {
    let timeout = keepalive * KEEPALIVE_TIMEOUT_MULTIPLIER;
    let mut ticker = interval(keepalive);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await; // first tick fires immediately

    loop {
        ticker.tick().await;
        if !alive.load(Ordering::Relaxed) {
            break;
        }

        let idle = last_inbound.lock().await.elapsed();
        if idle > timeout {
            if alive.swap(false, Ordering::Relaxed) {
                error!("no traffic from server for {idle:?}; dropping connection");
                observers
                    .errors
                    .send_replace(Some("keepalive timeout: server unresponsive".to_string()));
                observers.state.send_replace(ConnectionState::Error);
                observers.state.send_replace(ConnectionState::Disconnected);
                read_abort.abort();
                let mut guard = writer.lock().await;
                let _ = guard.shutdown().await;
            }
            break;
        }

        let ping = encode_message(&Message::Ping);
        if writer.lock().await.write_all(&ping).await.is_err() {
            // The read loop will observe the broken stream and report it.
            break;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

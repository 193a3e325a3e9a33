//! UDP input path to the host.
//!
//! Input events are fire-and-forget: no retransmits, no acknowledgements.
//! For mouse motion a stale packet is worse than a lost one, so the queue in
//! front of the socket is bounded and overflow drops the newest event instead
//! of blocking the caller.

use iobus_core::{encode_message, protocol::messages::Message};
use tokio::net::UdpSocket;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace, warn};

/// Bounded depth of the outbound event queue. At typical trackpad sampling
/// rates this holds about two seconds of backlog.
const QUEUE_CAPACITY: usize = 256;

/// Lossy UDP data plane of one session.
///
/// One background task drains the queue and writes one datagram per event.
/// Dropping the sender closes the queue and ends the task.
pub struct InputSender {
    tx: mpsc::Sender<Message>,
}

impl InputSender {
    /// Binds an ephemeral local socket and connects it to the host's input
    /// port (the port announced in the handshake ack, never the default).
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the bind or connect fails.
    pub async fn bind(host: &str, udp_port: u16) -> std::io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect((host, udp_port)).await?;
        debug!(
            "input socket {} -> {}:{udp_port}",
            socket.local_addr()?,
            host
        );

        let (tx, mut rx) = mpsc::channel::<Message>(QUEUE_CAPACITY);
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let datagram = encode_message(&msg);
                if let Err(e) = socket.send(&datagram).await {
                    // Lossy plane: log and keep draining.
                    warn!("udp send failed: {e}");
                }
            }
            trace!("input queue closed; sender task exiting");
        });

        Ok(Self { tx })
    }

    /// Queues one event for transmission. Never blocks: if the queue is full
    /// the event is dropped, and a closed queue means the session is gone.
    pub fn send(&self, msg: Message) {
        match self.tx.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(msg)) => {
                trace!("input queue full; dropping {:?}", msg.message_type());
            }
            Err(TrySendError::Closed(msg)) => {
                debug!("input path closed; dropping {:?}", msg.message_type());
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Network infrastructure for the client application.
//!
//! Two transports make up one logical connection to the host:
//!
//! - [`ControlChannel`] — the reliable TCP control plane. Carries the
//!   handshake, PING/PONG keepalive, system-state queries, app launches and
//!   their acknowledgements, and DISCONNECT.
//! - [`InputSender`] — the lossy UDP data plane. Carries high-frequency input
//!   events (mouse motion, clicks, scrolls, drags, key events) where a stale
//!   packet is worse than a lost one.
//!
//! Both are created by the application layer's session manager; neither
//! reconnects on its own.

pub mod control;
pub mod input_sender;

pub use control::{ControlChannel, ControlError};
pub use input_sender::InputSender;

use iobus_core::protocol::messages::SystemState;
use tokio::sync::{broadcast, watch};

/// Lifecycle of the logical connection, published on a `watch` channel so the
/// UI can render the current status without polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection, and none in progress.
    Disconnected,
    /// TCP connect in flight.
    Connecting,
    /// TCP established, waiting for the handshake reply.
    Handshaking,
    /// Handshake accepted; both planes usable.
    Connected,
    /// Connect or handshake failed. Cleared by the next connect attempt.
    Error,
}

/// Outcome of a LAUNCH_APP request, correlated by the server's request byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchOutcome {
    pub request_id: u8,
    pub success: bool,
}

/// Bundle of channel senders the control channel publishes into.
///
/// The application layer keeps the matching receivers; the network layer only
/// ever sends. All senders are cheap to clone.
#[derive(Clone)]
pub struct NetworkObservers {
    /// Connection lifecycle transitions.
    pub state: watch::Sender<ConnectionState>,
    /// Most recent connection-level error text, if any.
    pub errors: watch::Sender<Option<String>>,
    /// Latest host system-state snapshot.
    pub system_state: watch::Sender<Option<SystemState>>,
    /// Per-launch success/failure notifications.
    pub launch_outcomes: broadcast::Sender<LaunchOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_equality() {
        assert_eq!(ConnectionState::Disconnected, ConnectionState::Disconnected);
        assert_ne!(ConnectionState::Connecting, ConnectionState::Connected);
    }

    #[test]
    fn test_network_observers_clone_shares_watch_channel() {
        let (state, rx) = watch::channel(ConnectionState::Disconnected);
        let (errors, _) = watch::channel(None);
        let (system_state, _) = watch::channel(None);
        let (launch_outcomes, _) = broadcast::channel(8);

        let observers = NetworkObservers {
            state,
            errors,
            system_state,
            launch_outcomes,
        };
        let cloned = observers.clone();
        cloned
            .state
            .send(ConnectionState::Connecting)
            .expect("receiver alive");
        assert_eq!(*rx.borrow(), ConnectionState::Connecting);
    }
}

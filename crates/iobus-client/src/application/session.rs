//! Session orchestration: one logical connection built from two transports.
//!
//! [`SessionManager`] is the single surface the UI layer talks to. It opens
//! the TCP control channel, and only once the handshake ack names the input
//! port does it bind the UDP sender — the ack's port is authoritative, the
//! configured default is only a fallback for the TCP dial. Typed send
//! methods stamp timestamps and clamp deltas so callers hand over raw UI
//! values.
//!
//! Input sends are deliberately infallible from the caller's point of view:
//! when no session is active the event is dropped with a debug log. A
//! trackpad handler cannot usefully react to "not connected" on every frame.

use std::time::{SystemTime, UNIX_EPOCH};

use iobus_core::protocol::messages::{
    ClickAction, KeyAction, KeyEvent, LaunchApp, Message, ModifierFlags, MouseButton, MouseClick,
    MouseDrag, MouseMove, MouseScroll, SystemAction, SystemActionId, SystemState,
};
use thiserror::Error;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, info, warn};

use crate::infrastructure::network::{
    ConnectionState, ControlChannel, ControlError, InputSender, LaunchOutcome, NetworkObservers,
};

/// Errors surfaced from a connect attempt.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The control channel could not be established.
    #[error(transparent)]
    Control(#[from] ControlError),

    /// The control channel came up but the UDP input socket could not.
    #[error("failed to open input socket: {0}")]
    InputBind(#[source] std::io::Error),
}

struct ActiveSession {
    control: ControlChannel,
    input: InputSender,
}

/// Point-in-time snapshot for polling UIs; push-style consumers should use
/// the `subscribe_*` channels instead.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub state: ConnectionState,
    pub last_error: Option<String>,
    pub system_state: Option<SystemState>,
}

/// Owns the connection lifecycle and both transports.
pub struct SessionManager {
    client_name: String,
    session: Mutex<Option<ActiveSession>>,
    state_tx: watch::Sender<ConnectionState>,
    error_tx: watch::Sender<Option<String>>,
    system_state_tx: watch::Sender<Option<SystemState>>,
    launch_tx: broadcast::Sender<LaunchOutcome>,
}

impl SessionManager {
    /// Creates a manager in the `Disconnected` state. `client_name` is the
    /// device name advertised in the handshake.
    pub fn new(client_name: impl Into<String>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (error_tx, _) = watch::channel(None);
        let (system_state_tx, _) = watch::channel(None);
        let (launch_tx, _) = broadcast::channel(16);
        Self {
            client_name: client_name.into(),
            session: Mutex::new(None),
            state_tx,
            error_tx,
            system_state_tx,
            launch_tx,
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Connects to the host: TCP handshake first, then the UDP input socket
    /// bound to the port the ack announced. Any previous session is torn
    /// down first, so calling this while connected is a reconnect.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Control`] if the dial or handshake fails and
    /// [`SessionError::InputBind`] if the UDP socket cannot be opened (the
    /// control channel is closed again in that case).
    pub async fn connect(&self, host: &str, tcp_port: u16) -> Result<(), SessionError> {
        self.disconnect().await;
        self.error_tx.send_replace(None);

        let observers = NetworkObservers {
            state: self.state_tx.clone(),
            errors: self.error_tx.clone(),
            system_state: self.system_state_tx.clone(),
            launch_outcomes: self.launch_tx.clone(),
        };

        let (control, ack) =
            ControlChannel::connect(host, tcp_port, &self.client_name, observers).await?;

        let input = match InputSender::bind(host, ack.udp_port).await {
            Ok(input) => input,
            Err(source) => {
                warn!("input socket failed; closing control channel");
                control.close().await;
                self.state_tx.send_replace(ConnectionState::Error);
                return Err(SessionError::InputBind(source));
            }
        };

        info!(
            "session established with {host}: control :{tcp_port}, input :{}",
            ack.udp_port
        );
        *self.session.lock().await = Some(ActiveSession { control, input });
        Ok(())
    }

    /// Tears down the active session, if any. Idempotent.
    pub async fn disconnect(&self) {
        if let Some(session) = self.session.lock().await.take() {
            session.control.close().await;
            self.state_tx.send_replace(ConnectionState::Disconnected);
            info!("session closed");
        }
    }

    /// Snapshot of the current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Full status snapshot.
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            state: *self.state_tx.borrow(),
            last_error: self.error_tx.borrow().clone(),
            system_state: *self.system_state_tx.borrow(),
        }
    }

    /// Whether an active, live session exists.
    pub async fn is_connected(&self) -> bool {
        match self.session.lock().await.as_ref() {
            Some(session) => session.control.is_alive(),
            None => false,
        }
    }

    // ── Observers ────────────────────────────────────────────────────────────

    /// Subscribes to connection state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Subscribes to connection-level error messages.
    pub fn subscribe_errors(&self) -> watch::Receiver<Option<String>> {
        self.error_tx.subscribe()
    }

    /// Subscribes to host system-state snapshots.
    pub fn subscribe_system_state(&self) -> watch::Receiver<Option<SystemState>> {
        self.system_state_tx.subscribe()
    }

    /// Subscribes to launch outcomes.
    pub fn subscribe_launch_outcomes(&self) -> broadcast::Receiver<LaunchOutcome> {
        self.launch_tx.subscribe()
    }

    // ── Input events (UDP) ───────────────────────────────────────────────────

    /// Sends relative trackpad motion. Deltas are clamped to the wire range.
    pub async fn send_mouse_move(&self, dx: i32, dy: i32) {
        self.send_input(Message::MouseMove(MouseMove::clamped(
            timestamp_millis(),
            dx,
            dy,
        )))
        .await;
    }

    /// Sends a button press or release.
    pub async fn send_mouse_click(&self, button: MouseButton, action: ClickAction) {
        self.send_input(Message::MouseClick(MouseClick {
            timestamp: timestamp_millis(),
            button,
            action,
        }))
        .await;
    }

    /// Sends two-axis scroll deltas.
    pub async fn send_mouse_scroll(&self, dx: i32, dy: i32) {
        self.send_input(Message::MouseScroll(MouseScroll::clamped(
            timestamp_millis(),
            dx,
            dy,
        )))
        .await;
    }

    /// Sends motion with a button held.
    pub async fn send_mouse_drag(&self, button: MouseButton, dx: i32, dy: i32) {
        self.send_input(Message::MouseDrag(MouseDrag::clamped(
            timestamp_millis(),
            button,
            dx,
            dy,
        )))
        .await;
    }

    /// Sends a key press or release.
    pub async fn send_key_event(&self, action: KeyAction, keycode: u16, modifiers: ModifierFlags) {
        self.send_input(Message::KeyEvent(KeyEvent {
            timestamp: timestamp_millis(),
            action,
            keycode,
            modifiers,
        }))
        .await;
    }

    /// Sends a system action (lock, sleep, shutdown, ...).
    pub async fn send_system_action(&self, action: SystemActionId) {
        self.send_input(Message::SystemAction(SystemAction {
            timestamp: timestamp_millis(),
            action,
        }))
        .await;
    }

    // ── Control requests (TCP) ───────────────────────────────────────────────

    /// Asks the host to launch an application by name. The outcome arrives
    /// later on the launch-outcome channel.
    pub async fn send_launch_app(&self, app_name: &str) {
        self.send_control(Message::LaunchApp(LaunchApp {
            timestamp: timestamp_millis(),
            app_name: app_name.to_string(),
        }))
        .await;
    }

    /// Requests a fresh system-state snapshot; the response lands on the
    /// system-state channel.
    pub async fn request_system_state(&self) {
        self.send_control(Message::GetSystemState).await;
    }

    // ── Internals ────────────────────────────────────────────────────────────

    async fn send_input(&self, msg: Message) {
        match self.session.lock().await.as_ref() {
            Some(session) => session.input.send(msg),
            None => debug!("dropping {:?}: no active session", msg.message_type()),
        }
    }

    async fn send_control(&self, msg: Message) {
        match self.session.lock().await.as_ref() {
            Some(session) => {
                if let Err(e) = session.control.send_message(&msg).await {
                    warn!("control send failed: {e}");
                }
            }
            None => debug!("dropping {:?}: no active session", msg.message_type()),
        }
    }
}

/// Milliseconds since the Unix epoch, truncated to the 32-bit wire field.
/// Receivers use it for ordering within a session, not as absolute time.
fn timestamp_millis() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u32)
        .unwrap_or(0)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

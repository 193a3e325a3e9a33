//! All iobus protocol message types.
//!
//! Wire format:
//! ```text
//! [version:u8] [type:u8] [payload_len:u16be] [payload:N]
//! ```
//! Header size: 4 bytes. All multi-byte integers are big-endian. Payloads are
//! fixed binary layouts defined per message type; see [`crate::protocol::codec`].

use serde::{Deserialize, Serialize};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Current protocol version byte.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Size of the common message header in bytes.
pub const HEADER_SIZE: usize = 4;

/// Upper bound on payload length. Any header declaring more is a framing
/// violation and the stream cannot be trusted past it.
pub const MAX_PAYLOAD_LENGTH: usize = 512;

/// Client name field width in HANDSHAKE_REQ: UTF-8, null-padded.
pub const CLIENT_NAME_LENGTH: usize = 32;

/// Maximum app-name length in LAUNCH_APP, in UTF-8 bytes.
pub const LAUNCH_NAME_MAX_LENGTH: usize = 128;

/// Cap on ERROR message text, in UTF-8 bytes.
pub const ERROR_TEXT_MAX_LENGTH: usize = 256;

/// Default TCP control-plane port.
pub const DEFAULT_TCP_PORT: u16 = 9800;

/// Default UDP data-plane port. The server may override it via the
/// handshake ack, which is always authoritative.
pub const DEFAULT_UDP_PORT: u16 = 9801;

/// Default keepalive interval in seconds.
pub const KEEPALIVE_INTERVAL_SECS: u16 = 5;

/// Missed-traffic multiplier: a peer silent for this many keepalive
/// intervals is considered dead.
pub const KEEPALIVE_TIMEOUT_MULTIPLIER: u32 = 3;

// ── Message type codes ────────────────────────────────────────────────────────

/// All message type codes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    // Control plane (TCP)
    HandshakeReq = 0x01,
    HandshakeAck = 0x02,
    HandshakeReject = 0x03,
    Ping = 0x10,
    Pong = 0x11,
    Disconnect = 0x1F,
    // Data plane (UDP) — mouse
    MouseMove = 0x20,
    MouseClick = 0x21,
    MouseScroll = 0x22,
    MouseDrag = 0x23,
    // Data plane (UDP) — keyboard
    KeyEvent = 0x30,
    // Data plane (UDP) — system actions
    SystemAction = 0x40,
    // Data plane (UDP) — app launcher
    LaunchApp = 0x50,
    // System state (TCP)
    GetSystemState = 0x5F,
    SystemStateResponse = 0x60,
    Ack = 0x61,
    CommandError = 0x62,
    // Error
    Error = 0xFF,
}

impl TryFrom<u8> for MessageType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(MessageType::HandshakeReq),
            0x02 => Ok(MessageType::HandshakeAck),
            0x03 => Ok(MessageType::HandshakeReject),
            0x10 => Ok(MessageType::Ping),
            0x11 => Ok(MessageType::Pong),
            0x1F => Ok(MessageType::Disconnect),
            0x20 => Ok(MessageType::MouseMove),
            0x21 => Ok(MessageType::MouseClick),
            0x22 => Ok(MessageType::MouseScroll),
            0x23 => Ok(MessageType::MouseDrag),
            0x30 => Ok(MessageType::KeyEvent),
            0x40 => Ok(MessageType::SystemAction),
            0x50 => Ok(MessageType::LaunchApp),
            0x5F => Ok(MessageType::GetSystemState),
            0x60 => Ok(MessageType::SystemStateResponse),
            0x61 => Ok(MessageType::Ack),
            0x62 => Ok(MessageType::CommandError),
            0xFF => Ok(MessageType::Error),
            _ => Err(()),
        }
    }
}

// ── Common message header ─────────────────────────────────────────────────────

/// 4-byte header prepended to every message on the wire.
///
/// The type is kept as a raw byte here so that framing code can skip over
/// messages it does not understand: an unknown type still has a readable
/// payload length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Protocol version; [`PROTOCOL_VERSION`] on everything we produce.
    pub version: u8,
    /// Raw message type byte (see [`MessageType`]).
    pub message_type: u8,
    /// Length of the payload in bytes (not including this header).
    pub payload_length: u16,
}

// ── Field enums ───────────────────────────────────────────────────────────────

/// Mouse button identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MouseButton {
    Left = 0,
    Right = 1,
    Middle = 2,
}

impl TryFrom<u8> for MouseButton {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MouseButton::Left),
            1 => Ok(MouseButton::Right),
            2 => Ok(MouseButton::Middle),
            _ => Err(()),
        }
    }
}

/// Mouse click action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ClickAction {
    Press = 0,
    Release = 1,
}

impl TryFrom<u8> for ClickAction {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ClickAction::Press),
            1 => Ok(ClickAction::Release),
            _ => Err(()),
        }
    }
}

/// Key press action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum KeyAction {
    KeyDown = 0,
    KeyUp = 1,
}

impl TryFrom<u8> for KeyAction {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(KeyAction::KeyDown),
            1 => Ok(KeyAction::KeyUp),
            _ => Err(()),
        }
    }
}

/// Modifier key bitmask used in [`KeyEvent`].
///
/// Bit layout:
/// - Bit 0: Shift
/// - Bit 1: Control
/// - Bit 2: Alt (Option on macOS)
/// - Bit 3: Meta (Cmd on macOS, Win key on Windows)
/// - Bit 4: Fn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModifierFlags(pub u8);

impl ModifierFlags {
    pub const SHIFT: u8 = 0x01;
    pub const CONTROL: u8 = 0x02;
    pub const ALT: u8 = 0x04;
    pub const META: u8 = 0x08;
    pub const FN: u8 = 0x10;

    /// Returns `true` if the Shift modifier is active.
    pub fn shift(&self) -> bool {
        self.0 & Self::SHIFT != 0
    }

    /// Returns `true` if the Control modifier is active.
    pub fn control(&self) -> bool {
        self.0 & Self::CONTROL != 0
    }

    /// Returns `true` if the Alt modifier is active.
    pub fn alt(&self) -> bool {
        self.0 & Self::ALT != 0
    }

    /// Returns `true` if the Meta (Cmd/Win/Super) modifier is active.
    pub fn meta(&self) -> bool {
        self.0 & Self::META != 0
    }

    /// Returns `true` if the Fn modifier is active.
    pub fn fn_key(&self) -> bool {
        self.0 & Self::FN != 0
    }
}

/// System action identifiers for [`SystemAction`] messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SystemActionId {
    LockScreen = 1,
    PowerDialog = 2,
    Sleep = 3,
    Shutdown = 4,
    Restart = 5,
}

impl TryFrom<u8> for SystemActionId {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(SystemActionId::LockScreen),
            2 => Ok(SystemActionId::PowerDialog),
            3 => Ok(SystemActionId::Sleep),
            4 => Ok(SystemActionId::Shutdown),
            5 => Ok(SystemActionId::Restart),
            _ => Err(()),
        }
    }
}

// ── Per-message payload structs ───────────────────────────────────────────────

/// HANDSHAKE_REQ (0x01): sent by the client to open a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeReq {
    /// Protocol version the client speaks.
    pub client_version: u16,
    /// Reserved; always 0 in this version.
    pub flags: u16,
    /// Human-readable device name, at most [`CLIENT_NAME_LENGTH`] UTF-8 bytes
    /// on the wire (null-padded).
    pub client_name: String,
}

/// HANDSHAKE_ACK (0x02): server accepts the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeAck {
    /// Protocol version the server speaks.
    pub server_version: u16,
    /// Reserved flags.
    pub flags: u16,
    /// UDP port the client must send input events to. Authoritative —
    /// overrides [`DEFAULT_UDP_PORT`].
    pub udp_port: u16,
    /// Keepalive interval in seconds negotiated by the server.
    pub keepalive_interval: u16,
}

/// HANDSHAKE_REJECT (0x03): server refuses the session.
///
/// The payload is raw UTF-8 reason text filling the whole payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeReject {
    /// Human-readable rejection reason supplied by the server.
    pub reason: String,
}

/// MOUSE_MOVE (0x20): relative trackpad motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MouseMove {
    /// Client-side timestamp, milliseconds (truncated to 32 bits).
    pub timestamp: u32,
    /// Horizontal delta in pixels.
    pub dx: i16,
    /// Vertical delta in pixels.
    pub dy: i16,
}

impl MouseMove {
    /// Builds a `MouseMove`, saturating out-of-range deltas to the `i16`
    /// range. Motion data is lossy by design, so saturation is silent.
    pub fn clamped(timestamp: u32, dx: i32, dy: i32) -> Self {
        Self {
            timestamp,
            dx: clamp_delta(dx),
            dy: clamp_delta(dy),
        }
    }
}

/// MOUSE_CLICK (0x21): button press or release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MouseClick {
    pub timestamp: u32,
    pub button: MouseButton,
    pub action: ClickAction,
}

/// MOUSE_SCROLL (0x22): two-axis scroll deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MouseScroll {
    pub timestamp: u32,
    pub dx: i16,
    pub dy: i16,
}

impl MouseScroll {
    /// Builds a `MouseScroll` with silently saturated deltas.
    pub fn clamped(timestamp: u32, dx: i32, dy: i32) -> Self {
        Self {
            timestamp,
            dx: clamp_delta(dx),
            dy: clamp_delta(dy),
        }
    }
}

/// MOUSE_DRAG (0x23): motion while a button is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MouseDrag {
    pub timestamp: u32,
    pub button: MouseButton,
    pub dx: i16,
    pub dy: i16,
}

impl MouseDrag {
    /// Builds a `MouseDrag` with silently saturated deltas.
    pub fn clamped(timestamp: u32, button: MouseButton, dx: i32, dy: i32) -> Self {
        Self {
            timestamp,
            button,
            dx: clamp_delta(dx),
            dy: clamp_delta(dy),
        }
    }
}

/// KEY_EVENT (0x30): keyboard press or release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub timestamp: u32,
    pub action: KeyAction,
    /// Platform-agnostic key code as defined by the protocol key table.
    pub keycode: u16,
    /// Active modifier keys at the time of the event.
    pub modifiers: ModifierFlags,
}

/// SYSTEM_ACTION (0x40): lock, sleep, shutdown, and friends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemAction {
    pub timestamp: u32,
    pub action: SystemActionId,
}

/// LAUNCH_APP (0x50): ask the host to launch an application by name.
///
/// The name is truncated to [`LAUNCH_NAME_MAX_LENGTH`] UTF-8 bytes before
/// the length byte is computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchApp {
    pub timestamp: u32,
    pub app_name: String,
}

/// SYSTEM_STATE_RESPONSE (0x60): decoded host state snapshot.
///
/// Arrives over TCP in response to a GET_SYSTEM_STATE query. The wire
/// carries `brightness:u16, volume:u16, flags:u16` where flags bit 0 is
/// muted and bit 1 is locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemState {
    /// Host display brightness, percent × 100 semantics left to the server.
    pub brightness: u16,
    /// Host output volume.
    pub volume: u16,
    pub is_muted: bool,
    pub is_locked: bool,
}

// ── Top-level message enum ────────────────────────────────────────────────────

/// All valid iobus messages, discriminated by type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    HandshakeReq(HandshakeReq),
    HandshakeAck(HandshakeAck),
    HandshakeReject(HandshakeReject),
    Ping,
    Pong,
    Disconnect,
    MouseMove(MouseMove),
    MouseClick(MouseClick),
    MouseScroll(MouseScroll),
    MouseDrag(MouseDrag),
    KeyEvent(KeyEvent),
    SystemAction(SystemAction),
    LaunchApp(LaunchApp),
    GetSystemState,
    SystemStateResponse(SystemState),
    /// Launch succeeded; carries the launch-request identifier.
    Ack { request_id: u8 },
    /// Launch failed; carries the launch-request identifier.
    CommandError { request_id: u8 },
    /// Free-form error text from the peer.
    Error(String),
}

impl Message {
    /// Returns the [`MessageType`] discriminant for this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::HandshakeReq(_) => MessageType::HandshakeReq,
            Message::HandshakeAck(_) => MessageType::HandshakeAck,
            Message::HandshakeReject(_) => MessageType::HandshakeReject,
            Message::Ping => MessageType::Ping,
            Message::Pong => MessageType::Pong,
            Message::Disconnect => MessageType::Disconnect,
            Message::MouseMove(_) => MessageType::MouseMove,
            Message::MouseClick(_) => MessageType::MouseClick,
            Message::MouseScroll(_) => MessageType::MouseScroll,
            Message::MouseDrag(_) => MessageType::MouseDrag,
            Message::KeyEvent(_) => MessageType::KeyEvent,
            Message::SystemAction(_) => MessageType::SystemAction,
            Message::LaunchApp(_) => MessageType::LaunchApp,
            Message::GetSystemState => MessageType::GetSystemState,
            Message::SystemStateResponse(_) => MessageType::SystemStateResponse,
            Message::Ack { .. } => MessageType::Ack,
            Message::CommandError { .. } => MessageType::CommandError,
            Message::Error(_) => MessageType::Error,
        }
    }
}

/// Saturates an `i32` delta into the `i16` wire range.
pub fn clamp_delta(value: i32) -> i16 {
    value.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

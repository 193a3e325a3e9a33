//! Binary codec for encoding and decoding iobus protocol messages.
//!
//! Wire format:
//! ```text
//! [version:1][msg_type:1][payload_len:2][payload:N]
//! ```
//! Header size: 4 bytes. All multi-byte integers are big-endian.
//!
//! Encoding is infallible for in-range values: deltas are saturated into the
//! `i16` range and variable-length strings are truncated to their wire caps
//! before the length fields are computed. Decoding fails with a
//! [`ProtocolError`] that callers treat as "drop this frame" — a payload
//! decode failure is never fatal to a connection.

use thiserror::Error;

use crate::protocol::messages::{
    ClickAction, HandshakeAck, HandshakeReject, HandshakeReq, Header, KeyAction, KeyEvent,
    LaunchApp, Message, MessageType, ModifierFlags, MouseButton, MouseClick, MouseDrag, MouseMove,
    MouseScroll, SystemAction, SystemActionId, SystemState, CLIENT_NAME_LENGTH,
    ERROR_TEXT_MAX_LENGTH, HEADER_SIZE, LAUNCH_NAME_MAX_LENGTH, MAX_PAYLOAD_LENGTH,
    PROTOCOL_VERSION,
};

/// Errors that can occur during message decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the header plus declared payload.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The message type byte in the header is not a recognized value.
    #[error("unknown message type: 0x{0:02X}")]
    UnknownMessageType(u8),

    /// The protocol version in the header is not supported.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// The payload is shorter than its fixed layout requires, or a field
    /// value is out of range.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`Message`] into a byte vector including the 4-byte header.
///
/// Never fails and never mutates caller-supplied data. Every encoder stays
/// comfortably under [`MAX_PAYLOAD_LENGTH`] by construction.
///
/// # Examples
///
/// ```rust
/// use iobus_core::protocol::{encode_message, decode_message, Message};
///
/// let bytes = encode_message(&Message::Ping);
/// let (decoded, consumed) = decode_message(&bytes).unwrap();
/// assert_eq!(decoded, Message::Ping);
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode_message(msg: &Message) -> Vec<u8> {
    let payload = encode_payload(msg);
    debug_assert!(payload.len() <= MAX_PAYLOAD_LENGTH);

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.push(PROTOCOL_VERSION);
    buf.push(msg.message_type() as u8);
    buf.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    buf.extend_from_slice(&payload);
    buf
}

/// Decodes the 4-byte header from the beginning of `bytes`.
///
/// The message type is left as a raw byte so framing code can skip unknown
/// types. A declared payload length above [`MAX_PAYLOAD_LENGTH`] is rejected
/// here because the stream cannot be re-synchronized past it.
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] for fewer than 4 bytes and
/// [`ProtocolError::MalformedPayload`] for an oversized length field.
pub fn decode_header(bytes: &[u8]) -> Result<Header, ProtocolError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }
    let payload_length = u16::from_be_bytes([bytes[2], bytes[3]]);
    if payload_length as usize > MAX_PAYLOAD_LENGTH {
        return Err(ProtocolError::MalformedPayload(format!(
            "declared payload length {payload_length} exceeds maximum {MAX_PAYLOAD_LENGTH}"
        )));
    }
    Ok(Header {
        version: bytes[0],
        message_type: bytes[1],
        payload_length,
    })
}

/// Decodes one [`Message`] from the beginning of `bytes`.
///
/// Returns the decoded message and the total number of bytes consumed
/// (header + payload), so the caller can advance their read cursor.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the bytes are malformed or the version byte
/// is not [`PROTOCOL_VERSION`].
pub fn decode_message(bytes: &[u8]) -> Result<(Message, usize), ProtocolError> {
    let header = decode_header(bytes)?;
    if header.version != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion(header.version));
    }

    let total = HEADER_SIZE + header.payload_length as usize;
    if bytes.len() < total {
        return Err(ProtocolError::InsufficientData {
            needed: total,
            available: bytes.len(),
        });
    }

    let payload = &bytes[HEADER_SIZE..total];
    let msg = decode_payload(header.message_type, payload)?;
    Ok((msg, total))
}

/// Decodes a payload whose type byte and bytes were already framed out of the
/// stream (the TCP read loop does its own header/payload reads).
///
/// # Errors
///
/// Returns [`ProtocolError::UnknownMessageType`] for unrecognized tags —
/// callers skip those frames for forward compatibility — and
/// [`ProtocolError::MalformedPayload`] for short or out-of-range payloads.
pub fn decode_payload(msg_type: u8, payload: &[u8]) -> Result<Message, ProtocolError> {
    let msg_type =
        MessageType::try_from(msg_type).map_err(|_| ProtocolError::UnknownMessageType(msg_type))?;

    match msg_type {
        MessageType::HandshakeReq => decode_handshake_req(payload).map(Message::HandshakeReq),
        MessageType::HandshakeAck => decode_handshake_ack(payload).map(Message::HandshakeAck),
        MessageType::HandshakeReject => Ok(Message::HandshakeReject(HandshakeReject {
            reason: String::from_utf8_lossy(payload).into_owned(),
        })),
        MessageType::Ping => Ok(Message::Ping),
        MessageType::Pong => Ok(Message::Pong),
        MessageType::Disconnect => Ok(Message::Disconnect),
        MessageType::MouseMove => decode_mouse_move(payload).map(Message::MouseMove),
        MessageType::MouseClick => decode_mouse_click(payload).map(Message::MouseClick),
        MessageType::MouseScroll => decode_mouse_scroll(payload).map(Message::MouseScroll),
        MessageType::MouseDrag => decode_mouse_drag(payload).map(Message::MouseDrag),
        MessageType::KeyEvent => decode_key_event(payload).map(Message::KeyEvent),
        MessageType::SystemAction => decode_system_action(payload).map(Message::SystemAction),
        MessageType::LaunchApp => decode_launch_app(payload).map(Message::LaunchApp),
        MessageType::GetSystemState => Ok(Message::GetSystemState),
        MessageType::SystemStateResponse => {
            decode_system_state(payload).map(Message::SystemStateResponse)
        }
        MessageType::Ack => {
            require_len(payload, 1, "Ack")?;
            Ok(Message::Ack {
                request_id: payload[0],
            })
        }
        MessageType::CommandError => {
            require_len(payload, 1, "CommandError")?;
            Ok(Message::CommandError {
                request_id: payload[0],
            })
        }
        MessageType::Error => Ok(Message::Error(String::from_utf8_lossy(payload).into_owned())),
    }
}

// ── Payload encoding ──────────────────────────────────────────────────────────

fn encode_payload(msg: &Message) -> Vec<u8> {
    let mut buf = Vec::new();
    match msg {
        Message::HandshakeReq(m) => encode_handshake_req(&mut buf, m),
        Message::HandshakeAck(m) => {
            buf.extend_from_slice(&m.server_version.to_be_bytes());
            buf.extend_from_slice(&m.flags.to_be_bytes());
            buf.extend_from_slice(&m.udp_port.to_be_bytes());
            buf.extend_from_slice(&m.keepalive_interval.to_be_bytes());
        }
        Message::HandshakeReject(m) => {
            buf.extend_from_slice(truncate_utf8(&m.reason, MAX_PAYLOAD_LENGTH).as_bytes());
        }
        // Empty payloads
        Message::Ping | Message::Pong | Message::Disconnect | Message::GetSystemState => {}
        Message::MouseMove(m) => {
            buf.extend_from_slice(&m.timestamp.to_be_bytes());
            buf.extend_from_slice(&m.dx.to_be_bytes());
            buf.extend_from_slice(&m.dy.to_be_bytes());
        }
        Message::MouseClick(m) => {
            buf.extend_from_slice(&m.timestamp.to_be_bytes());
            buf.push(m.button as u8);
            buf.push(m.action as u8);
        }
        Message::MouseScroll(m) => {
            buf.extend_from_slice(&m.timestamp.to_be_bytes());
            buf.extend_from_slice(&m.dx.to_be_bytes());
            buf.extend_from_slice(&m.dy.to_be_bytes());
        }
        Message::MouseDrag(m) => {
            buf.extend_from_slice(&m.timestamp.to_be_bytes());
            buf.push(m.button as u8);
            buf.extend_from_slice(&m.dx.to_be_bytes());
            buf.extend_from_slice(&m.dy.to_be_bytes());
        }
        Message::KeyEvent(m) => {
            buf.extend_from_slice(&m.timestamp.to_be_bytes());
            buf.push(m.action as u8);
            buf.extend_from_slice(&m.keycode.to_be_bytes());
            buf.push(m.modifiers.0);
        }
        Message::SystemAction(m) => {
            buf.extend_from_slice(&m.timestamp.to_be_bytes());
            buf.push(m.action as u8);
        }
        Message::LaunchApp(m) => {
            let name = truncate_utf8(&m.app_name, LAUNCH_NAME_MAX_LENGTH);
            buf.extend_from_slice(&m.timestamp.to_be_bytes());
            buf.push(name.len() as u8);
            buf.extend_from_slice(name.as_bytes());
        }
        Message::SystemStateResponse(m) => {
            let flags: u16 = (m.is_muted as u16) | ((m.is_locked as u16) << 1);
            buf.extend_from_slice(&m.brightness.to_be_bytes());
            buf.extend_from_slice(&m.volume.to_be_bytes());
            buf.extend_from_slice(&flags.to_be_bytes());
        }
        Message::Ack { request_id } => buf.push(*request_id),
        Message::CommandError { request_id } => buf.push(*request_id),
        Message::Error(text) => {
            buf.extend_from_slice(truncate_utf8(text, ERROR_TEXT_MAX_LENGTH).as_bytes());
        }
    }
    buf
}

fn encode_handshake_req(buf: &mut Vec<u8>, m: &HandshakeReq) {
    buf.extend_from_slice(&m.client_version.to_be_bytes());
    buf.extend_from_slice(&m.flags.to_be_bytes());

    // Name field is exactly CLIENT_NAME_LENGTH bytes: UTF-8, null-padded.
    let name = truncate_utf8(&m.client_name, CLIENT_NAME_LENGTH);
    buf.extend_from_slice(name.as_bytes());
    buf.resize(buf.len() + (CLIENT_NAME_LENGTH - name.len()), 0x00);
}

// ── Payload decoding ──────────────────────────────────────────────────────────

fn decode_handshake_req(p: &[u8]) -> Result<HandshakeReq, ProtocolError> {
    require_len(p, 4 + CLIENT_NAME_LENGTH, "HandshakeReq")?;
    let client_version = read_u16(p, 0);
    let flags = read_u16(p, 2);
    let name_raw = &p[4..4 + CLIENT_NAME_LENGTH];
    let name_end = name_raw
        .iter()
        .position(|&b| b == 0x00)
        .unwrap_or(CLIENT_NAME_LENGTH);
    let client_name = String::from_utf8_lossy(&name_raw[..name_end]).into_owned();
    Ok(HandshakeReq {
        client_version,
        flags,
        client_name,
    })
}

fn decode_handshake_ack(p: &[u8]) -> Result<HandshakeAck, ProtocolError> {
    require_len(p, 8, "HandshakeAck")?;
    Ok(HandshakeAck {
        server_version: read_u16(p, 0),
        flags: read_u16(p, 2),
        udp_port: read_u16(p, 4),
        keepalive_interval: read_u16(p, 6),
    })
}

fn decode_mouse_move(p: &[u8]) -> Result<MouseMove, ProtocolError> {
    require_len(p, 8, "MouseMove")?;
    Ok(MouseMove {
        timestamp: read_u32(p, 0),
        dx: read_i16(p, 4),
        dy: read_i16(p, 6),
    })
}

fn decode_mouse_click(p: &[u8]) -> Result<MouseClick, ProtocolError> {
    require_len(p, 6, "MouseClick")?;
    let button = MouseButton::try_from(p[4])
        .map_err(|_| ProtocolError::MalformedPayload(format!("unknown mouse button: {}", p[4])))?;
    let action = ClickAction::try_from(p[5])
        .map_err(|_| ProtocolError::MalformedPayload(format!("unknown click action: {}", p[5])))?;
    Ok(MouseClick {
        timestamp: read_u32(p, 0),
        button,
        action,
    })
}

fn decode_mouse_scroll(p: &[u8]) -> Result<MouseScroll, ProtocolError> {
    require_len(p, 8, "MouseScroll")?;
    Ok(MouseScroll {
        timestamp: read_u32(p, 0),
        dx: read_i16(p, 4),
        dy: read_i16(p, 6),
    })
}

fn decode_mouse_drag(p: &[u8]) -> Result<MouseDrag, ProtocolError> {
    require_len(p, 9, "MouseDrag")?;
    let button = MouseButton::try_from(p[4])
        .map_err(|_| ProtocolError::MalformedPayload(format!("unknown mouse button: {}", p[4])))?;
    Ok(MouseDrag {
        timestamp: read_u32(p, 0),
        button,
        dx: read_i16(p, 5),
        dy: read_i16(p, 7),
    })
}

fn decode_key_event(p: &[u8]) -> Result<KeyEvent, ProtocolError> {
    require_len(p, 8, "KeyEvent")?;
    let action = KeyAction::try_from(p[4])
        .map_err(|_| ProtocolError::MalformedPayload(format!("unknown key action: {}", p[4])))?;
    Ok(KeyEvent {
        timestamp: read_u32(p, 0),
        action,
        keycode: read_u16(p, 5),
        modifiers: ModifierFlags(p[7]),
    })
}

fn decode_system_action(p: &[u8]) -> Result<SystemAction, ProtocolError> {
    require_len(p, 5, "SystemAction")?;
    let action = SystemActionId::try_from(p[4]).map_err(|_| {
        ProtocolError::MalformedPayload(format!("unknown system action: {}", p[4]))
    })?;
    Ok(SystemAction {
        timestamp: read_u32(p, 0),
        action,
    })
}

fn decode_launch_app(p: &[u8]) -> Result<LaunchApp, ProtocolError> {
    require_len(p, 5, "LaunchApp")?;
    let name_len = p[4] as usize;
    require_len(p, 5 + name_len, "LaunchApp.name")?;
    let app_name = String::from_utf8_lossy(&p[5..5 + name_len]).into_owned();
    Ok(LaunchApp {
        timestamp: read_u32(p, 0),
        app_name,
    })
}

fn decode_system_state(p: &[u8]) -> Result<SystemState, ProtocolError> {
    require_len(p, 6, "SystemStateResponse")?;
    let flags = read_u16(p, 4);
    Ok(SystemState {
        brightness: read_u16(p, 0),
        volume: read_u16(p, 2),
        is_muted: flags & 0x01 != 0,
        is_locked: flags & 0x02 != 0,
    })
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn require_len(buf: &[u8], needed: usize, context: &str) -> Result<(), ProtocolError> {
    if buf.len() < needed {
        Err(ProtocolError::MalformedPayload(format!(
            "{context}: need {needed} bytes, got {}",
            buf.len()
        )))
    } else {
        Ok(())
    }
}

fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

fn read_i16(buf: &[u8], offset: usize) -> i16 {
    i16::from_be_bytes([buf[offset], buf[offset + 1]])
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

/// Truncates `s` to at most `max_bytes` UTF-8 bytes, backing off to the
/// nearest character boundary so the result stays valid UTF-8.
fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::*;

    fn round_trip(msg: &Message) -> Message {
        let encoded = encode_message(msg);
        let (decoded, consumed) = decode_message(&encoded).expect("decode failed");
        assert_eq!(consumed, encoded.len(), "consumed must equal encoded size");
        decoded
    }

    // ── Handshake ────────────────────────────────────────────────────────────

    #[test]
    fn test_handshake_req_round_trip() {
        let msg = Message::HandshakeReq(HandshakeReq {
            client_version: 1,
            flags: 0,
            client_name: "pixel-8".to_string(),
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_handshake_req_name_field_is_always_32_bytes() {
        for name in ["", "x", "exactly-thirty-two-bytes-name!!!"] {
            let bytes = encode_message(&Message::HandshakeReq(HandshakeReq {
                client_version: 1,
                flags: 0,
                client_name: name.to_string(),
            }));
            assert_eq!(bytes.len(), HEADER_SIZE + 4 + CLIENT_NAME_LENGTH);
        }
    }

    #[test]
    fn test_handshake_req_overlong_name_is_truncated_not_rejected() {
        let msg = Message::HandshakeReq(HandshakeReq {
            client_version: 1,
            flags: 0,
            client_name: "a".repeat(100),
        });
        let (decoded, _) = decode_message(&encode_message(&msg)).unwrap();
        match decoded {
            Message::HandshakeReq(req) => {
                assert_eq!(req.client_name, "a".repeat(CLIENT_NAME_LENGTH));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_handshake_ack_round_trip() {
        let msg = Message::HandshakeAck(HandshakeAck {
            server_version: 1,
            flags: 0,
            udp_port: 9801,
            keepalive_interval: 5,
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_handshake_reject_round_trip() {
        let msg = Message::HandshakeReject(HandshakeReject {
            reason: "another client is already connected".to_string(),
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_handshake_reject_reason_fills_whole_payload() {
        let bytes = encode_message(&Message::HandshakeReject(HandshakeReject {
            reason: "busy".to_string(),
        }));
        assert_eq!(u16::from_be_bytes([bytes[2], bytes[3]]), 4);
        assert_eq!(&bytes[HEADER_SIZE..], b"busy");
    }

    // ── Empty-payload control messages ───────────────────────────────────────

    #[test]
    fn test_ping_pong_disconnect_are_header_only() {
        for msg in [Message::Ping, Message::Pong, Message::Disconnect, Message::GetSystemState] {
            let bytes = encode_message(&msg);
            assert_eq!(bytes.len(), HEADER_SIZE);
            assert_eq!(round_trip(&msg), msg);
        }
    }

    // ── Mouse events ─────────────────────────────────────────────────────────

    #[test]
    fn test_mouse_move_round_trip() {
        let msg = Message::MouseMove(MouseMove {
            timestamp: 123_456,
            dx: 10,
            dy: -5,
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_mouse_move_boundary_deltas_round_trip() {
        for (dx, dy) in [(i16::MIN, i16::MAX), (i16::MAX, i16::MIN), (0, 0)] {
            let msg = Message::MouseMove(MouseMove {
                timestamp: u32::MAX,
                dx,
                dy,
            });
            assert_eq!(round_trip(&msg), msg);
        }
    }

    #[test]
    fn test_mouse_move_clamped_saturates() {
        let m = MouseMove::clamped(0, 100_000, -100_000);
        assert_eq!(m.dx, 32_767);
        assert_eq!(m.dy, -32_768);
        // And the saturated value is what goes on the wire.
        let bytes = encode_message(&Message::MouseMove(m));
        assert_eq!(read_i16(&bytes[HEADER_SIZE..], 4), 32_767);
        assert_eq!(read_i16(&bytes[HEADER_SIZE..], 6), -32_768);
    }

    #[test]
    fn test_mouse_click_round_trip() {
        let msg = Message::MouseClick(MouseClick {
            timestamp: 42,
            button: MouseButton::Right,
            action: ClickAction::Release,
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_mouse_scroll_round_trip() {
        let msg = Message::MouseScroll(MouseScroll {
            timestamp: 42,
            dx: -120,
            dy: 120,
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_mouse_drag_round_trip() {
        let msg = Message::MouseDrag(MouseDrag {
            timestamp: 42,
            button: MouseButton::Left,
            dx: 3,
            dy: -7,
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_mouse_click_unknown_button_is_malformed() {
        let mut bytes = encode_message(&Message::MouseClick(MouseClick {
            timestamp: 0,
            button: MouseButton::Left,
            action: ClickAction::Press,
        }));
        bytes[HEADER_SIZE + 4] = 9; // invalid button byte
        assert!(matches!(
            decode_message(&bytes),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    // ── Key events ───────────────────────────────────────────────────────────

    #[test]
    fn test_key_event_round_trip() {
        let msg = Message::KeyEvent(KeyEvent {
            timestamp: 1_700_000,
            action: KeyAction::KeyDown,
            keycode: 0x0041,
            modifiers: ModifierFlags(ModifierFlags::SHIFT | ModifierFlags::CONTROL),
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_key_event_all_modifiers_round_trip() {
        let msg = Message::KeyEvent(KeyEvent {
            timestamp: 0,
            action: KeyAction::KeyUp,
            keycode: u16::MAX,
            modifiers: ModifierFlags(0x1F),
        });
        assert_eq!(round_trip(&msg), msg);
    }

    // ── System action / launch ───────────────────────────────────────────────

    #[test]
    fn test_system_action_round_trip() {
        for action in [
            SystemActionId::LockScreen,
            SystemActionId::PowerDialog,
            SystemActionId::Sleep,
            SystemActionId::Shutdown,
            SystemActionId::Restart,
        ] {
            let msg = Message::SystemAction(SystemAction {
                timestamp: 9,
                action,
            });
            assert_eq!(round_trip(&msg), msg);
        }
    }

    #[test]
    fn test_launch_app_round_trip() {
        let msg = Message::LaunchApp(LaunchApp {
            timestamp: 77,
            app_name: "firefox".to_string(),
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_launch_app_name_truncated_to_128_bytes() {
        let bytes = encode_message(&Message::LaunchApp(LaunchApp {
            timestamp: 0,
            app_name: "x".repeat(200),
        }));
        // payload = timestamp(4) + name_len(1) + name(128)
        assert_eq!(bytes.len(), HEADER_SIZE + 4 + 1 + LAUNCH_NAME_MAX_LENGTH);
        assert_eq!(bytes[HEADER_SIZE + 4] as usize, LAUNCH_NAME_MAX_LENGTH);
    }

    #[test]
    fn test_launch_app_truncation_respects_char_boundary() {
        // '€' is 3 bytes in UTF-8, so the 128-byte cap falls mid-character
        // (128 % 3 == 2) and truncation must back off to 126 bytes.
        let name = "€".repeat(50);
        let bytes = encode_message(&Message::LaunchApp(LaunchApp {
            timestamp: 0,
            app_name: name,
        }));
        let name_len = bytes[HEADER_SIZE + 4] as usize;
        assert_eq!(name_len, 126);
        let decoded = decode_message(&bytes).unwrap().0;
        match decoded {
            Message::LaunchApp(l) => assert_eq!(l.app_name, "€".repeat(42)),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    // ── System state / acks ──────────────────────────────────────────────────

    #[test]
    fn test_system_state_response_round_trip() {
        let msg = Message::SystemStateResponse(SystemState {
            brightness: 80,
            volume: 45,
            is_muted: true,
            is_locked: false,
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_system_state_flags_bits() {
        let bytes = encode_message(&Message::SystemStateResponse(SystemState {
            brightness: 0,
            volume: 0,
            is_muted: true,
            is_locked: true,
        }));
        assert_eq!(read_u16(&bytes[HEADER_SIZE..], 4), 0x03);
    }

    #[test]
    fn test_ack_and_command_error_round_trip() {
        assert_eq!(
            round_trip(&Message::Ack { request_id: 7 }),
            Message::Ack { request_id: 7 }
        );
        assert_eq!(
            round_trip(&Message::CommandError { request_id: 255 }),
            Message::CommandError { request_id: 255 }
        );
    }

    #[test]
    fn test_error_message_round_trip() {
        let msg = Message::Error("unexpected message type: 0x7E".to_string());
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_error_text_capped_at_256_bytes() {
        let bytes = encode_message(&Message::Error("e".repeat(1000)));
        assert_eq!(bytes.len(), HEADER_SIZE + ERROR_TEXT_MAX_LENGTH);
    }

    // ── Header invariants ────────────────────────────────────────────────────

    #[test]
    fn test_header_first_byte_is_protocol_version() {
        for msg in [
            Message::Ping,
            Message::MouseMove(MouseMove {
                timestamp: 0,
                dx: 0,
                dy: 0,
            }),
            Message::LaunchApp(LaunchApp {
                timestamp: 0,
                app_name: "a".to_string(),
            }),
        ] {
            let bytes = encode_message(&msg);
            assert_eq!(bytes[0], PROTOCOL_VERSION);
            assert_eq!(bytes[1], msg.message_type() as u8);
        }
    }

    #[test]
    fn test_encoded_length_is_header_plus_payload_length() {
        let bytes = encode_message(&Message::KeyEvent(KeyEvent {
            timestamp: 1,
            action: KeyAction::KeyDown,
            keycode: 30,
            modifiers: ModifierFlags::default(),
        }));
        let declared = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
        assert_eq!(bytes.len(), HEADER_SIZE + declared);
    }

    // ── Error conditions ─────────────────────────────────────────────────────

    #[test]
    fn test_decode_empty_bytes_returns_insufficient_data() {
        assert!(matches!(
            decode_message(&[]),
            Err(ProtocolError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_decode_truncated_header_returns_insufficient_data() {
        assert!(matches!(
            decode_message(&[PROTOCOL_VERSION, 0x10]),
            Err(ProtocolError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_decode_wrong_version_returns_error() {
        let bytes = [0x99, MessageType::Ping as u8, 0x00, 0x00];
        assert!(matches!(
            decode_message(&bytes),
            Err(ProtocolError::UnsupportedVersion(0x99))
        ));
    }

    #[test]
    fn test_decode_unknown_message_type_returns_error() {
        let bytes = [PROTOCOL_VERSION, 0x7E, 0x00, 0x00];
        assert!(matches!(
            decode_message(&bytes),
            Err(ProtocolError::UnknownMessageType(0x7E))
        ));
    }

    #[test]
    fn test_decode_declared_payload_exceeding_available_returns_error() {
        // Declare 8 bytes of payload but provide none.
        let bytes = [PROTOCOL_VERSION, MessageType::MouseMove as u8, 0x00, 0x08];
        assert!(matches!(
            decode_message(&bytes),
            Err(ProtocolError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_decode_oversized_length_field_is_rejected() {
        let mut bytes = vec![PROTOCOL_VERSION, MessageType::Error as u8];
        bytes.extend_from_slice(&1024u16.to_be_bytes());
        assert!(matches!(
            decode_header(&bytes),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_decode_short_system_state_payload_is_malformed() {
        let mut bytes = vec![PROTOCOL_VERSION, MessageType::SystemStateResponse as u8];
        bytes.extend_from_slice(&4u16.to_be_bytes());
        bytes.extend_from_slice(&[0, 80, 0, 45]); // brightness + volume, flags missing
        assert!(matches!(
            decode_message(&bytes),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_decode_max_length_payload_is_accepted() {
        let mut bytes = vec![PROTOCOL_VERSION, MessageType::Error as u8];
        bytes.extend_from_slice(&(MAX_PAYLOAD_LENGTH as u16).to_be_bytes());
        bytes.extend(std::iter::repeat(b'x').take(MAX_PAYLOAD_LENGTH));
        let (msg, consumed) = decode_message(&bytes).unwrap();
        assert_eq!(consumed, HEADER_SIZE + MAX_PAYLOAD_LENGTH);
        assert_eq!(msg, Message::Error("x".repeat(MAX_PAYLOAD_LENGTH)));
    }
}

//! # iobus-core
//!
//! Shared library for iobus containing the wire protocol message types and the
//! binary codec. It has zero dependencies on OS APIs, UI frameworks, or
//! network sockets.
//!
//! # Architecture overview
//!
//! iobus turns a handheld device into a remote keyboard, trackpad, and system
//! controller for a host machine on the same LAN. The client maintains one
//! logical connection made of two transports:
//!
//! - A reliable **TCP control plane** carrying the handshake, PING/PONG
//!   keepalive, system-state queries, and launch acknowledgements.
//! - A lossy **UDP data plane** carrying high-frequency input events (mouse
//!   motion, clicks, key events).
//!
//! This crate defines what travels over both: every message is a 4-byte
//! header (`version:u8, type:u8, payload_len:u16be`) followed by a fixed
//! binary payload. The [`protocol::codec`] module maps typed Rust values to
//! those exact bytes and back.

pub mod protocol;

// Re-export the most-used items at the crate root so callers can write
// `iobus_core::encode_message` instead of the full module path.
pub use protocol::codec::{decode_message, decode_payload, encode_message, ProtocolError};
pub use protocol::messages::{Header, Message, MessageType};

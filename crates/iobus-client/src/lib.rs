//! iobus-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/` and
//! the binary entry point in `main.rs` share the same module tree.
//!
//! The client turns a handheld device into a remote keyboard and trackpad for
//! a host machine on the same LAN. It maintains one logical connection made
//! of two transports:
//!
//! 1. A TCP control channel (handshake, keepalive, system-state queries,
//!    launch acknowledgements) — see
//!    [`infrastructure::network::ControlChannel`].
//! 2. A UDP input path for high-frequency mouse and key events — see
//!    [`infrastructure::network::InputSender`].
//!
//! The [`application::SessionManager`] owns both and presents a single
//! connect/disconnect surface to the UI layer, publishing state changes
//! through `watch` channels.

/// Application layer: session orchestration and typed send operations.
pub mod application;

/// Infrastructure layer: network transports and config storage.
pub mod infrastructure;

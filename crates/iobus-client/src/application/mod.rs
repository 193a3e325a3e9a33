//! Application layer for the iobus client.

pub mod session;

pub use session::{SessionError, SessionManager, SessionStatus};

//! Protocol module containing message types and the binary codec.

pub mod codec;
pub mod messages;

pub use codec::{decode_message, decode_payload, encode_message, ProtocolError};
pub use messages::*;

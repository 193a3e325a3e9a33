//! Infrastructure layer: network transports and configuration storage.

pub mod network;
pub mod storage;

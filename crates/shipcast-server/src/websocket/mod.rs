//! WebSocket connection state and session lifecycle.

pub mod connection;
pub mod session;

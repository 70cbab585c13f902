//! Parley chat server library.
//!
//! Exposes the server for use in tests and embedding. The server serves the
//! message history over HTTP, accepts WebSocket connections, and broadcasts
//! every accepted message to all connected clients.

pub mod config;
pub mod server;
pub mod store;

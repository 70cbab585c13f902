//! Parley: realtime chat session core.
//!
//! Seeds a message view from the server's history, keeps a live channel open
//! with fixed-delay reconnection, and exposes the merged sequence, the
//! connection state and the last error to a presentation layer.

pub mod channel;
pub mod config;
pub mod display;
pub mod history;
pub mod session;

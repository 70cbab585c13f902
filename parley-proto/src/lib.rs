//! Shared protocol definitions for the Parley wire format.

pub mod codec;
pub mod message;
pub mod timestamp;

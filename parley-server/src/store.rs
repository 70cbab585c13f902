//! In-memory message history for the chat server.
//!
//! The [`HistoryStore`] keeps accepted messages in arrival order, capped at a
//! configurable size. The history endpoint reads the newest entries back in
//! newest-first order.

use std::collections::VecDeque;

use parley_proto::message::Message;
use tokio::sync::RwLock;

/// Default maximum number of stored messages before FIFO eviction.
const DEFAULT_MAX_STORED: usize = 1000;

/// In-memory message log with FIFO eviction.
///
/// Thread-safe via [`RwLock`]. When the cap is exceeded the oldest message
/// is dropped.
pub struct HistoryStore {
    messages: RwLock<VecDeque<Message>>,
    max_stored: usize,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryStore {
    /// Creates a new, empty store with the default size limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_stored(DEFAULT_MAX_STORED)
    }

    /// Creates a new, empty store with a custom size limit.
    #[must_use]
    pub fn with_max_stored(max_stored: usize) -> Self {
        Self {
            messages: RwLock::new(VecDeque::new()),
            max_stored,
        }
    }

    /// Appends a message, returning the number of stored messages.
    pub async fn append(&self, msg: Message) -> usize {
        let mut messages = self.messages.write().await;
        messages.push_back(msg);
        if messages.len() > self.max_stored {
            messages.pop_front();
        }
        messages.len()
    }

    /// Returns up to `limit` of the newest messages, newest-first.
    pub async fn newest_first(&self, limit: usize) -> Vec<Message> {
        let messages = self.messages.read().await;
        messages.iter().rev().take(limit).cloned().collect()
    }

    /// Returns the number of stored messages.
    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    /// Returns `true` when nothing has been stored yet.
    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }
}

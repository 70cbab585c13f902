//! One-shot retrieval of prior messages.
//!
//! The server lists its history newest-first; everything returned from here
//! is oldest-first, ready to seed a session.

use std::time::Duration;

use parley_proto::codec::{self, CodecError};
use parley_proto::message::Message;
use url::Url;

use crate::session::{ErrorKind, ErrorSignal};

/// Default timeout for the history request.
pub const DEFAULT_HISTORY_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur while fetching history.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// The request could not be sent or the body could not be read.
    #[error("history request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("history endpoint returned status {0}")]
    Status(u16),

    /// The body was not a usable history listing.
    #[error("invalid history body: {0}")]
    Body(#[from] CodecError),
}

/// A source of prior messages, fetched once when a session starts.
pub trait HistorySource: Send + Sync + 'static {
    /// Fetch the history, oldest-first.
    fn fetch(&self) -> impl std::future::Future<Output = Result<Vec<Message>, HistoryError>> + Send;
}

/// Fetches history from the server's HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HistoryLoader {
    client: reqwest::Client,
    url: Url,
}

impl HistoryLoader {
    /// Create a loader for the given history URL.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Request`] if the HTTP client cannot be built.
    pub fn new(url: Url, timeout: Duration) -> Result<Self, HistoryError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }

    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }
}

impl HistorySource for HistoryLoader {
    async fn fetch(&self) -> Result<Vec<Message>, HistoryError> {
        let response = self.client.get(self.url.clone()).send().await.map_err(|e| {
            tracing::warn!(url = %self.url, err = %e, "history request failed");
            HistoryError::Request(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url = %self.url, status = status.as_u16(), "history request rejected");
            return Err(HistoryError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        let messages = codec::decode_history(&body).map_err(|e| {
            tracing::warn!(url = %self.url, err = %e, "history body unusable");
            HistoryError::Body(e)
        })?;
        tracing::info!(url = %self.url, count = messages.len(), "history loaded");
        Ok(messages)
    }
}

/// A fixed history, already ordered oldest-first.
#[derive(Debug, Clone, Default)]
pub struct StaticHistory(pub Vec<Message>);

impl HistorySource for StaticHistory {
    async fn fetch(&self) -> Result<Vec<Message>, HistoryError> {
        Ok(self.0.clone())
    }
}

/// Outcome of loading history: the seed batch plus any failure to report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryBatch {
    pub messages: Vec<Message>,
    pub error: Option<ErrorSignal>,
}

/// Fetch history and fold any failure into a [`HistoryBatch`].
///
/// Never fails: on error the batch is empty and carries a
/// [`ErrorKind::HistoryLoadFailed`] signal.
pub async fn load_history<H: HistorySource>(source: &H) -> HistoryBatch {
    match source.fetch().await {
        Ok(messages) => HistoryBatch {
            messages,
            error: None,
        },
        Err(e) => HistoryBatch {
            messages: Vec::new(),
            error: Some(ErrorSignal::new(ErrorKind::HistoryLoadFailed, e.to_string())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use parley_server::server::ServerState;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn msg(content: &str, secs: i64) -> Message {
        Message::new("A", content, Utc.timestamp_opt(secs, 0).single().unwrap())
    }

    /// Serve one canned HTTP response and return the URL to fetch it from.
    async fn canned_response(status: &'static str, body: &'static str) -> Url {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        });
        Url::parse(&format!("http://{addr}/messages")).unwrap()
    }

    #[tokio::test]
    async fn loads_server_history_oldest_first() {
        let state = Arc::new(ServerState::new());
        state.store.append(msg("1", 1)).await;
        state.store.append(msg("2", 2)).await;
        let (addr, _handle) =
            parley_server::server::start_server_with_state("127.0.0.1:0", Arc::clone(&state))
                .await
                .unwrap();

        let url = Url::parse(&format!("http://{addr}/messages")).unwrap();
        let loader = HistoryLoader::new(url, DEFAULT_HISTORY_TIMEOUT).unwrap();
        let batch = load_history(&loader).await;

        assert!(batch.error.is_none());
        let contents: Vec<_> = batch.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["1", "2"]);
    }

    #[tokio::test]
    async fn wire_order_is_reversed() {
        let url = canned_response(
            "200 OK",
            r#"{"messages":[{"userName":"A","content":"2","timestamp":"2024-01-01T00:00:02Z"},{"userName":"A","content":"1","timestamp":"2024-01-01T00:00:01Z"}]}"#,
        )
        .await;
        let loader = HistoryLoader::new(url, DEFAULT_HISTORY_TIMEOUT).unwrap();
        let messages = loader.fetch().await.unwrap();

        assert_eq!(messages[0].content, "1");
        assert_eq!(messages[1].content, "2");
        assert!(messages[0].timestamp < messages[1].timestamp);
    }

    #[tokio::test]
    async fn server_error_body_fails_load() {
        let url = canned_response("200 OK", r#"{"error":"database is locked"}"#).await;
        let loader = HistoryLoader::new(url, DEFAULT_HISTORY_TIMEOUT).unwrap();
        let batch = load_history(&loader).await;

        assert!(batch.messages.is_empty());
        let err = batch.error.unwrap();
        assert_eq!(err.kind, ErrorKind::HistoryLoadFailed);
        assert!(err.message.contains("database is locked"));
    }

    #[tokio::test]
    async fn non_success_status_fails_load() {
        let url = canned_response("500 Internal Server Error", "{}").await;
        let loader = HistoryLoader::new(url, DEFAULT_HISTORY_TIMEOUT).unwrap();
        assert!(matches!(loader.fetch().await, Err(HistoryError::Status(500))));
    }

    #[tokio::test]
    async fn malformed_entry_fails_whole_load() {
        let url = canned_response(
            "200 OK",
            r#"{"messages":[{"userName":"","content":"x","timestamp":"2024-01-01T00:00:00Z"}]}"#,
        )
        .await;
        let loader = HistoryLoader::new(url, DEFAULT_HISTORY_TIMEOUT).unwrap();
        assert!(matches!(loader.fetch().await, Err(HistoryError::Body(_))));
    }

    #[tokio::test]
    async fn unreachable_server_yields_empty_batch() {
        let url = Url::parse("http://127.0.0.1:1/messages").unwrap();
        let loader = HistoryLoader::new(url, Duration::from_secs(2)).unwrap();
        let batch = load_history(&loader).await;

        assert!(batch.messages.is_empty());
        assert_eq!(
            batch.error.map(|e| e.kind),
            Some(ErrorKind::HistoryLoadFailed)
        );
    }

    #[tokio::test]
    async fn static_history_is_returned_as_is() {
        let source = StaticHistory(vec![msg("a", 1), msg("b", 2)]);
        let batch = load_history(&source).await;
        assert_eq!(batch.messages, source.0);
        assert!(batch.error.is_none());
    }
}

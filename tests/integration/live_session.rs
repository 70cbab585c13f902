// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::future_not_send,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

//! End-to-end session tests against an in-process `parley-server`.
//!
//! Each test starts a server on an ephemeral port and drives one or more
//! `ChatSession`s through the real HTTP history loader and WebSocket
//! connector.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use parley::channel::websocket::WebSocketConnector;
use parley::config::ClientConfig;
use parley::history::HistoryLoader;
use parley::session::{
    ChatSession, ConnectionState, ErrorKind, SessionEvent, SubmitError, Submitted,
};
use parley_proto::message::Message;
use parley_server::server::{ServerState, start_server_with_state};

const WAIT: Duration = Duration::from_secs(5);

async fn start_server(state: Arc<ServerState>) -> SocketAddr {
    let (addr, _handle) = start_server_with_state("127.0.0.1:0", state)
        .await
        .expect("failed to start test server");
    addr
}

fn session_for(server_url: String) -> ChatSession {
    let config = ClientConfig {
        server_url,
        reconnect_delay: Duration::from_millis(200),
        connect_timeout: Duration::from_secs(2),
        history_timeout: Duration::from_secs(2),
        ..Default::default()
    };
    let history = HistoryLoader::new(config.history_url().unwrap(), config.history_timeout).unwrap();
    let connector = WebSocketConnector::new(config.channel_url().unwrap(), config.connect_timeout);
    ChatSession::start(history, connector, config.session_config())
}

/// Poll `check` until it holds or the deadline passes.
async fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn wait_for_connections(state: &ServerState, n: usize) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while state.connection_count().await != n {
        assert!(
            tokio::time::Instant::now() < deadline,
            "server never reached {n} connections"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn contents(session: &ChatSession) -> Vec<String> {
    session.messages().into_iter().map(|m| m.content).collect()
}

#[tokio::test]
async fn history_seeds_oldest_first() {
    let state = Arc::new(ServerState::new());
    for (secs, content) in (1_700_000_000..).zip(["first", "second", "third"]) {
        let ts = Utc.timestamp_opt(secs, 0).single().unwrap();
        state.store.append(Message::new("A", content, ts)).await;
    }
    let addr = start_server(Arc::clone(&state)).await;

    let session = session_for(format!("http://{addr}"));
    wait_until("connected", || session.state() == ConnectionState::Connected).await;

    assert_eq!(contents(&session), ["first", "second", "third"]);
    assert!(session.last_error().is_none());
    session.shutdown().await;
}

#[tokio::test]
async fn submitted_message_appears_only_after_echo() {
    let state = Arc::new(ServerState::new());
    let addr = start_server(Arc::clone(&state)).await;
    let session = session_for(format!("http://{addr}"));
    wait_until("connected", || session.state() == ConnectionState::Connected).await;

    assert_eq!(session.submit("alice", "hello").unwrap(), Submitted::Sent);
    assert!(session.messages().is_empty(), "no optimistic local append");

    wait_until("echo", || session.messages().len() == 1).await;
    let echoed = &session.messages()[0];
    assert_eq!(echoed.user_name, "alice");
    assert_eq!(echoed.content, "hello");
    assert_eq!(state.store.len().await, 1);
    session.shutdown().await;
}

#[tokio::test]
async fn two_sessions_see_each_others_messages() {
    let state = Arc::new(ServerState::new());
    let addr = start_server(Arc::clone(&state)).await;
    let alice = session_for(format!("http://{addr}"));
    let bob = session_for(format!("http://{addr}"));
    wait_until("both connected", || {
        alice.state() == ConnectionState::Connected && bob.state() == ConnectionState::Connected
    })
    .await;
    wait_for_connections(&state, 2).await;

    alice.submit("alice", "hi bob").unwrap();
    wait_until("bob receives", || bob.messages().len() == 1).await;
    bob.submit("bob", "hi alice").unwrap();
    wait_until("alice receives both", || alice.messages().len() == 2).await;
    wait_until("bob receives both", || bob.messages().len() == 2).await;

    assert_eq!(contents(&alice), ["hi bob", "hi alice"]);
    assert_eq!(contents(&bob), ["hi bob", "hi alice"]);
    alice.shutdown().await;
    bob.shutdown().await;
}

#[tokio::test]
async fn server_close_triggers_reconnect_without_reseeding() {
    let state = Arc::new(ServerState::new());
    let addr = start_server(Arc::clone(&state)).await;
    let session = session_for(format!("http://{addr}"));
    let mut sub = session.subscribe();
    wait_until("connected", || session.state() == ConnectionState::Connected).await;
    wait_for_connections(&state, 1).await;

    session.submit("alice", "before").unwrap();
    wait_until("echo", || session.messages().len() == 1).await;

    state.close_all_connections().await;

    let mut saw_disconnect = false;
    let reconnected = tokio::time::timeout(WAIT, async {
        while let Some(event) = sub.recv().await {
            match event {
                SessionEvent::StateChanged(ConnectionState::Disconnected) => {
                    saw_disconnect = true;
                }
                SessionEvent::StateChanged(ConnectionState::Connected)
                    if saw_disconnect =>
                {
                    return true;
                }
                _ => {}
            }
        }
        false
    })
    .await
    .expect("never reconnected");
    assert!(reconnected);

    // History is fetched once per session; the reconnect only reopens the channel.
    assert_eq!(contents(&session), ["before"]);

    wait_for_connections(&state, 1).await;
    session.submit("alice", "after").unwrap();
    wait_until("second echo", || session.messages().len() == 2).await;
    assert_eq!(contents(&session), ["before", "after"]);
    session.shutdown().await;
}

#[tokio::test]
async fn rejected_submits_never_reach_the_server() {
    let state = Arc::new(ServerState::new());
    let addr = start_server(Arc::clone(&state)).await;
    let session = session_for(format!("http://{addr}"));
    wait_until("connected", || session.state() == ConnectionState::Connected).await;

    assert!(matches!(
        session.submit("  ", "hello"),
        Err(SubmitError::ValidationFailed)
    ));
    assert_eq!(session.submit("alice", "").unwrap(), Submitted::Ignored);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(state.store.is_empty().await);
    assert!(session.messages().is_empty());
    assert_eq!(
        session.last_error().map(|e| e.kind),
        Some(ErrorKind::ValidationFailed)
    );
    session.shutdown().await;
}

#[tokio::test]
async fn unreachable_server_keeps_retrying() {
    let session = session_for("http://127.0.0.1:1".to_string());

    wait_until("channel error", || {
        session.last_error().map(|e| e.kind) == Some(ErrorKind::ChannelError)
    })
    .await;
    assert!(session.messages().is_empty());
    assert_ne!(session.state(), ConnectionState::Connected);
    assert!(matches!(
        session.submit("alice", "hello"),
        Err(SubmitError::NotConnected)
    ));
    session.shutdown().await;
}

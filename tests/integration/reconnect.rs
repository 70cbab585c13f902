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

//! Reconnect timing tests.
//!
//! Sessions run against a loopback connector with Tokio's clock paused, so
//! the fixed reconnect delay can be checked exactly and the number of open
//! attempts counted.

use std::time::Duration;

use parley::channel::ChannelError;
use parley::channel::loopback::{LoopbackConnector, LoopbackServer};
use parley::history::StaticHistory;
use parley::session::{
    ChatSession, ConnectionState, ErrorKind, SessionConfig, SessionEvent, SubmitError, Subscription,
};
use tokio::time::Instant;

const DELAY: Duration = Duration::from_secs(5);

fn start() -> (ChatSession, LoopbackServer, Subscription) {
    let (connector, server) = LoopbackConnector::create();
    let session = ChatSession::start(
        StaticHistory::default(),
        connector,
        SessionConfig {
            reconnect_delay: DELAY,
        },
    );
    let sub = session.subscribe();
    (session, server, sub)
}

async fn wait_for_state(sub: &mut Subscription, want: ConnectionState) {
    while let Some(event) = sub.recv().await {
        if event == SessionEvent::StateChanged(want) {
            return;
        }
    }
    panic!("subscription ended before {want}");
}

/// Let every ready task run without advancing the clock.
async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

fn assert_exact_delay(since: Instant) {
    let elapsed = since.elapsed();
    assert!(
        elapsed >= DELAY && elapsed < DELAY + Duration::from_millis(10),
        "reconnect after {elapsed:?}, expected {DELAY:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn each_closure_schedules_one_attempt_after_the_delay() {
    let (_session, mut server, mut sub) = start();

    let mut peer = server.next_attempt().await.unwrap().accept();
    wait_for_state(&mut sub, ConnectionState::Connected).await;

    for round in 2..=4 {
        peer.close().await;
        wait_for_state(&mut sub, ConnectionState::Disconnected).await;
        let closed_at = Instant::now();

        let attempt = server.next_attempt().await.unwrap();
        assert_exact_delay(closed_at);
        assert_eq!(server.attempts(), round);

        peer = attempt.accept();
        wait_for_state(&mut sub, ConnectionState::Connected).await;
    }
}

#[tokio::test(start_paused = true)]
async fn failed_opens_retry_forever_without_backoff() {
    let (session, mut server, _sub) = start();
    let mut failed_at = None;

    for round in 1..=6 {
        let attempt = server.next_attempt().await.unwrap();
        if let Some(since) = failed_at {
            assert_exact_delay(since);
        }
        assert_eq!(server.attempts(), round);

        failed_at = Some(Instant::now());
        attempt.reject(ChannelError::Unreachable("loopback".to_string()));
        settle().await;

        assert_eq!(
            session.last_error().map(|e| e.kind),
            Some(ErrorKind::ChannelError)
        );
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }
}

#[tokio::test(start_paused = true)]
async fn never_more_than_one_attempt_pending() {
    let (_session, mut server, mut sub) = start();

    let peer = server.next_attempt().await.unwrap().accept();
    wait_for_state(&mut sub, ConnectionState::Connected).await;
    peer.close().await;
    wait_for_state(&mut sub, ConnectionState::Disconnected).await;

    tokio::time::sleep(DELAY - Duration::from_millis(1)).await;
    settle().await;
    assert!(server.try_next_attempt().is_none(), "reconnected early");
    assert_eq!(server.attempts(), 1);

    let pending = server.next_attempt().await.unwrap();
    assert_eq!(server.attempts(), 2);

    // An unanswered attempt blocks further ones, however long it takes.
    tokio::time::sleep(DELAY * 10).await;
    settle().await;
    assert!(server.try_next_attempt().is_none());
    assert_eq!(server.attempts(), 2);
    drop(pending);
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_pending_reconnect() {
    let (session, mut server, mut sub) = start();

    let peer = server.next_attempt().await.unwrap().accept();
    wait_for_state(&mut sub, ConnectionState::Connected).await;
    peer.close().await;
    wait_for_state(&mut sub, ConnectionState::Disconnected).await;

    session.shutdown().await;
    tokio::time::sleep(DELAY * 3).await;

    assert_eq!(server.attempts(), 1);
    assert!(server.next_attempt().await.is_none(), "connector still alive");
}

#[tokio::test(start_paused = true)]
async fn dropping_the_session_cancels_pending_reconnect() {
    let (session, mut server, mut sub) = start();

    let attempt = server.next_attempt().await.unwrap();
    attempt.reject(ChannelError::Timeout);
    wait_for_state(&mut sub, ConnectionState::Disconnected).await;

    drop(session);
    tokio::time::sleep(DELAY * 3).await;

    assert_eq!(server.attempts(), 1);
    assert!(server.next_attempt().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn submit_while_connecting_writes_nothing() {
    let (session, mut server, mut sub) = start();

    let attempt = server.next_attempt().await.unwrap();
    assert_eq!(session.state(), ConnectionState::Connecting);
    assert!(matches!(
        session.submit("alice", "too early"),
        Err(SubmitError::NotConnected)
    ));

    let mut peer = attempt.accept();
    wait_for_state(&mut sub, ConnectionState::Connected).await;
    settle().await;
    assert!(peer.try_recv_frame().is_none());
    assert!(session.last_error().is_none(), "connect clears the error");
}

#[tokio::test(start_paused = true)]
async fn submit_while_disconnected_writes_nothing() {
    let (session, mut server, mut sub) = start();

    let mut peer = server.next_attempt().await.unwrap().accept();
    wait_for_state(&mut sub, ConnectionState::Connected).await;
    peer.send_event(parley::channel::ChannelEvent::Closed).await;
    wait_for_state(&mut sub, ConnectionState::Disconnected).await;

    assert!(matches!(
        session.submit("alice", "into the void"),
        Err(SubmitError::NotConnected)
    ));
    assert_eq!(peer.recv_frame().await, None);
}

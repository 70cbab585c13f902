//! Parley: line-oriented terminal chat client.
//!
//! Prints the server's history, then every live message and connection
//! change as it happens. Each line typed on stdin is sent as a message.
//! Configuration via CLI flags, environment variables, or config file
//! (`~/.config/parley/config.toml`).
//!
//! ```bash
//! # Connect to a local server as alice
//! cargo run --bin parley -- --user-name alice
//!
//! # Or via environment variables
//! PARLEY_SERVER=http://127.0.0.1:8000 PARLEY_USER=alice cargo run --bin parley
//! ```
//!
//! Commands: `/name NEW` changes the user name, `/quit` (or EOF) exits.

use std::io;
use std::path::Path;
use std::process::ExitCode;

use chrono::Utc;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_appender::non_blocking::WorkerGuard;

use parley::channel::websocket::WebSocketConnector;
use parley::config::{CliArgs, ClientConfig};
use parley::display::{format_error, format_message, format_state};
use parley::history::HistoryLoader;
use parley::session::{ChatSession, SessionEvent, SessionSnapshot};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };

    // Logs go to a file; stdout belongs to the chat.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    tracing::info!(server = %config.server_url, "parley starting");

    let (history_url, channel_url) = match (config.history_url(), config.channel_url()) {
        (Ok(h), Ok(c)) => (h, c),
        (Err(e), _) | (_, Err(e)) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let history = match HistoryLoader::new(history_url, config.history_timeout) {
        Ok(h) => h,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let connector = WebSocketConnector::new(channel_url, config.connect_timeout);

    let session = ChatSession::start(history, connector, config.session_config());
    let result = run_chat(&session, config.user_name.clone()).await;
    session.shutdown().await;

    tracing::info!("parley exiting");
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("parley.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Interleave stdin lines and session events until `/quit` or EOF.
async fn run_chat(session: &ChatSession, mut user_name: String) -> io::Result<()> {
    let mut subscription = session.subscribe();
    print_snapshot(&subscription.snapshot);
    if user_name.trim().is_empty() {
        println!("(set a user name with /name NAME)");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim_end();
                if line == "/quit" {
                    break;
                }
                if let Some(name) = line.strip_prefix("/name ") {
                    name.trim().clone_into(&mut user_name);
                    println!("(user name is now {user_name})");
                    continue;
                }
                // Rejections also arrive as an error event.
                if let Err(e) = session.submit(&user_name, line) {
                    tracing::debug!(err = %e, "submit rejected");
                }
            }
            event = subscription.recv() => {
                let Some(event) = event else { break };
                print_event(&event);
            }
        }
    }
    Ok(())
}

fn print_snapshot(snapshot: &SessionSnapshot) {
    let now = Utc::now();
    for msg in &snapshot.messages {
        println!("{}", format_message(msg, now));
    }
    println!("{}", format_state(snapshot.state));
    if let Some(err) = &snapshot.last_error {
        println!("{}", format_error(err));
    }
}

fn print_event(event: &SessionEvent) {
    let now = Utc::now();
    match event {
        SessionEvent::Seeded(messages) => {
            for msg in messages {
                println!("{}", format_message(msg, now));
            }
        }
        SessionEvent::MessageAppended(msg) => println!("{}", format_message(msg, now)),
        SessionEvent::StateChanged(state) => println!("{}", format_state(*state)),
        SessionEvent::ErrorChanged(Some(err)) => println!("{}", format_error(err)),
        SessionEvent::ErrorChanged(None) => {}
    }
}

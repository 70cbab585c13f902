//! `parley-server`: serves `GET /messages` and relays `/ws` chat frames.
//!
//! ```bash
//! parley-server --bind 127.0.0.1:8080 --history-limit 100
//! PARLEY_ADDR=127.0.0.1:8080 parley-server
//! ```

use std::process::ExitCode;

use clap::Parser;
use parley_server::config::{ServerCliArgs, ServerConfig};
use parley_server::server;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match ServerConfig::load(&ServerCliArgs::parse()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("parley-server: {e}");
            return ExitCode::from(2);
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let started = server::start_server_with_state(config.bind_addr, config.build_state()).await;
    let (addr, serving) = match started {
        Ok(started) => started,
        Err(e) => {
            tracing::error!(addr = %config.bind_addr, error = %e, "cannot listen");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(
        %addr,
        history_limit = config.history_limit,
        max_stored = config.max_stored,
        "parley server listening"
    );

    match serving.await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "server task failed");
            ExitCode::FAILURE
        }
    }
}

//! Server settings.
//!
//! Each setting is taken from the first layer that provides it: command line
//! (or its environment variable), then `~/.config/parley-server/config.toml`,
//! then the built-in default. The merged result is checked before the server
//! starts, so a bad bind address or an impossible history window is reported
//! up front instead of at the first request.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::server::ServerState;
use crate::store::HistoryStore;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_HISTORY_LIMIT: usize = 50;
const DEFAULT_MAX_STORED: usize = 1000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    #[error("bind address {addr:?} is not host:port: {source}")]
    BindAddr {
        addr: String,
        source: std::net::AddrParseError,
    },

    /// The history endpoint would promise more messages than are kept.
    #[error("history limit {limit} exceeds the {max_stored} stored messages")]
    HistoryWindow { limit: usize, max_stored: usize },

    #[error("max_stored must be at least 1")]
    EmptyStore,
}

/// Command line for `parley-server`.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Parley chat server")]
pub struct ServerCliArgs {
    /// Listen address, host:port.
    #[arg(short, long, env = "PARLEY_ADDR")]
    pub bind: Option<String>,

    /// Settings file to use instead of `~/.config/parley-server/config.toml`.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// How many of the newest messages `GET /messages` returns.
    #[arg(long, env = "PARLEY_HISTORY_LIMIT")]
    pub history_limit: Option<usize>,

    /// Messages kept in memory; the oldest are evicted past this.
    #[arg(long)]
    pub max_stored: Option<usize>,

    /// Tracing filter, e.g. `info` or `parley_server=debug`.
    #[arg(long, default_value = "info", env = "PARLEY_SERVER_LOG")]
    pub log_level: String,
}

/// Settings file layout.
///
/// ```toml
/// bind_addr = "127.0.0.1:8000"
///
/// [history]
/// limit = 50
/// max_stored = 1000
/// ```
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SettingsFile {
    bind_addr: Option<String>,
    history: HistorySettings,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct HistorySettings {
    limit: Option<usize>,
    max_stored: Option<usize>,
}

impl SettingsFile {
    /// Read the settings file.
    ///
    /// An explicit path must exist; the default location may be absent.
    fn read(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match explicit {
            Some(p) => (p.to_path_buf(), true),
            None => match default_settings_path() {
                Some(p) => (p, false),
                None => return Ok(Self::default()),
            },
        };
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(toml::from_str(&text)?),
            Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::ReadFile { path, source }),
        }
    }
}

fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("parley-server").join("config.toml"))
}

/// Validated server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub history_limit: usize,
    pub max_stored: usize,
    pub log_level: String,
}

impl ServerConfig {
    /// Merge the command line with the settings file and validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the settings file cannot be read, or if
    /// the merged settings are invalid.
    pub fn load(cli: &ServerCliArgs) -> Result<Self, ConfigError> {
        let file = SettingsFile::read(cli.config.as_deref())?;
        Self::merge(cli, file)
    }

    fn merge(cli: &ServerCliArgs, file: SettingsFile) -> Result<Self, ConfigError> {
        let bind = cli
            .bind
            .clone()
            .or(file.bind_addr)
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind
            .parse()
            .map_err(|source| ConfigError::BindAddr { addr: bind, source })?;

        let history_limit = cli
            .history_limit
            .or(file.history.limit)
            .unwrap_or(DEFAULT_HISTORY_LIMIT);
        let max_stored = cli
            .max_stored
            .or(file.history.max_stored)
            .unwrap_or(DEFAULT_MAX_STORED);
        if max_stored == 0 {
            return Err(ConfigError::EmptyStore);
        }
        if history_limit > max_stored {
            return Err(ConfigError::HistoryWindow {
                limit: history_limit,
                max_stored,
            });
        }

        Ok(Self {
            bind_addr,
            history_limit,
            max_stored,
            log_level: cli.log_level.clone(),
        })
    }

    /// Build the shared server state these settings describe.
    #[must_use]
    pub fn build_state(&self) -> Arc<ServerState> {
        let store = HistoryStore::with_max_stored(self.max_stored);
        Arc::new(ServerState::with_config(self.history_limit, store))
    }
}

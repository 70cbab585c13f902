//! Configuration system for the Parley client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/parley/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::session::SessionConfig;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// The server URL cannot be turned into endpoint URLs.
    #[error("invalid server URL {url:?}: {reason}")]
    InvalidUrl {
        /// The configured value.
        url: String,
        /// What was wrong with it.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    server: ServerFileConfig,
    session: SessionFileConfig,
}

/// `[server]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    url: Option<String>,
    connect_timeout_secs: Option<u64>,
    history_timeout_secs: Option<u64>,
}

/// `[session]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SessionFileConfig {
    user_name: Option<String>,
    reconnect_delay_secs: Option<u64>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the chat server (e.g., `http://localhost:8000`).
    pub server_url: String,
    /// Name attached to submitted messages. Blank until configured.
    pub user_name: String,
    /// Pause between a channel closing and the next open attempt.
    pub reconnect_delay: Duration,
    /// Timeout for opening the live channel.
    pub connect_timeout: Duration,
    /// Timeout for the history request.
    pub history_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8000".to_string(),
            user_name: String::new(),
            reconnect_delay: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            history_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path
    /// (`~/.config/parley/config.toml`) is tried and silently ignored if
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            server_url: cli
                .server_url
                .clone()
                .or_else(|| file.server.url.clone())
                .unwrap_or(defaults.server_url),
            user_name: cli
                .user_name
                .clone()
                .or_else(|| file.session.user_name.clone())
                .unwrap_or(defaults.user_name),
            reconnect_delay: cli
                .reconnect_delay_secs
                .or(file.session.reconnect_delay_secs)
                .map_or(defaults.reconnect_delay, Duration::from_secs),
            connect_timeout: cli
                .connect_timeout_secs
                .or(file.server.connect_timeout_secs)
                .map_or(defaults.connect_timeout, Duration::from_secs),
            history_timeout: cli
                .history_timeout_secs
                .or(file.server.history_timeout_secs)
                .map_or(defaults.history_timeout, Duration::from_secs),
        }
    }

    /// URL of the live WebSocket channel: `http` becomes `ws`, `https`
    /// becomes `wss`, and `/ws` is appended to the path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] if `server_url` does not parse or
    /// uses a scheme other than `http(s)`/`ws(s)`.
    pub fn channel_url(&self) -> Result<Url, ConfigError> {
        let mut url = self.base_url()?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(self.invalid(format!("unsupported scheme {other:?}"))),
        };
        url.set_scheme(scheme)
            .map_err(|()| self.invalid(format!("cannot switch to {scheme}")))?;
        self.push_segment(url, "ws")
    }

    /// URL of the history endpoint: `{server_url}/messages`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] under the same conditions as
    /// [`Self::channel_url`].
    pub fn history_url(&self) -> Result<Url, ConfigError> {
        let mut url = self.base_url()?;
        let scheme = match url.scheme() {
            "http" | "ws" => "http",
            "https" | "wss" => "https",
            other => return Err(self.invalid(format!("unsupported scheme {other:?}"))),
        };
        url.set_scheme(scheme)
            .map_err(|()| self.invalid(format!("cannot switch to {scheme}")))?;
        self.push_segment(url, "messages")
    }

    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            reconnect_delay: self.reconnect_delay,
        }
    }

    fn base_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.server_url).map_err(|e| self.invalid(e.to_string()))
    }

    fn push_segment(&self, mut url: Url, segment: &str) -> Result<Url, ConfigError> {
        url.path_segments_mut()
            .map_err(|()| self.invalid("URL cannot have a path".to_string()))?
            .pop_if_empty()
            .push(segment);
        Ok(url)
    }

    fn invalid(&self, reason: String) -> ConfigError {
        ConfigError::InvalidUrl {
            url: self.server_url.clone(),
            reason,
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Realtime chat client")]
pub struct CliArgs {
    /// Base URL of the chat server.
    #[arg(long, env = "PARLEY_SERVER")]
    pub server_url: Option<String>,

    /// Name shown next to your messages.
    #[arg(short, long, env = "PARLEY_USER")]
    pub user_name: Option<String>,

    /// Seconds to wait before reconnecting after the channel closes.
    #[arg(long)]
    pub reconnect_delay_secs: Option<u64>,

    /// Seconds allowed for opening the live channel.
    #[arg(long)]
    pub connect_timeout_secs: Option<u64>,

    /// Seconds allowed for the history request.
    #[arg(long)]
    pub history_timeout_secs: Option<u64>,

    /// Path to config file (default: `~/.config/parley/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "PARLEY_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/parley.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("parley").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}

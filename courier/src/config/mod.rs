//! Configuration system for the `Courier` delivery core.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/courier/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use crate::delivery::RetryPolicy;
use crate::registry::FailureRegistry;

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
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    delivery: DeliveryFileConfig,
    history: HistoryFileConfig,
    storage: StorageFileConfig,
}

/// `[delivery]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct DeliveryFileConfig {
    max_retries: Option<u32>,
    backoff_step_ms: Option<u64>,
    event_buffer: Option<usize>,
}

/// `[history]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct HistoryFileConfig {
    page_size: Option<usize>,
}

/// `[storage]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct StorageFileConfig {
    registry_path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved core configuration.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Retry schedule for transport failures.
    pub retry: RetryPolicy,
    /// Buffer size for the delivery event channel.
    pub event_buffer: usize,
    /// History page size.
    pub page_size: usize,
    /// Failure registry file; `None` keeps the registry in memory only.
    pub registry_path: Option<PathBuf>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            event_buffer: 64,
            page_size: 30,
            registry_path: FailureRegistry::default_path(),
        }
    }
}

impl CoreConfig {
    /// Load configuration by merging CLI args and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an
    /// error. If no `--config` is given, the default path
    /// (`~/.config/courier/config.toml`) is tried and silently ignored if
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

    /// Resolve a `CoreConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default. This is separated from `load()` to
    /// enable unit testing without CLI parsing.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            retry: RetryPolicy {
                max_retries: file
                    .delivery
                    .max_retries
                    .unwrap_or(defaults.retry.max_retries),
                backoff_step: file
                    .delivery
                    .backoff_step_ms
                    .map_or(defaults.retry.backoff_step, Duration::from_millis),
            },
            event_buffer: file
                .delivery
                .event_buffer
                .unwrap_or(defaults.event_buffer),
            page_size: file.history.page_size.unwrap_or(defaults.page_size),
            registry_path: cli
                .registry_path
                .clone()
                .or_else(|| file.storage.registry_path.clone())
                .or(defaults.registry_path),
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Reliable asynchronous message delivery core")]
pub struct CliArgs {
    /// Local user's numeric id.
    #[arg(long, env = "COURIER_UID", default_value_t = 1)]
    pub uid: i64,

    /// Local user's display name.
    #[arg(long, env = "COURIER_NICKNAME", default_value = "courier")]
    pub nickname: String,

    /// Path to config file (default: `~/.config/courier/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the failure registry file location.
    #[arg(long)]
    pub registry_path: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "COURIER_LOG")]
    pub log_level: String,

    /// Demo: number of messages to submit.
    #[arg(long, default_value_t = 3)]
    pub messages: u32,

    /// Demo: transport failures injected before each message goes through.
    #[arg(long, default_value_t = 0)]
    pub fail_first: u32,
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
            // No config dir available — use defaults.
            return Ok(ConfigFile::default());
        };
        config_dir.join("courier").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}

use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tracing_subscriber::EnvFilter;

const CONFIG_FILE_NAME: &str = "config.toml";
const DEFAULT_CONFIG_DIR_NAME: &str = ".convo-store";

// ── Top-level config ──────────────────────────────────────────────

/// Top-level configuration, loaded from `config.toml`.
///
/// Resolution order: `CONVO_STORE_CONFIG_DIR` env → `~/.convo-store/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Path to config.toml - computed, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Conversation history cache settings (`[history]`).
    #[serde(default)]
    pub history: HistoryConfig,

    /// Logging settings (`[observability]`).
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Conversation history cache configuration (`[history]` section).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Inactivity window in minutes before a conversation is stale. Default: `60`.
    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: u64,
    /// Run a background task that sweeps stale conversations. Default: `true`.
    /// When disabled, stale entries are only replaced lazily on lookup.
    #[serde(default = "default_true")]
    pub sweeper_enabled: bool,
    /// Seconds between background sweeps. Default: `300`.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_ttl_minutes() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_sweep_interval_secs() -> u64 {
    300
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: default_ttl_minutes(),
            sweeper_enabled: true,
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl HistoryConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_minutes.saturating_mul(60))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Logging configuration (`[observability]` section).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Default `tracing` filter directive when `RUST_LOG` is unset
    /// (e.g. `"info"`, `"convo_store=debug"`). Default: `"info"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Configuration values that would make the store misbehave at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("history.ttl_minutes must be greater than 0")]
    ZeroTtl,
    #[error("history.sweep_interval_secs must be greater than 0 when the sweeper is enabled")]
    ZeroSweepInterval,
    #[error("observability.log_level is not a valid filter directive ({0})")]
    InvalidLogLevel(String),
}

// ── Loading ───────────────────────────────────────────────────────

/// Directory holding `config.toml`: `CONVO_STORE_CONFIG_DIR` if set,
/// otherwise `~/.convo-store`.
pub fn default_config_dir() -> Result<PathBuf> {
    if let Ok(custom) = std::env::var("CONVO_STORE_CONFIG_DIR") {
        let custom = custom.trim();
        if !custom.is_empty() {
            return Ok(PathBuf::from(shellexpand::tilde(custom).into_owned()));
        }
    }
    let home = UserDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .context("Could not find home directory")?;
    Ok(home.join(DEFAULT_CONFIG_DIR_NAME))
}

impl Config {
    /// Load `config.toml` from the default config directory, writing a
    /// default file on first run.
    pub async fn load_or_init() -> Result<Self> {
        let dir = default_config_dir()?;
        Self::load_or_init_in(&dir).await
    }

    /// Load `config.toml` from `dir`, writing a default file if missing.
    /// Environment overrides are applied and the result validated.
    pub async fn load_or_init_in(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create config directory {}", dir.display()))?;

        let mut config = if fs::try_exists(&config_path).await.unwrap_or(false) {
            let contents = fs::read_to_string(&config_path)
                .await
                .context("Failed to read config file")?;
            Self::from_toml_str(&contents)?
        } else {
            let config = Config::default();
            let contents = config.to_toml()?;
            fs::write(&config_path, contents)
                .await
                .context("Failed to write default config file")?;
            config
        };

        config.config_path = config_path;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document. Missing sections fall back to defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse config file")
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Validate configuration values that would cause runtime failures.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.history.ttl_minutes == 0 {
            return Err(ConfigError::ZeroTtl);
        }
        if self.history.sweeper_enabled && self.history.sweep_interval_secs == 0 {
            return Err(ConfigError::ZeroSweepInterval);
        }
        if let Err(error) = EnvFilter::try_new(&self.observability.log_level) {
            return Err(ConfigError::InvalidLogLevel(format!(
                "{}: {error}",
                self.observability.log_level
            )));
        }
        Ok(())
    }

    /// Apply environment variable overrides to config.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable source. Unparseable values
    /// are ignored with a warning.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup("CONVO_STORE_TTL_MINUTES") {
            match raw.trim().parse::<u64>() {
                Ok(minutes) => self.history.ttl_minutes = minutes,
                Err(_) => tracing::warn!(value = %raw, "Ignoring invalid CONVO_STORE_TTL_MINUTES"),
            }
        }

        if let Some(raw) = lookup("CONVO_STORE_SWEEP_INTERVAL_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(secs) => self.history.sweep_interval_secs = secs,
                Err(_) => tracing::warn!(
                    value = %raw,
                    "Ignoring invalid CONVO_STORE_SWEEP_INTERVAL_SECS"
                ),
            }
        }

        if let Some(raw) = lookup("CONVO_STORE_SWEEPER_ENABLED") {
            match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.history.sweeper_enabled = true,
                "0" | "false" | "no" | "off" => self.history.sweeper_enabled = false,
                _ => tracing::warn!(value = %raw, "Ignoring invalid CONVO_STORE_SWEEPER_ENABLED"),
            }
        }

        if let Some(level) = lookup("CONVO_STORE_LOG_LEVEL") {
            let level = level.trim();
            if !level.is_empty() {
                self.observability.log_level = level.to_string();
            }
        }
    }
}

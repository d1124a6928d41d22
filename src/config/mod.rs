pub mod schema;

pub use schema::{default_config_dir, Config, ConfigError, HistoryConfig, ObservabilityConfig};

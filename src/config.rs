//! Configuration loading -- TOML file with defaults for every field.

use serde::Deserialize;
use tracing::{info, warn};

use crate::detect::forest::ForestParams;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API bind address.
    pub bind: String,
    /// SQLite database path.
    pub db_path: String,
    /// Alert webhook endpoint. Unset disables delivery.
    pub webhook_url: Option<String>,
    /// Outlier model tunables.
    pub forest: ForestParams,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            db_path: "data/txwatch.db".to_string(),
            webhook_url: None,
            forest: ForestParams::default(),
        }
    }
}

/// Load configuration from a TOML file, falling back to defaults when the
/// file is missing or fails to parse.
pub fn load(path: &str) -> Config {
    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(cfg) => {
                info!("Loaded config from {}", path);
                cfg
            }
            Err(e) => {
                warn!("Failed to parse config at {}: {}. Using defaults.", path, e);
                Config::default()
            }
        },
        Err(_) => {
            warn!("Config file not found at {}. Using defaults.", path);
            Config::default()
        }
    }
}

//! Configuration for the order engine

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Order engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Data directory for the market store
    pub data_dir: PathBuf,

    /// Prefix for human-facing order numbers
    pub order_no_prefix: String,

    /// Days after shipment before the sweep confirms on the buyer's behalf
    pub auto_confirm_days: i64,

    /// Seconds between auto-confirm sweep ticks
    pub sweep_interval_secs: u64,

    /// Title catalog seeded on first open
    pub titles: Vec<TitleSeed>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            service_name: "order-engine".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            data_dir: PathBuf::from("./data/market"),
            order_no_prefix: "LM".to_string(),
            auto_confirm_days: 7,
            sweep_interval_secs: 60,
            titles: default_titles(),
        }
    }
}

/// One title row as configured; becomes a stored reference row on first open
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TitleSeed {
    /// Title level (unique, ascending)
    pub level: u8,

    /// Display name
    pub name: String,

    /// Provinces that must be lit to hold this title
    pub required_provinces: u32,
}

/// The four stock titles
pub fn default_titles() -> Vec<TitleSeed> {
    [
        (1u8, "Wanderer", 3u32),
        (2, "Voyager", 10),
        (3, "Pathfinder", 20),
        (4, "Cartographer", 30),
    ]
    .into_iter()
    .map(|(level, name, required_provinces)| TitleSeed {
        level,
        name: name.to_string(),
        required_provinces,
    })
    .collect()
}

impl EngineConfig {
    /// Core configuration for the underlying market store
    pub fn core_config(&self) -> market_core::Config {
        market_core::Config {
            data_dir: self.data_dir.clone(),
            ..Default::default()
        }
    }

    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&content)
            .map_err(|e| market_core::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = EngineConfig::default();

        if let Ok(data_dir) = std::env::var("ENGINE_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(prefix) = std::env::var("ENGINE_ORDER_NO_PREFIX") {
            config.order_no_prefix = prefix;
        }

        if let Ok(days) = std::env::var("ENGINE_AUTO_CONFIRM_DAYS") {
            config.auto_confirm_days = days.parse().map_err(|e| {
                market_core::Error::Config(format!("Invalid ENGINE_AUTO_CONFIRM_DAYS: {}", e))
            })?;
        }

        if let Ok(secs) = std::env::var("ENGINE_SWEEP_INTERVAL_SECS") {
            config.sweep_interval_secs = secs.parse().map_err(|e| {
                market_core::Error::Config(format!("Invalid ENGINE_SWEEP_INTERVAL_SECS: {}", e))
            })?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.service_name, "order-engine");
        assert_eq!(config.order_no_prefix, "LM");
        assert_eq!(config.auto_confirm_days, 7);
        assert_eq!(config.titles.len(), 4);
        assert_eq!(config.titles[0].name, "Wanderer");
        assert_eq!(config.titles[3].required_provinces, 30);
    }

    #[test]
    fn test_core_config_inherits_data_dir() {
        let mut config = EngineConfig::default();
        config.data_dir = PathBuf::from("/tmp/lumina-test");

        let core = config.core_config();
        assert_eq!(core.data_dir, PathBuf::from("/tmp/lumina-test"));
    }
}

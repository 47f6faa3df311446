//! Tool configuration read from the `--config` JSON file.
//!
//! ```json
//! {
//!   "ingest": { "gap_alert_min": 10 },
//!   "analysis": { "delay_alert_threshold_min": 20, "control_sigma": 2.5 }
//! }
//! ```
//!
//! Every section and field is optional; missing ones keep their defaults.

use brew_core::consolidate::ConsolidationOptions;
use brew_data::AnalysisConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrewConfig {
    pub ingest: ConsolidationOptions,
    pub analysis: AnalysisConfig,
}

impl BrewConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: BrewConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read the configuration file, or use the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let json = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path.display(), e))?;
        let config = Self::from_json(&json)?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let gap = self.ingest.gap_alert_min;
        if gap.is_nan() || gap < 0.0 {
            anyhow::bail!("gap_alert_min must not be negative (got {gap})");
        }
        self.analysis.validate()?;
        Ok(())
    }
}

// Configuration loader
// Loads telemetry settings from a TOML file

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use super::settings::TelemetryConfig;

/// Load and validate a telemetry config file
pub fn load_config(path: impl AsRef<Path>) -> Result<TelemetryConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    parse_config(&contents).with_context(|| format!("Failed to load {}", path.display()))
}

/// Parse a TOML string; missing keys take their defaults
pub fn parse_config(contents: &str) -> Result<TelemetryConfig> {
    let config: TelemetryConfig =
        toml::from_str(contents).context("Failed to parse telemetry config")?;
    config.validate()?;

    Ok(config)
}

//! Rendering configurations back to files

use crate::{Config, ConfigError, Result};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Output format for exported configurations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    /// YAML
    #[default]
    Yaml,
    /// Pretty-printed JSON
    Json,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Yaml => f.write_str("yaml"),
            ExportFormat::Json => f.write_str("json"),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(ExportFormat::Yaml),
            "json" => Ok(ExportFormat::Json),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Render a configuration as a string
pub fn render(config: &Config, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Yaml => Ok(serde_yaml::to_string(config)?),
        ExportFormat::Json => Ok(serde_json::to_string_pretty(config)?),
    }
}

/// Write a configuration to a file
pub fn write_file(config: &Config, path: impl AsRef<Path>, format: ExportFormat) -> Result<()> {
    let path = path.as_ref();
    std::fs::write(path, render(config, format)?)?;
    info!("Exported configuration as {} to {}", format, path.display());
    Ok(())
}

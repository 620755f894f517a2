//! # Deploy Configuration
//!
//! Configuration files for the deployment engine.
//!
//! A file holds a [`DeploymentConfiguration`] plus a few top-level keys that
//! are not part of the deployment itself: a format `version`, an optional
//! `name` and `description`, and orchestrator [`Settings`]. Files are YAML by
//! default; a `.json` extension selects JSON.
//!
//! ```yaml
//! version: "1.0"
//! name: shop
//! settings:
//!   health_check_interval: 10
//! environment: staging
//! namespace: shop
//! cluster_name: eu-1
//! monitoring_config:
//!   provider: prometheus
//! services:
//!   - name: postgres
//!     port: 5432
//!     environment_variables:
//!       POSTGRES_PASSWORD: "${DB_PASSWORD:-secret}"
//!   - name: api
//!     port: 8080
//!     dependencies: [postgres]
//! ```

#![warn(missing_docs)]

use deploy_engine::{DeploymentConfiguration, OrchestratorSettings};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub mod export;
pub mod parser;

pub use export::ExportFormat;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read or write a configuration file
    #[error("Failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse or render YAML
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Failed to parse or render JSON
    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Structurally invalid configuration file
    #[error("Invalid configuration: {0}")]
    Validation(String),

    /// Referenced environment variables are not set
    #[error("Environment variable not found: {}", .0.join(", "))]
    EnvVarNotFound(Vec<String>),

    /// Unknown export format name
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Current configuration file format version
pub const CONFIG_VERSION: &str = "1.0";

fn default_version() -> String {
    CONFIG_VERSION.to_string()
}

/// Root of a configuration file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Configuration format version
    #[serde(default = "default_version")]
    pub version: String,

    /// Optional deployment name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Orchestrator settings
    #[serde(default, skip_serializing_if = "Settings::is_default")]
    pub settings: Settings,

    /// The deployment itself
    #[serde(flatten)]
    pub deployment: DeploymentConfiguration,
}

impl Config {
    /// Wrap a deployment with default settings
    pub fn new(deployment: DeploymentConfiguration) -> Self {
        Self {
            version: default_version(),
            name: None,
            description: None,
            settings: Settings::default(),
            deployment,
        }
    }

    /// Orchestrator settings derived from the `settings` section
    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        self.settings.to_orchestrator_settings()
    }
}

/// Global settings, all durations in seconds
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Settings {
    /// Default log level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Pause between health check ticks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_interval: Option<u64>,

    /// Pause after a failed health check tick
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_backoff: Option<u64>,

    /// Deadline for every service manager call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_timeout: Option<u64>,
}

impl Settings {
    /// Check if settings are default (all None)
    fn is_default(&self) -> bool {
        self == &Settings::default()
    }

    /// Apply these settings over the orchestrator defaults
    pub fn to_orchestrator_settings(&self) -> OrchestratorSettings {
        let mut settings = OrchestratorSettings::default();
        if let Some(secs) = self.health_check_interval {
            settings = settings.with_health_check_interval(Duration::from_secs(secs));
        }
        if let Some(secs) = self.error_backoff {
            settings = settings.with_error_backoff(Duration::from_secs(secs));
        }
        if let Some(secs) = self.operation_timeout {
            settings = settings.with_operation_timeout(Duration::from_secs(secs));
        }
        settings
    }
}

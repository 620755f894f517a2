//! Configuration parser with environment variable substitution
//!
//! Service environment variables may reference the process environment with
//! `${VAR}` or `${VAR:-default}`. References are resolved at load time.

use crate::{CONFIG_VERSION, Config, ConfigError, Result};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, warn};

static ENV_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("valid env reference pattern"));

/// Keys a configuration document may carry at its top level
const TOP_LEVEL_KEYS: &[&str] = &[
    "version",
    "name",
    "description",
    "settings",
    "environment",
    "namespace",
    "cluster_name",
    "services",
    "enable_tls",
    "database_config",
    "cache_config",
    "monitoring_config",
    "secret_management",
    "auto_scaling",
    "resource_quotas",
    "backup_config",
];

/// Input format of a configuration file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// YAML
    Yaml,
    /// JSON
    Json,
}

impl SourceFormat {
    /// Pick the format from a file extension; anything but `.json` is YAML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => SourceFormat::Json,
            _ => SourceFormat::Yaml,
        }
    }
}

/// Parse a configuration file, resolving environment references
pub fn parse_file(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    debug!("Loading configuration from {}", path.display());
    let content = std::fs::read_to_string(path)?;
    parse_as(&content, SourceFormat::from_path(path))
}

/// Parse YAML configuration from a string
pub fn parse_str(content: &str) -> Result<Config> {
    parse_as(content, SourceFormat::Yaml)
}

/// Parse configuration from a string in the given format
pub fn parse_as(content: &str, format: SourceFormat) -> Result<Config> {
    let mut config: Config = match format {
        SourceFormat::Yaml => serde_yaml::from_str(content)?,
        SourceFormat::Json => serde_json::from_str(content)?,
    };
    for key in unknown_keys(content, format) {
        warn!("Ignoring unknown configuration key '{}'", key);
    }
    validate_config(&config)?;
    resolve_environment(&mut config, |name| std::env::var(name).ok())?;
    Ok(config)
}

/// Top-level keys of a document that no configuration field reads
fn unknown_keys(content: &str, format: SourceFormat) -> Vec<String> {
    let keys: Vec<String> = match format {
        SourceFormat::Yaml => serde_yaml::from_str::<serde_yaml::Mapping>(content)
            .map(|map| {
                map.keys()
                    .filter_map(|k| k.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default(),
        SourceFormat::Json => {
            serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(content)
                .map(|map| map.keys().cloned().collect())
                .unwrap_or_default()
        }
    };
    keys.into_iter()
        .filter(|key| !TOP_LEVEL_KEYS.contains(&key.as_str()))
        .collect()
}

/// Checks that belong to the file format rather than to the deployment
fn validate_config(config: &Config) -> Result<()> {
    if config.version != CONFIG_VERSION {
        return Err(ConfigError::Validation(format!(
            "Unsupported version: {}, expected {}",
            config.version, CONFIG_VERSION
        )));
    }
    Ok(())
}

/// Resolve `${VAR}` references in every service's environment variables
///
/// All missing variables across all services are reported in one error.
pub fn resolve_environment(
    config: &mut Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    let mut missing = Vec::new();

    for service in &mut config.deployment.services {
        for value in service.environment_variables.values_mut() {
            match substitute_with(value.as_str(), &lookup) {
                Ok(resolved) => *value = resolved,
                Err(names) => {
                    for name in names {
                        if !missing.contains(&name) {
                            missing.push(name);
                        }
                    }
                }
            }
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::EnvVarNotFound(missing))
    }
}

/// Substitute environment variables in a string
pub fn substitute_env_vars(input: &str) -> Result<String> {
    substitute_with(input, |name| std::env::var(name).ok()).map_err(ConfigError::EnvVarNotFound)
}

/// Substitute `${VAR}` and `${VAR:-default}` using `lookup`
///
/// Returns the names of all unresolved variables on failure.
fn substitute_with(
    input: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> std::result::Result<String, Vec<String>> {
    let mut errors = Vec::new();

    let result = ENV_REF.replace_all(input, |cap: &regex::Captures<'_>| {
        let var_expr = &cap[1];

        // Handle default values: ${VAR:-default}
        let (var_name, default_value) = match var_expr.find(":-") {
            Some(pos) => (&var_expr[..pos], Some(&var_expr[pos + 2..])),
            None => (var_expr, None),
        };

        match (lookup(var_name), default_value) {
            (Some(value), _) => value,
            (None, Some(default)) => default.to_string(),
            (None, None) => {
                if !errors.iter().any(|e| e == var_name) {
                    errors.push(var_name.to_string());
                }
                String::new()
            }
        }
    });

    if errors.is_empty() {
        Ok(result.into_owned())
    } else {
        Err(errors)
    }
}

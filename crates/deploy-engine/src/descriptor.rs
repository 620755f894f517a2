//! Service and deployment configuration types.
//!
//! These are plain value objects: a [`DeploymentConfiguration`] is handed to
//! the orchestrator at construction and never mutated afterwards.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Deployment parameters for a single service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceDescriptor {
    /// Unique service name
    pub name: String,
    /// Version to deploy
    #[serde(default = "default_version", deserialize_with = "scalar_string")]
    pub version: String,
    /// Number of replicas
    #[serde(default = "default_replicas")]
    pub replicas: u32,
    /// Port the service listens on, unique within a deployment
    pub port: u16,
    /// Path probed by health checks
    #[serde(default = "default_health_check_path")]
    pub health_check_path: String,
    /// Environment variables, in declaration order
    #[serde(
        default,
        skip_serializing_if = "IndexMap::is_empty",
        deserialize_with = "scalar_string_map"
    )]
    pub environment_variables: IndexMap<String, String>,
    /// Resource limits such as `cpu` or `memory`
    #[serde(
        default,
        skip_serializing_if = "IndexMap::is_empty",
        deserialize_with = "scalar_string_map"
    )]
    pub resource_limits: IndexMap<String, String>,
    /// Services that must be running before this one starts
    #[serde(default, skip_serializing_if = "IndexSet::is_empty")]
    pub dependencies: IndexSet<String>,
}

/// A YAML or JSON scalar read back as text, so `version: 15` means `"15"`
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Integer(i64),
    Float(f64),
    Flag(bool),
}

impl From<Scalar> for String {
    fn from(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Text(text) => text,
            Scalar::Integer(n) => n.to_string(),
            Scalar::Float(n) => format!("{:?}", n),
            Scalar::Flag(b) => b.to_string(),
        }
    }
}

fn scalar_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Scalar::deserialize(deserializer).map(String::from)
}

fn scalar_string_map<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<IndexMap<String, String>, D::Error> {
    let map = IndexMap::<String, Scalar>::deserialize(deserializer)?;
    Ok(map.into_iter().map(|(k, v)| (k, v.into())).collect())
}

fn default_version() -> String {
    "latest".to_string()
}

fn default_replicas() -> u32 {
    1
}

fn default_health_check_path() -> String {
    "/health".to_string()
}

impl ServiceDescriptor {
    /// Create a descriptor with default version, one replica and `/health`
    pub fn new(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            version: default_version(),
            replicas: default_replicas(),
            port,
            health_check_path: default_health_check_path(),
            environment_variables: IndexMap::new(),
            resource_limits: IndexMap::new(),
            dependencies: IndexSet::new(),
        }
    }

    /// Set the version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set the replica count
    pub fn with_replicas(mut self, replicas: u32) -> Self {
        self.replicas = replicas;
        self
    }

    /// Set the health check path
    pub fn with_health_check_path(mut self, path: impl Into<String>) -> Self {
        self.health_check_path = path.into();
        self
    }

    /// Add an environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment_variables.insert(key.into(), value.into());
        self
    }

    /// Add a resource limit
    pub fn with_resource_limit(mut self, resource: impl Into<String>, limit: impl Into<String>) -> Self {
        self.resource_limits.insert(resource.into(), limit.into());
        self
    }

    /// Add a dependency
    pub fn with_dependency(mut self, service: impl Into<String>) -> Self {
        self.dependencies.insert(service.into());
        self
    }
}

/// Target environment of a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development
    Development,
    /// Pre-production staging
    Staging,
    /// Production
    Production,
    /// Automated test runs
    Test,
}

impl Environment {
    /// Lowercase name as used in configuration files
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
            Environment::Test => "test",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            "test" => Ok(Environment::Test),
            other => Err(format!("Unknown environment: {}", other)),
        }
    }
}

/// Full description of a deployment
///
/// The auxiliary sections (`database_config`, `monitoring_config`, ...) are
/// opaque to the engine. Validation only checks whether they are present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeploymentConfiguration {
    /// Target environment
    pub environment: Environment,
    /// Namespace the services are deployed into
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Cluster the deployment runs on
    #[serde(default)]
    pub cluster_name: String,
    /// Services, in declaration order
    #[serde(default)]
    pub services: Vec<ServiceDescriptor>,
    /// Whether TLS is enabled
    #[serde(default)]
    pub enable_tls: bool,
    /// Database settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_config: Option<Value>,
    /// Cache settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_config: Option<Value>,
    /// Monitoring settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitoring_config: Option<Value>,
    /// Secret management settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_management: Option<Value>,
    /// Autoscaling settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_scaling: Option<Value>,
    /// Resource quotas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_quotas: Option<Value>,
    /// Backup settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_config: Option<Value>,
}

fn default_namespace() -> String {
    "default".to_string()
}

impl DeploymentConfiguration {
    /// Create an empty configuration
    pub fn new(
        environment: Environment,
        namespace: impl Into<String>,
        cluster_name: impl Into<String>,
    ) -> Self {
        Self {
            environment,
            namespace: namespace.into(),
            cluster_name: cluster_name.into(),
            services: Vec::new(),
            enable_tls: false,
            database_config: None,
            cache_config: None,
            monitoring_config: None,
            secret_management: None,
            auto_scaling: None,
            resource_quotas: None,
            backup_config: None,
        }
    }

    /// Append a service
    pub fn with_service(mut self, service: ServiceDescriptor) -> Self {
        self.services.push(service);
        self
    }

    /// Enable or disable TLS
    pub fn with_tls(mut self, enabled: bool) -> Self {
        self.enable_tls = enabled;
        self
    }

    /// Look up a service by name
    pub fn service(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Service names in declaration order
    pub fn service_names(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.name.as_str()).collect()
    }
}

/// Whether an opaque configuration section carries any content
///
/// `None`, `null` and empty objects, arrays or strings count as absent.
pub(crate) fn is_present(section: &Option<Value>) -> bool {
    match section {
        None | Some(Value::Null) => false,
        Some(Value::Object(map)) => !map.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

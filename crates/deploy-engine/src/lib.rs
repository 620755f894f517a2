//! # Deploy Engine
//!
//! Dependency-aware deployment orchestration.
//!
//! This crate takes a declarative [`DeploymentConfiguration`], validates it
//! against environment-specific rule sets, resolves a deployment order from
//! the declared service dependencies, drives deployment through a pluggable
//! [`ServiceManager`], monitors the running services in the background and
//! tears everything down again in reverse order.
//!
//! ## Example
//!
//! ```rust,no_run
//! use deploy_engine::{
//!     DeploymentConfiguration, DeploymentOrchestrator, Environment, ServiceDescriptor,
//! };
//!
//! # async fn example() -> deploy_engine::Result<()> {
//! let config = DeploymentConfiguration::new(Environment::Development, "default", "local")
//!     .with_service(ServiceDescriptor::new("postgres", 5432))
//!     .with_service(ServiceDescriptor::new("api", 8080).with_dependency("postgres"));
//!
//! let orchestrator = DeploymentOrchestrator::new(config);
//! orchestrator.deploy().await?;
//! println!("{:?}", orchestrator.deployment_status().overall_status);
//! orchestrator.stop_deployment().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unsafe_code)]

mod descriptor;
mod health;
mod local;
mod manager;
mod orchestrator;
mod resolver;
mod state;
mod validator;

pub use descriptor::{DeploymentConfiguration, Environment, ServiceDescriptor};
pub use health::{HealthMonitor, HealthTarget, probe_service};
pub use local::LocalServiceManager;
pub use manager::ServiceManager;
pub use orchestrator::{DeploymentOrchestrator, OrchestratorSettings};
pub use resolver::{DependencyGraph, ResolveError, compute_deployment_order};
pub use state::{
    DeploymentError, DeploymentStatus, DeploymentSummary, DeploymentTracker, HealthStatus,
    ServiceHealth, ServiceStatus,
};
pub use validator::{ConfigurationValidator, ValidationReport, ValidationRule, validate};

use std::time::Duration;

/// Error types for deployment operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The configuration failed validation
    #[error("Invalid deployment configuration: {}", .issues.join("; "))]
    InvalidConfiguration {
        /// Every issue reported by the validator
        issues: Vec<String>,
    },

    /// The deployment order could not be resolved
    #[error(transparent)]
    Dependency(#[from] ResolveError),

    /// A service manager refused or failed to deploy a service
    #[error("Failed to deploy service '{service}': {reason}")]
    ServiceDeployment {
        /// Service that failed
        service: String,
        /// Failure reported by the service manager
        reason: String,
    },

    /// Service not found
    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    /// Another live service already claimed the port
    #[error("Port {port} is already in use by service '{owner}'")]
    PortInUse {
        /// Requested port
        port: u16,
        /// Service currently holding the port
        owner: String,
    },

    /// Health check error
    #[error("Health check error: {0}")]
    HealthCheck(String),

    /// A service manager call exceeded the configured operation timeout
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Operation that timed out, e.g. `deploy api`
        operation: String,
        /// Configured deadline
        after: Duration,
    },

    /// One or more services could not be stopped during teardown
    #[error("Teardown incomplete, failed to stop: {}", .failed.join(", "))]
    Teardown {
        /// Services whose stop call failed
        failed: Vec<String>,
    },

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for deployment operations
pub type Result<T> = std::result::Result<T, Error>;

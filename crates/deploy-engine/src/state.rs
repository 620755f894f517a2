//! Runtime state tracking for a deployment run
//!
//! [`DeploymentTracker`] owns the [`DeploymentStatus`] of the current run and
//! is the only place it is mutated. The deploy sequence and the health
//! monitor both write through it, and readers get cloned snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::descriptor::Environment;

/// Lifecycle state of a single service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    /// Nothing is known yet
    #[default]
    Unknown,
    /// Service is not running
    Stopped,
    /// Service is starting up
    Starting,
    /// Service is running
    Running,
    /// Service is shutting down
    Stopping,
    /// Service failed to deploy
    Failed,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceStatus::Unknown => "unknown",
            ServiceStatus::Stopped => "stopped",
            ServiceStatus::Starting => "starting",
            ServiceStatus::Running => "running",
            ServiceStatus::Stopping => "stopping",
            ServiceStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Health of a service as reported by its last probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Service responded normally
    Healthy,
    /// Service responded but is impaired
    Degraded,
    /// Service did not respond or the probe failed
    Unhealthy,
    /// No probe has run yet
    #[default]
    Unknown,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Result of one health probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealth {
    /// Probed service
    pub service_name: String,
    /// Reported health
    pub status: HealthStatus,
    /// Wall-clock duration of the probe in milliseconds
    pub response_time_ms: f64,
    /// When the probe finished
    pub last_check: DateTime<Utc>,
    /// Failure description, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Backend-specific metrics
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metrics: HashMap<String, serde_json::Value>,
}

impl ServiceHealth {
    /// A healthy probe result
    pub fn healthy(service_name: impl Into<String>, response_time_ms: f64) -> Self {
        Self {
            service_name: service_name.into(),
            status: HealthStatus::Healthy,
            response_time_ms,
            last_check: Utc::now(),
            error_message: None,
            metrics: HashMap::new(),
        }
    }

    /// An unhealthy probe result carrying the failure reason
    pub fn unhealthy(
        service_name: impl Into<String>,
        response_time_ms: f64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            status: HealthStatus::Unhealthy,
            response_time_ms,
            last_check: Utc::now(),
            error_message: Some(error.into()),
            metrics: HashMap::new(),
        }
    }

    /// Attach a metric
    pub fn with_metric(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metrics.insert(key.into(), value.into());
        self
    }
}

/// A failure recorded during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentError {
    /// When the error occurred
    pub timestamp: DateTime<Utc>,
    /// Service the error belongs to
    pub component: String,
    /// Error message
    pub message: String,
}

/// State of one deployment run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentStatus {
    /// Target environment
    pub environment: Environment,
    /// Unique id of this run
    pub deployment_id: String,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Per-service lifecycle state
    pub services: HashMap<String, ServiceStatus>,
    /// Latest health probe per service
    pub health_checks: HashMap<String, ServiceHealth>,
    /// Aggregate state of the run
    pub overall_status: ServiceStatus,
    /// Errors recorded during the run
    #[serde(default)]
    pub errors: Vec<DeploymentError>,
}

impl DeploymentStatus {
    /// Fresh status with a newly generated deployment id
    pub fn new(environment: Environment) -> Self {
        let started_at = Utc::now();
        Self {
            environment,
            deployment_id: generate_deployment_id(started_at),
            started_at,
            services: HashMap::new(),
            health_checks: HashMap::new(),
            overall_status: ServiceStatus::Unknown,
            errors: Vec::new(),
        }
    }
}

/// `deploy-<timestamp>-<random suffix>`; the suffix keeps runs started in
/// the same second apart.
fn generate_deployment_id(started_at: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("deploy-{}-{}", started_at.format("%Y%m%d%H%M%S"), &suffix[..8])
}

/// Aggregate counts for a run
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentSummary {
    /// Run id
    pub deployment_id: String,
    /// Target environment
    pub environment: Environment,
    /// Aggregate state
    pub overall_status: ServiceStatus,
    /// Run start
    pub started_at: DateTime<Utc>,
    /// Time since the run started
    pub duration: chrono::Duration,
    /// Services with a recorded state
    pub total_services: usize,
    /// Services currently running
    pub running_services: usize,
    /// Services that failed to deploy
    pub failed_services: usize,
    /// Services whose last probe was healthy
    pub healthy_services: usize,
    /// Services whose last probe was unhealthy
    pub unhealthy_services: usize,
    /// Recorded errors
    pub error_count: usize,
}

/// Synchronized owner of the current [`DeploymentStatus`]
///
/// Lock poisoning is ignored; every write leaves the status consistent.
#[derive(Debug)]
pub struct DeploymentTracker {
    status: RwLock<DeploymentStatus>,
}

impl DeploymentTracker {
    /// Create a tracker with `overall_status = Unknown`
    pub fn new(environment: Environment) -> Self {
        Self {
            status: RwLock::new(DeploymentStatus::new(environment)),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, DeploymentStatus> {
        self.status.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, DeploymentStatus> {
        self.status.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a new run: fresh id and timestamp, cleared health and errors
    ///
    /// Service states carry over, so services left live by an earlier run
    /// stay visible to teardown until this run overwrites them.
    pub fn begin_run(&self) -> String {
        let mut status = self.write();
        let environment = status.environment;
        let services = std::mem::take(&mut status.services);
        *status = DeploymentStatus::new(environment);
        status.services = services;
        status.deployment_id.clone()
    }

    /// Update one service's lifecycle state
    pub fn set_service_status(&self, service: &str, state: ServiceStatus) {
        self.write().services.insert(service.to_string(), state);
    }

    /// Update the aggregate state
    pub fn set_overall_status(&self, state: ServiceStatus) {
        self.write().overall_status = state;
    }

    /// Replace the health entries of a whole tick in a single write
    pub fn apply_health_results(&self, results: Vec<ServiceHealth>) {
        let mut status = self.write();
        for health in results {
            status.health_checks.insert(health.service_name.clone(), health);
        }
    }

    /// Record an error against a service
    pub fn record_error(&self, component: &str, message: impl Into<String>) {
        self.write().errors.push(DeploymentError {
            timestamp: Utc::now(),
            component: component.to_string(),
            message: message.into(),
        });
    }

    /// Clone of the current status
    pub fn snapshot(&self) -> DeploymentStatus {
        self.read().clone()
    }

    /// Current lifecycle state of a service, if one was ever recorded
    pub fn service_status(&self, service: &str) -> Option<ServiceStatus> {
        self.read().services.get(service).copied()
    }

    /// Latest health probe of a service
    pub fn service_health(&self, service: &str) -> Option<ServiceHealth> {
        self.read().health_checks.get(service).cloned()
    }

    /// Names of services currently in the given state
    pub fn services_in(&self, state: ServiceStatus) -> Vec<String> {
        self.read()
            .services
            .iter()
            .filter(|(_, s)| **s == state)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Aggregate counts for the current run
    pub fn summary(&self) -> DeploymentSummary {
        let status = self.read();
        let count_state = |state: ServiceStatus| status.services.values().filter(|s| **s == state).count();
        let count_health = |health: HealthStatus| {
            status
                .health_checks
                .values()
                .filter(|h| h.status == health)
                .count()
        };

        DeploymentSummary {
            deployment_id: status.deployment_id.clone(),
            environment: status.environment,
            overall_status: status.overall_status,
            started_at: status.started_at,
            duration: Utc::now() - status.started_at,
            total_services: status.services.len(),
            running_services: count_state(ServiceStatus::Running),
            failed_services: count_state(ServiceStatus::Failed),
            healthy_services: count_health(HealthStatus::Healthy),
            unhealthy_services: count_health(HealthStatus::Unhealthy),
            error_count: status.errors.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_tracker_is_unknown() {
        let tracker = DeploymentTracker::new(Environment::Development);
        let status = tracker.snapshot();
        assert_eq!(status.overall_status, ServiceStatus::Unknown);
        assert!(status.services.is_empty());
        assert!(status.deployment_id.starts_with("deploy-"));
    }

    #[test]
    fn test_begin_run_resets_run_state() {
        let tracker = DeploymentTracker::new(Environment::Staging);
        let first_id = tracker.snapshot().deployment_id;
        tracker.set_service_status("api", ServiceStatus::Running);
        tracker.set_overall_status(ServiceStatus::Running);
        tracker.apply_health_results(vec![ServiceHealth::healthy("api", 1.0)]);
        tracker.record_error("api", "boom");

        let second_id = tracker.begin_run();
        let status = tracker.snapshot();
        assert_ne!(first_id, second_id);
        assert_eq!(status.deployment_id, second_id);
        assert_eq!(status.environment, Environment::Staging);
        assert!(status.health_checks.is_empty());
        assert!(status.errors.is_empty());
        assert_eq!(status.overall_status, ServiceStatus::Unknown);
    }

    #[test]
    fn test_begin_run_keeps_service_states() {
        let tracker = DeploymentTracker::new(Environment::Test);
        tracker.set_service_status("db", ServiceStatus::Running);
        tracker.set_service_status("api", ServiceStatus::Failed);

        tracker.begin_run();
        assert_eq!(tracker.service_status("db"), Some(ServiceStatus::Running));
        assert_eq!(tracker.service_status("api"), Some(ServiceStatus::Failed));
    }

    #[test]
    fn test_health_results_replace_previous_entries() {
        let tracker = DeploymentTracker::new(Environment::Test);
        tracker.apply_health_results(vec![
            ServiceHealth::unhealthy("api", 3.0, "connection refused"),
            ServiceHealth::healthy("db", 1.0),
        ]);
        tracker.apply_health_results(vec![ServiceHealth::healthy("api", 2.0)]);

        let api = tracker.service_health("api").unwrap();
        assert_eq!(api.status, HealthStatus::Healthy);
        assert!(api.error_message.is_none());
        assert_eq!(tracker.service_health("db").unwrap().status, HealthStatus::Healthy);
        assert!(tracker.service_health("cache").is_none());
    }

    #[test]
    fn test_summary_counts() {
        let tracker = DeploymentTracker::new(Environment::Production);
        tracker.set_service_status("a", ServiceStatus::Running);
        tracker.set_service_status("b", ServiceStatus::Running);
        tracker.set_service_status("c", ServiceStatus::Failed);
        tracker.apply_health_results(vec![
            ServiceHealth::healthy("a", 1.0),
            ServiceHealth::unhealthy("b", 1.0, "timeout"),
        ]);
        tracker.record_error("c", "deploy failed");

        let summary = tracker.summary();
        assert_eq!(summary.total_services, 3);
        assert_eq!(summary.running_services, 2);
        assert_eq!(summary.failed_services, 1);
        assert_eq!(summary.healthy_services, 1);
        assert_eq!(summary.unhealthy_services, 1);
        assert_eq!(summary.error_count, 1);

        let mut running = tracker.services_in(ServiceStatus::Running);
        running.sort();
        assert_eq!(running, vec!["a", "b"]);
    }

    #[test]
    fn test_status_serialization() {
        let yaml = serde_yaml::to_string(&ServiceStatus::Stopping).unwrap();
        assert_eq!(yaml.trim(), "stopping");
        let health: HealthStatus = serde_yaml::from_str("degraded").unwrap();
        assert_eq!(health, HealthStatus::Degraded);
    }
}

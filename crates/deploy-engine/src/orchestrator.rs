//! Deployment orchestration engine
//!
//! Validates a configuration, deploys its services in dependency order,
//! monitors them in the background and tears them down in reverse order.

use crate::{
    Error, Result,
    descriptor::DeploymentConfiguration,
    health::{HealthMonitor, HealthTarget},
    local::LocalServiceManager,
    manager::ServiceManager,
    resolver::compute_deployment_order,
    state::{DeploymentStatus, DeploymentSummary, DeploymentTracker, ServiceHealth, ServiceStatus},
    validator::{ValidationReport, validate},
};
use async_runtime_compat::{Spawner, default_spawner, runtime_utils::timeout};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Timing settings of an orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    /// Pause between two health check ticks
    pub health_check_interval: Duration,
    /// Pause after a health check tick failed as a whole
    pub error_backoff: Duration,
    /// Deadline for every service manager call, unlimited when `None`
    pub operation_timeout: Option<Duration>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            health_check_interval: Duration::from_secs(30),
            error_backoff: Duration::from_secs(5),
            operation_timeout: None,
        }
    }
}

impl OrchestratorSettings {
    /// Set the health check interval
    pub fn with_health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }

    /// Set the backoff after a failed health check tick
    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Set the deadline for service manager calls
    pub fn with_operation_timeout(mut self, limit: Duration) -> Self {
        self.operation_timeout = Some(limit);
        self
    }
}

/// Drives one deployment configuration through its lifecycle
///
/// `deploy` and `stop_deployment` are serialized against each other; status
/// queries never block on them.
pub struct DeploymentOrchestrator {
    config: Arc<DeploymentConfiguration>,
    manager: Arc<dyn ServiceManager>,
    spawner: Arc<dyn Spawner>,
    settings: OrchestratorSettings,
    tracker: Arc<DeploymentTracker>,
    /// Order used by the current run
    order: RwLock<Vec<String>>,
    monitor: Mutex<Option<HealthMonitor>>,
    lifecycle: futures::lock::Mutex<()>,
}

impl DeploymentOrchestrator {
    /// Create an orchestrator backed by a [`LocalServiceManager`]
    pub fn new(config: DeploymentConfiguration) -> Self {
        Self::with_manager(config, Arc::new(LocalServiceManager::new()))
    }

    /// Create an orchestrator backed by the given service manager
    pub fn with_manager(config: DeploymentConfiguration, manager: Arc<dyn ServiceManager>) -> Self {
        let tracker = Arc::new(DeploymentTracker::new(config.environment));
        Self {
            config: Arc::new(config),
            manager,
            spawner: default_spawner(),
            settings: OrchestratorSettings::default(),
            tracker,
            order: RwLock::new(Vec::new()),
            monitor: Mutex::new(None),
            lifecycle: futures::lock::Mutex::new(()),
        }
    }

    /// Replace the timing settings
    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Spawn the health monitor on a specific runtime
    pub fn with_spawner(mut self, spawner: Arc<dyn Spawner>) -> Self {
        self.spawner = spawner;
        self
    }

    /// The configuration this orchestrator deploys
    pub fn config(&self) -> &DeploymentConfiguration {
        &self.config
    }

    /// The timing settings in use
    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Validate the configuration against the rules of its environment
    pub fn validate_deployment(&self) -> ValidationReport {
        let report = validate(&self.config);
        if report.is_valid() {
            debug!("Configuration for {} is valid", self.config.environment);
        } else {
            for issue in &report.issues {
                warn!("Configuration issue: {}", issue);
            }
        }
        report
    }

    /// Deploy every service in dependency order
    ///
    /// Stops at the first service that fails; services deployed before it
    /// are left running. On success the health monitor is started. Calling
    /// this again replaces the previous run.
    pub async fn deploy(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        info!(
            "Starting deployment to {} (namespace '{}', cluster '{}')",
            self.config.environment, self.config.namespace, self.config.cluster_name
        );

        let report = self.validate_deployment();
        if !report.is_valid() {
            error!(
                "Deployment aborted: configuration has {} issue(s)",
                report.issues.len()
            );
            self.tracker.set_overall_status(ServiceStatus::Failed);
            return Err(Error::InvalidConfiguration {
                issues: report.issues,
            });
        }

        let order = match compute_deployment_order(&self.config.services) {
            Ok(order) => order,
            Err(e) => {
                error!("Deployment aborted: {}", e);
                self.tracker.set_overall_status(ServiceStatus::Failed);
                return Err(e.into());
            }
        };

        self.shutdown_monitor().await;
        let deployment_id = self.tracker.begin_run();
        *self.order.write().unwrap_or_else(PoisonError::into_inner) = order.clone();
        info!("Deployment {} order: {:?}", deployment_id, order);

        for name in &order {
            let Some(descriptor) = self.config.service(name) else {
                return Err(Error::ServiceNotFound(name.clone()));
            };

            info!("Deploying service '{}' ({})", name, descriptor.version);
            self.tracker.set_service_status(name, ServiceStatus::Starting);

            match self.call("deploy", name, self.manager.deploy(descriptor)).await {
                Ok(()) => {
                    self.tracker.set_service_status(name, ServiceStatus::Running);
                    info!("Service '{}' is running", name);
                }
                Err(e) => {
                    error!("Failed to deploy service '{}': {}", name, e);
                    self.tracker.set_service_status(name, ServiceStatus::Failed);
                    self.tracker.record_error(name, e.to_string());
                    self.tracker.set_overall_status(ServiceStatus::Failed);
                    return Err(Error::ServiceDeployment {
                        service: name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let targets: Vec<HealthTarget> = order
            .iter()
            .filter_map(|name| self.config.service(name))
            .map(HealthTarget::from)
            .collect();
        let monitor = HealthMonitor::start(
            self.spawner.as_ref(),
            self.manager.clone(),
            self.tracker.clone(),
            targets,
            &self.settings,
        );
        *self.monitor.lock().unwrap_or_else(PoisonError::into_inner) = Some(monitor);

        self.tracker.set_overall_status(ServiceStatus::Running);
        info!(
            "Deployment {} complete: {} service(s) running",
            deployment_id,
            order.len()
        );
        Ok(())
    }

    /// Stop the health monitor, then every deployed service in reverse order
    ///
    /// Services that never started or are already stopped are skipped. A
    /// service whose deploy failed is only stopped if the manager still
    /// reports it as present. A service that fails to stop does not prevent the others from being
    /// stopped; all failures are reported together once the sequence is done.
    pub async fn stop_deployment(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        let deployment_id = self.tracker.snapshot().deployment_id;
        info!("Stopping deployment {}", deployment_id);

        self.shutdown_monitor().await;

        let mut shutdown_order = self.deployment_order();
        shutdown_order.reverse();

        let mut failed = Vec::new();
        for name in &shutdown_order {
            match self.tracker.service_status(name) {
                None | Some(ServiceStatus::Stopped) => {
                    debug!("Skipping '{}': not deployed", name);
                    continue;
                }
                Some(ServiceStatus::Running) => {}
                Some(recorded) => {
                    if self.reported_status(name).await == ServiceStatus::Stopped {
                        debug!(
                            "Skipping '{}': recorded {} but not running in the manager",
                            name, recorded
                        );
                        self.tracker.set_service_status(name, ServiceStatus::Stopped);
                        continue;
                    }
                }
            }

            info!("Stopping service '{}'", name);
            self.tracker.set_service_status(name, ServiceStatus::Stopping);

            match self.call("stop", name, self.manager.stop(name)).await {
                Ok(()) => {
                    self.tracker.set_service_status(name, ServiceStatus::Stopped);
                    info!("Service '{}' stopped", name);
                }
                Err(e) => {
                    warn!("Failed to stop service '{}': {}", name, e);
                    self.tracker
                        .record_error(name, format!("Failed to stop: {}", e));
                    failed.push(name.clone());
                }
            }
        }

        self.tracker.set_overall_status(ServiceStatus::Stopped);

        if failed.is_empty() {
            info!("Deployment {} stopped", deployment_id);
            Ok(())
        } else {
            error!(
                "Deployment {} stopped with {} failure(s)",
                deployment_id,
                failed.len()
            );
            Err(Error::Teardown { failed })
        }
    }

    /// Snapshot of the current deployment status
    pub fn deployment_status(&self) -> DeploymentStatus {
        self.tracker.snapshot()
    }

    /// Latest health result of a service
    pub fn service_health(&self, name: &str) -> Option<ServiceHealth> {
        self.tracker.service_health(name)
    }

    /// Deployment order of the current run, empty before the first deploy
    pub fn deployment_order(&self) -> Vec<String> {
        self.order
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Aggregate counts for the current run
    pub fn summary(&self) -> DeploymentSummary {
        self.tracker.summary()
    }

    /// Whether a health monitor is currently active
    pub fn is_monitoring(&self) -> bool {
        self.monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    async fn shutdown_monitor(&self) {
        let monitor = self
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(monitor) = monitor {
            debug!("Shutting down health monitor");
            monitor.shutdown().await;
        }
    }

    /// Ask the manager for a service's state, `Unknown` if it does not answer in time
    async fn reported_status(&self, name: &str) -> ServiceStatus {
        let query = self.manager.status(name);
        match self.settings.operation_timeout {
            Some(limit) => timeout(limit, query).await.unwrap_or(ServiceStatus::Unknown),
            None => query.await,
        }
    }

    /// Run a service manager call under the configured deadline
    async fn call<T>(
        &self,
        operation: &str,
        service: &str,
        future: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match self.settings.operation_timeout {
            Some(limit) => timeout(limit, future).await.unwrap_or_else(|_| {
                Err(Error::Timeout {
                    operation: format!("{} {}", operation, service),
                    after: limit,
                })
            }),
            None => future.await,
        }
    }
}

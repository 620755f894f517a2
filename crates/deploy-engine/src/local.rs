//! In-memory reference service manager.
//!
//! Useful for local runs and tests: "deploying" a service registers a
//! runtime handle in a map owned by the manager instance.

use crate::{
    Error,
    descriptor::ServiceDescriptor,
    manager::ServiceManager,
    state::{ServiceHealth, ServiceStatus},
};
use async_runtime_compat::runtime_utils::sleep;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Runtime handle of a deployed service
#[derive(Debug, Clone)]
struct ServiceInstance {
    instance_id: Uuid,
    descriptor: ServiceDescriptor,
    started_at: DateTime<Utc>,
    status: ServiceStatus,
}

/// In-memory [`ServiceManager`]
///
/// Tracks deployed instances and the ports they claim. State lives and dies
/// with the manager instance.
#[derive(Debug, Default)]
pub struct LocalServiceManager {
    instances: RwLock<HashMap<String, ServiceInstance>>,
    ports: RwLock<HashMap<u16, String>>,
    startup_delay: Duration,
}

impl LocalServiceManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait this long inside every `deploy` call, simulating startup
    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    /// Names of currently deployed services, sorted
    pub fn deployed_services(&self) -> Vec<String> {
        let instances = self.instances.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = instances.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether a service is currently deployed
    pub fn is_deployed(&self, name: &str) -> bool {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Instance id of a deployed service
    pub fn instance_id(&self, name: &str) -> Option<Uuid> {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|i| i.instance_id)
    }

    /// Remove an instance and release its port
    fn release(&self, name: &str) -> Option<ServiceInstance> {
        let instance = self
            .instances
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)?;

        let mut ports = self.ports.write().unwrap_or_else(PoisonError::into_inner);
        if ports.get(&instance.descriptor.port).map(String::as_str) == Some(name) {
            ports.remove(&instance.descriptor.port);
        }
        Some(instance)
    }
}

#[async_trait]
impl ServiceManager for LocalServiceManager {
    async fn deploy(&self, descriptor: &ServiceDescriptor) -> std::result::Result<(), Error> {
        let name = descriptor.name.as_str();

        // Nothing is claimed until startup completes, so a dropped deploy
        // leaves no trace behind.
        if !self.startup_delay.is_zero() {
            sleep(self.startup_delay).await;
        }

        let mut instances = self.instances.write().unwrap_or_else(PoisonError::into_inner);
        let mut ports = self.ports.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(owner) = ports.get(&descriptor.port).filter(|owner| *owner != name) {
            warn!(
                "Cannot deploy '{}': port {} held by '{}'",
                name, descriptor.port, owner
            );
            return Err(Error::PortInUse {
                port: descriptor.port,
                owner: owner.clone(),
            });
        }

        if let Some(previous) = instances.remove(name) {
            info!(
                "Service '{}' already deployed (instance {}), stopping previous instance",
                name, previous.instance_id
            );
            if ports.get(&previous.descriptor.port).map(String::as_str) == Some(name) {
                ports.remove(&previous.descriptor.port);
            }
        }

        let instance = ServiceInstance {
            instance_id: Uuid::new_v4(),
            descriptor: descriptor.clone(),
            started_at: Utc::now(),
            status: ServiceStatus::Running,
        };
        info!(
            "Deployed '{}' v{} on port {} ({} replica(s), instance {})",
            name, descriptor.version, descriptor.port, descriptor.replicas, instance.instance_id
        );
        ports.insert(descriptor.port, name.to_string());
        instances.insert(name.to_string(), instance);

        Ok(())
    }

    async fn stop(&self, name: &str) -> std::result::Result<(), Error> {
        match self.release(name) {
            Some(instance) => {
                info!("Stopped '{}' (instance {})", name, instance.instance_id);
                Ok(())
            }
            None => {
                debug!("Stop requested for unknown service '{}'", name);
                Err(Error::ServiceNotFound(name.to_string()))
            }
        }
    }

    async fn status(&self, name: &str) -> ServiceStatus {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|i| i.status)
            .unwrap_or(ServiceStatus::Stopped)
    }

    async fn health_check(
        &self,
        name: &str,
        path: &str,
    ) -> std::result::Result<ServiceHealth, Error> {
        let start = Instant::now();
        let instance = self
            .instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();
        let elapsed_ms = || start.elapsed().as_secs_f64() * 1000.0;

        let Some(instance) = instance else {
            return Ok(ServiceHealth::unhealthy(
                name,
                elapsed_ms(),
                format!("Service '{}' is not deployed", name),
            ));
        };

        debug!("Health check {}{} passed", name, path);
        let uptime = (Utc::now() - instance.started_at).num_seconds();
        Ok(ServiceHealth::healthy(name, elapsed_ms())
            .with_metric("instance_id", instance.instance_id.to_string())
            .with_metric("replicas", instance.descriptor.replicas)
            .with_metric("port", instance.descriptor.port)
            .with_metric("uptime_seconds", uptime))
    }
}

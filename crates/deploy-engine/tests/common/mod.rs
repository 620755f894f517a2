//! Shared test doubles

#![allow(dead_code)]

use async_runtime_compat::runtime_utils::sleep;
use async_trait::async_trait;
use deploy_engine::{Error, ServiceDescriptor, ServiceHealth, ServiceManager, ServiceStatus};
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

/// A single call received by [`ScriptedManager`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Deploy(String),
    Stop(String),
    HealthStarted(String),
    HealthFinished(String),
}

/// Service manager whose failures are scripted per service name
#[derive(Default)]
pub struct ScriptedManager {
    calls: Mutex<Vec<Call>>,
    live: Mutex<HashSet<String>>,
    failing_deploys: Mutex<HashSet<String>>,
    failing_stops: HashSet<String>,
    failing_health: HashSet<String>,
    panicking_health: HashSet<String>,
    deploy_delay: Duration,
    health_delay: Duration,
}

impl ScriptedManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_deploy(self, name: &str) -> Self {
        self.fail_deploys_of(name);
        self
    }

    /// Make every later deploy of `name` fail
    pub fn fail_deploys_of(&self, name: &str) {
        self.failing_deploys.lock().unwrap().insert(name.to_string());
    }

    pub fn failing_stop(mut self, name: &str) -> Self {
        self.failing_stops.insert(name.to_string());
        self
    }

    pub fn failing_health(mut self, name: &str) -> Self {
        self.failing_health.insert(name.to_string());
        self
    }

    pub fn panicking_health(mut self, name: &str) -> Self {
        self.panicking_health.insert(name.to_string());
        self
    }

    pub fn with_deploy_delay(mut self, delay: Duration) -> Self {
        self.deploy_delay = delay;
        self
    }

    pub fn with_health_delay(mut self, delay: Duration) -> Self {
        self.health_delay = delay;
        self
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn deploys(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Deploy(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn stops(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Stop(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Services deployed and not stopped since, sorted
    pub fn live(&self) -> Vec<String> {
        let mut live: Vec<String> = self.live.lock().unwrap().iter().cloned().collect();
        live.sort();
        live
    }

    pub fn health_checks(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::HealthStarted(_)))
            .count()
    }
}

#[async_trait]
impl ServiceManager for ScriptedManager {
    async fn deploy(&self, descriptor: &ServiceDescriptor) -> Result<(), Error> {
        self.record(Call::Deploy(descriptor.name.clone()));
        if !self.deploy_delay.is_zero() {
            sleep(self.deploy_delay).await;
        }
        if self.failing_deploys.lock().unwrap().contains(&descriptor.name) {
            return Err(Error::Other(format!("image for '{}' not found", descriptor.name)));
        }
        self.live.lock().unwrap().insert(descriptor.name.clone());
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<(), Error> {
        self.record(Call::Stop(name.to_string()));
        if self.failing_stops.contains(name) {
            return Err(Error::Other(format!("'{}' refused to stop", name)));
        }
        self.live.lock().unwrap().remove(name);
        Ok(())
    }

    async fn status(&self, name: &str) -> ServiceStatus {
        if self.live.lock().unwrap().contains(name) {
            ServiceStatus::Running
        } else {
            ServiceStatus::Stopped
        }
    }

    async fn health_check(&self, name: &str, _path: &str) -> Result<ServiceHealth, Error> {
        self.record(Call::HealthStarted(name.to_string()));
        if !self.health_delay.is_zero() {
            sleep(self.health_delay).await;
        }
        self.record(Call::HealthFinished(name.to_string()));

        if self.panicking_health.contains(name) {
            panic!("health probe for {} crashed", name);
        }
        if self.failing_health.contains(name) {
            return Err(Error::HealthCheck("connection refused".to_string()));
        }
        Ok(ServiceHealth::healthy(name, 1.5))
    }
}

/// Poll `condition` every 10ms for up to two seconds
pub async fn wait_until(condition: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    condition()
}

pub fn chain(names: &[&str]) -> Vec<ServiceDescriptor> {
    let mut services = Vec::new();
    for (i, name) in names.iter().enumerate() {
        let mut service = ServiceDescriptor::new(*name, 8000 + i as u16);
        if i > 0 {
            service = service.with_dependency(names[i - 1]);
        }
        services.push(service);
    }
    services
}

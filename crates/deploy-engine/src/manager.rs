//! Service manager capability.
//!
//! The orchestrator never starts processes or containers itself. Everything
//! that touches a real service goes through a [`ServiceManager`], so a host
//! can plug in a process supervisor, a container runtime client or the
//! in-memory [`LocalServiceManager`](crate::LocalServiceManager).

use crate::{
    Error,
    descriptor::ServiceDescriptor,
    state::{ServiceHealth, ServiceStatus},
};
use async_trait::async_trait;

/// Backend that deploys, stops and probes individual services
///
/// Failures are reported through the returned `Result`, never by panicking,
/// so the orchestrator can record them and carry on with other services.
#[async_trait]
pub trait ServiceManager: Send + Sync {
    /// Deploy a service
    ///
    /// Deploying a service that is already deployed replaces the previous
    /// instance: it is stopped first, then the new one is started.
    async fn deploy(&self, descriptor: &ServiceDescriptor) -> std::result::Result<(), Error>;

    /// Stop a deployed service
    ///
    /// Stopping an unknown or already stopped service is an error, not a
    /// no-op success.
    async fn stop(&self, name: &str) -> std::result::Result<(), Error>;

    /// Current lifecycle state; unknown services report `Stopped`
    async fn status(&self, name: &str) -> ServiceStatus;

    /// Probe a service's health endpoint
    ///
    /// Services that are not deployed yield an `Unhealthy` record rather
    /// than an error. The response time is measured for every outcome.
    async fn health_check(
        &self,
        name: &str,
        path: &str,
    ) -> std::result::Result<ServiceHealth, Error>;
}

//! Background health monitoring
//!
//! One [`HealthMonitor`] runs per active deployment. Every tick probes all
//! services currently marked `Running` concurrently and writes the results
//! back to the [`DeploymentTracker`] in a single update. A failing, panicking
//! or timed-out probe only affects its own service's record.

use crate::{
    descriptor::ServiceDescriptor,
    manager::ServiceManager,
    orchestrator::OrchestratorSettings,
    state::{DeploymentTracker, ServiceHealth, ServiceStatus},
};
use async_runtime_compat::{
    CancelHandle, CancelToken, JoinHandle, Spawner, cancellation,
    runtime_utils::{sleep, timeout},
    spawn_joinable,
};
use futures::FutureExt;
use futures::future::{Either, join_all, select};
use std::any::Any;
use std::collections::HashSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// A service the monitor probes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthTarget {
    /// Service name
    pub name: String,
    /// Health check path
    pub path: String,
}

impl From<&ServiceDescriptor> for HealthTarget {
    fn from(descriptor: &ServiceDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            path: descriptor.health_check_path.clone(),
        }
    }
}

struct MonitorContext {
    manager: Arc<dyn ServiceManager>,
    tracker: Arc<DeploymentTracker>,
    targets: Vec<HealthTarget>,
    interval: Duration,
    error_backoff: Duration,
    probe_timeout: Option<Duration>,
}

/// Handle to a running health monitoring loop
///
/// Dropping the handle aborts the loop; [`HealthMonitor::shutdown`] stops it
/// gracefully and waits for it.
pub struct HealthMonitor {
    cancel: CancelHandle,
    task: JoinHandle<()>,
}

impl HealthMonitor {
    /// Spawn the monitoring loop
    pub fn start(
        spawner: &dyn Spawner,
        manager: Arc<dyn ServiceManager>,
        tracker: Arc<DeploymentTracker>,
        targets: Vec<HealthTarget>,
        settings: &OrchestratorSettings,
    ) -> Self {
        let context = MonitorContext {
            manager,
            tracker,
            targets,
            interval: settings.health_check_interval,
            error_backoff: settings.error_backoff,
            probe_timeout: settings.operation_timeout,
        };
        let (cancel, token) = cancellation();
        let task = spawn_joinable(spawner, monitor_loop(context, token));

        Self { cancel, task }
    }

    /// Request cancellation and wait for the loop to exit
    ///
    /// A tick that is already running completes before this returns.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.task.await;
    }
}

async fn monitor_loop(context: MonitorContext, token: CancelToken) {
    info!(
        "Health monitoring started for {} service(s), interval {:?}",
        context.targets.len(),
        context.interval
    );

    let shared = &context;
    run_loop(
        move || run_tick(shared),
        context.interval,
        context.error_backoff,
        &token,
    )
    .await;

    info!("Health monitoring stopped");
}

/// Run `tick` until cancelled, pausing `interval` after a completed tick and
/// `error_backoff` after one that panicked
async fn run_loop<F, Fut>(mut tick: F, interval: Duration, error_backoff: Duration, token: &CancelToken)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = usize>,
{
    while !token.is_cancelled() {
        let wait = match AssertUnwindSafe(tick()).catch_unwind().await {
            Ok(probed) => {
                debug!("Health check tick probed {} service(s)", probed);
                interval
            }
            Err(panic) => {
                error!(
                    "Health check tick failed: {}, retrying in {:?}",
                    panic_message(panic.as_ref()),
                    error_backoff
                );
                error_backoff
            }
        };

        if wait_or_cancel(wait, token).await {
            break;
        }
    }
}

/// Sleep for `duration` unless cancelled first; returns true when cancelled
async fn wait_or_cancel(duration: Duration, token: &CancelToken) -> bool {
    let timer = std::pin::pin!(sleep(duration));
    let cancelled = std::pin::pin!(token.cancelled());
    matches!(select(timer, cancelled).await, Either::Right(_))
}

async fn run_tick(context: &MonitorContext) -> usize {
    let running: HashSet<String> = context
        .tracker
        .services_in(ServiceStatus::Running)
        .into_iter()
        .collect();

    let probes = context
        .targets
        .iter()
        .filter(|target| running.contains(&target.name))
        .map(|target| probe_service(context.manager.as_ref(), target, context.probe_timeout));
    let results = join_all(probes).await;

    let probed = results.len();
    context.tracker.apply_health_results(results);
    probed
}

/// Probe one service, turning every kind of failure into an `Unhealthy` record
pub async fn probe_service(
    manager: &dyn ServiceManager,
    target: &HealthTarget,
    probe_timeout: Option<Duration>,
) -> ServiceHealth {
    let start = Instant::now();
    let check = AssertUnwindSafe(manager.health_check(&target.name, &target.path)).catch_unwind();

    let outcome = match probe_timeout {
        Some(limit) => timeout(limit, check).await.map_err(|elapsed| elapsed.to_string()),
        None => Ok(check.await),
    };
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

    match outcome {
        Ok(Ok(Ok(mut health))) => {
            health.service_name = target.name.clone();
            health
        }
        Ok(Ok(Err(e))) => {
            warn!("Health check for '{}' failed: {}", target.name, e);
            ServiceHealth::unhealthy(&target.name, elapsed_ms, format!("Health check failed: {}", e))
        }
        Ok(Err(panic)) => {
            error!(
                "Health check for '{}' panicked: {}",
                target.name,
                panic_message(panic.as_ref())
            );
            ServiceHealth::unhealthy(
                &target.name,
                elapsed_ms,
                format!("Health check panicked: {}", panic_message(panic.as_ref())),
            )
        }
        Err(timed_out) => {
            warn!("Health check for '{}' {}", target.name, timed_out);
            ServiceHealth::unhealthy(&target.name, elapsed_ms, format!("Health check {}", timed_out))
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, LocalServiceManager, state::HealthStatus};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyManager;

    #[async_trait]
    impl ServiceManager for FlakyManager {
        async fn deploy(&self, _descriptor: &ServiceDescriptor) -> Result<(), Error> {
            Ok(())
        }

        async fn stop(&self, _name: &str) -> Result<(), Error> {
            Ok(())
        }

        async fn status(&self, _name: &str) -> ServiceStatus {
            ServiceStatus::Running
        }

        async fn health_check(&self, name: &str, _path: &str) -> Result<ServiceHealth, Error> {
            match name {
                "erroring" => Err(Error::HealthCheck("connection refused".to_string())),
                "panicking" => panic!("probe exploded"),
                "slow" => {
                    sleep(Duration::from_secs(5)).await;
                    Ok(ServiceHealth::healthy(name, 0.0))
                }
                "renamed" => Ok(ServiceHealth::healthy("someone-else", 1.0)),
                _ => Ok(ServiceHealth::healthy(name, 1.0)),
            }
        }
    }

    fn target(name: &str) -> HealthTarget {
        HealthTarget::from(&ServiceDescriptor::new(name, 0))
    }

    #[test]
    fn test_target_from_descriptor() {
        let descriptor = ServiceDescriptor::new("api", 80).with_health_check_path("/ready");
        let target = HealthTarget::from(&descriptor);
        assert_eq!(target.name, "api");
        assert_eq!(target.path, "/ready");
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(boxed.as_ref()), "static str");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }

    #[smol_potat::test]
    async fn test_probe_error_becomes_unhealthy() {
        let health = probe_service(&FlakyManager, &target("erroring"), None).await;
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert!(health.error_message.unwrap().contains("connection refused"));
    }

    #[smol_potat::test]
    async fn test_probe_panic_becomes_unhealthy() {
        let health = probe_service(&FlakyManager, &target("panicking"), None).await;
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert!(health.error_message.unwrap().contains("probe exploded"));
    }

    #[smol_potat::test]
    async fn test_probe_timeout_becomes_unhealthy() {
        let health = probe_service(
            &FlakyManager,
            &target("slow"),
            Some(Duration::from_millis(20)),
        )
        .await;
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert!(health.error_message.unwrap().contains("timed out"));
        assert!(health.response_time_ms >= 20.0);
    }

    #[smol_potat::test]
    async fn test_probe_result_keyed_by_target() {
        let health = probe_service(&FlakyManager, &target("renamed"), None).await;
        assert_eq!(health.service_name, "renamed");
        assert_eq!(health.status, HealthStatus::Healthy);
    }

    #[smol_potat::test]
    async fn test_tick_only_probes_running_services() {
        let tracker = Arc::new(DeploymentTracker::new(crate::Environment::Test));
        tracker.set_service_status("up", ServiceStatus::Running);
        tracker.set_service_status("down", ServiceStatus::Failed);

        let context = MonitorContext {
            manager: Arc::new(LocalServiceManager::new()),
            tracker: tracker.clone(),
            targets: vec![target("up"), target("down")],
            interval: Duration::from_secs(30),
            error_backoff: Duration::from_secs(5),
            probe_timeout: None,
        };

        assert_eq!(run_tick(&context).await, 1);
        // Not deployed in the local manager, so the probe reports unhealthy
        assert_eq!(
            tracker.service_health("up").unwrap().status,
            HealthStatus::Unhealthy
        );
        assert!(tracker.service_health("down").is_none());
    }

    #[smol_potat::test]
    async fn test_shutdown_stops_loop() {
        let tracker = Arc::new(DeploymentTracker::new(crate::Environment::Test));
        tracker.set_service_status("api", ServiceStatus::Running);
        let settings = OrchestratorSettings::default()
            .with_health_check_interval(Duration::from_millis(10));

        let monitor = HealthMonitor::start(
            &async_runtime_compat::smol::SmolSpawner,
            Arc::new(FlakyManager),
            tracker.clone(),
            vec![target("api")],
            &settings,
        );

        for _ in 0..100 {
            if tracker.service_health("api").is_some() {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        monitor.shutdown().await;

        let last = tracker.service_health("api").unwrap().last_check;
        sleep(Duration::from_millis(50)).await;
        assert_eq!(tracker.service_health("api").unwrap().last_check, last);
    }

    #[smol_potat::test]
    async fn test_loop_backs_off_after_a_failed_tick() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let (cancel, token) = cancellation();
        let counter = ticks.clone();
        let task = spawn_joinable(&async_runtime_compat::smol::SmolSpawner, async move {
            run_loop(
                move || {
                    let counter = counter.clone();
                    async move {
                        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                            panic!("tracker lock poisoned");
                        }
                        0
                    }
                },
                Duration::from_secs(3600),
                Duration::from_millis(20),
                &token,
            )
            .await;
        });

        for _ in 0..100 {
            if ticks.load(Ordering::SeqCst) >= 2 {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(ticks.load(Ordering::SeqCst), 2);

        // A completed tick waits the full interval
        sleep(Duration::from_millis(100)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);

        cancel.cancel();
        task.await;
    }
}

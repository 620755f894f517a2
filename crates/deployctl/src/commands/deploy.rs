use anyhow::Result;
use clap::ValueEnum;
use comfy_table::{Cell, Color, Table};
use deploy_config::Config;
use deploy_engine::{
    DeploymentConfiguration, DeploymentOrchestrator, DeploymentStatus, HealthStatus, ServiceStatus,
};
use std::time::Duration;
use tracing::{info, warn};

/// How the final deployment status is printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human readable table
    Table,
    /// Pretty-printed JSON
    Json,
}

pub async fn run(config: &Config, hold: u64, format: OutputFormat) -> Result<()> {
    let orchestrator = DeploymentOrchestrator::new(config.deployment.clone())
        .with_settings(config.orchestrator_settings());

    let deployed = orchestrator.deploy().await;
    match &deployed {
        Ok(()) if hold > 0 => {
            info!("Holding deployment for {}s", hold);
            smol::Timer::after(Duration::from_secs(hold)).await;
        }
        Ok(()) => {}
        Err(e) => warn!("Deployment failed: {}", e),
    }

    let status = orchestrator.deployment_status();
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
        OutputFormat::Table => {
            println!("{}", status_table(&status, &config.deployment, &orchestrator.deployment_order()));
            let summary = orchestrator.summary();
            println!(
                "{} ({}): {} running, {} failed, {} healthy, {} unhealthy, {} error(s)",
                summary.deployment_id,
                summary.overall_status,
                summary.running_services,
                summary.failed_services,
                summary.healthy_services,
                summary.unhealthy_services,
                summary.error_count
            );
        }
    }

    let stopped = orchestrator.stop_deployment().await;

    deployed?;
    stopped?;
    Ok(())
}

fn status_color(status: ServiceStatus) -> Color {
    match status {
        ServiceStatus::Running => Color::Green,
        ServiceStatus::Starting | ServiceStatus::Stopping => Color::Yellow,
        ServiceStatus::Failed => Color::Red,
        ServiceStatus::Stopped | ServiceStatus::Unknown => Color::DarkGrey,
    }
}

fn health_color(status: HealthStatus) -> Color {
    match status {
        HealthStatus::Healthy => Color::Green,
        HealthStatus::Degraded => Color::Yellow,
        HealthStatus::Unhealthy => Color::Red,
        HealthStatus::Unknown => Color::DarkGrey,
    }
}

/// One row per service, in deployment order when known
fn status_table(
    status: &DeploymentStatus,
    deployment: &DeploymentConfiguration,
    order: &[String],
) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["SERVICE", "VERSION", "PORT", "STATUS", "HEALTH", "RESPONSE", "DEPENDENCIES"]);

    let names: Vec<&str> = if order.is_empty() {
        deployment.service_names()
    } else {
        order.iter().map(String::as_str).collect()
    };

    for name in names {
        let Some(service) = deployment.service(name) else {
            continue;
        };
        let state = status.services.get(name).copied().unwrap_or_default();
        let health = status.health_checks.get(name);

        let (health_cell, response) = match health {
            Some(h) => (
                Cell::new(h.status).fg(health_color(h.status)),
                format!("{:.1} ms", h.response_time_ms),
            ),
            None => (Cell::new("-"), "-".to_string()),
        };
        let deps: Vec<&str> = service.dependencies.iter().map(String::as_str).collect();

        table.add_row(vec![
            Cell::new(name),
            Cell::new(&service.version),
            Cell::new(service.port),
            Cell::new(state).fg(status_color(state)),
            health_cell,
            Cell::new(response),
            Cell::new(if deps.is_empty() { "-".to_string() } else { deps.join(", ") }),
        ]);
    }

    table
}

use anyhow::{Context, Result};
use deploy_config::Config;
use deploy_engine::DependencyGraph;

pub fn run(config: &Config) -> Result<()> {
    let graph = DependencyGraph::from_services(&config.deployment.services);
    let order = graph
        .deployment_order()
        .context("Failed to resolve deployment order")?;

    println!("Deployment order:");
    for (i, name) in order.iter().enumerate() {
        let deps = graph.dependencies_of(name);
        if deps.is_empty() {
            println!("  {}. {}", i + 1, name);
        } else {
            println!("  {}. {} (after {})", i + 1, name, deps.join(", "));
        }
    }

    println!("\nShutdown order:");
    for (i, name) in order.iter().rev().enumerate() {
        println!("  {}. {}", i + 1, name);
    }

    Ok(())
}

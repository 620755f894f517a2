use anyhow::Result;
use deploy_config::Config;
use deploy_engine::validate;

pub fn run(config: &Config) -> Result<()> {
    let deployment = &config.deployment;
    println!(
        "Validating {} deployment '{}'...",
        deployment.environment,
        config.name.as_deref().unwrap_or(&deployment.namespace)
    );

    let report = validate(deployment);
    if !report.is_valid() {
        for issue in &report.issues {
            println!("  ✗ {}", issue);
        }
        anyhow::bail!("Configuration has {} issue(s)", report.issues.len());
    }

    println!("✓ Configuration valid");
    println!("  Version: {}", config.version);
    println!("  Namespace: {}", deployment.namespace);
    if !deployment.cluster_name.is_empty() {
        println!("  Cluster: {}", deployment.cluster_name);
    }
    println!("  Services: {}", deployment.services.len());
    println!("  TLS: {}", if deployment.enable_tls { "enabled" } else { "disabled" });

    Ok(())
}

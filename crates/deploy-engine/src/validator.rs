//! Configuration validation
//!
//! A [`ConfigurationValidator`] is a list of [`ValidationRule`]s: the
//! universal structural rules plus the rules of the target environment.
//! Validation never fails; it collects human-readable issues and the
//! configuration is valid only when there are none.

use crate::descriptor::{DeploymentConfiguration, Environment, is_present};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// A single check applied to a deployment configuration
pub trait ValidationRule: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    /// Append every problem found to `issues`
    fn check(&self, config: &DeploymentConfiguration, issues: &mut Vec<String>);
}

/// Outcome of validating a configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Issues in the order the rules reported them
    pub issues: Vec<String>,
}

impl ValidationReport {
    /// True iff no rule reported an issue
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Ordered collection of validation rules
pub struct ConfigurationValidator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl ConfigurationValidator {
    /// Validator with no rules
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Universal rules plus the rule set of `environment`
    pub fn for_environment(environment: Environment) -> Self {
        let mut validator = Self::empty()
            .with_rule(HasServices)
            .with_rule(ServiceFields)
            .with_rule(UniqueNames)
            .with_rule(UniquePorts)
            .with_rule(KnownDependencies);

        match environment {
            Environment::Production => {
                validator = validator
                    .with_rule(ProductionSections)
                    .with_rule(ProductionServices);
            }
            Environment::Staging => {
                validator = validator.with_rule(StagingMonitoring);
            }
            Environment::Development | Environment::Test => {}
        }

        validator
    }

    /// Add a rule
    pub fn with_rule(mut self, rule: impl ValidationRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    /// Names of the configured rules, in application order
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Run every rule against `config`
    pub fn validate(&self, config: &DeploymentConfiguration) -> ValidationReport {
        let mut issues = Vec::new();
        for rule in &self.rules {
            let before = issues.len();
            rule.check(config, &mut issues);
            if issues.len() > before {
                debug!("Rule '{}' reported {} issue(s)", rule.name(), issues.len() - before);
            }
        }
        ValidationReport { issues }
    }
}

/// Validate a configuration against the rules of its own environment
pub fn validate(config: &DeploymentConfiguration) -> ValidationReport {
    ConfigurationValidator::for_environment(config.environment).validate(config)
}

struct HasServices;

impl ValidationRule for HasServices {
    fn name(&self) -> &'static str {
        "has-services"
    }

    fn check(&self, config: &DeploymentConfiguration, issues: &mut Vec<String>) {
        if config.services.is_empty() {
            issues.push("No services defined".to_string());
        }
    }
}

struct ServiceFields;

impl ValidationRule for ServiceFields {
    fn name(&self) -> &'static str {
        "service-fields"
    }

    fn check(&self, config: &DeploymentConfiguration, issues: &mut Vec<String>) {
        for (index, service) in config.services.iter().enumerate() {
            if service.name.trim().is_empty() {
                issues.push(format!("Service at position {} has an empty name", index));
                continue;
            }
            if service.replicas == 0 {
                issues.push(format!(
                    "Service '{}' must declare at least 1 replica",
                    service.name
                ));
            }
            if service.dependencies.contains(&service.name) {
                issues.push(format!("Service '{}' depends on itself", service.name));
            }
        }
    }
}

struct UniqueNames;

impl ValidationRule for UniqueNames {
    fn name(&self) -> &'static str {
        "unique-names"
    }

    fn check(&self, config: &DeploymentConfiguration, issues: &mut Vec<String>) {
        let mut seen = HashSet::new();
        let mut reported = HashSet::new();
        for service in &config.services {
            if !seen.insert(service.name.as_str()) && reported.insert(service.name.as_str()) {
                issues.push(format!("Duplicate service name: '{}'", service.name));
            }
        }
    }
}

struct UniquePorts;

impl ValidationRule for UniquePorts {
    fn name(&self) -> &'static str {
        "unique-ports"
    }

    fn check(&self, config: &DeploymentConfiguration, issues: &mut Vec<String>) {
        let mut owners: HashMap<u16, &str> = HashMap::new();
        for service in &config.services {
            match owners.get(&service.port) {
                Some(owner) => issues.push(format!(
                    "Port conflict: port {} is used by both '{}' and '{}'",
                    service.port, owner, service.name
                )),
                None => {
                    owners.insert(service.port, &service.name);
                }
            }
        }
    }
}

struct KnownDependencies;

impl ValidationRule for KnownDependencies {
    fn name(&self) -> &'static str {
        "known-dependencies"
    }

    fn check(&self, config: &DeploymentConfiguration, issues: &mut Vec<String>) {
        let names: HashSet<&str> = config.services.iter().map(|s| s.name.as_str()).collect();
        for service in &config.services {
            for dependency in &service.dependencies {
                if !names.contains(dependency.as_str()) {
                    issues.push(format!(
                        "Service '{}' depends on unknown service '{}'",
                        service.name, dependency
                    ));
                }
            }
        }
    }
}

struct ProductionSections;

impl ValidationRule for ProductionSections {
    fn name(&self) -> &'static str {
        "production-sections"
    }

    fn check(&self, config: &DeploymentConfiguration, issues: &mut Vec<String>) {
        if !config.enable_tls {
            issues.push("TLS must be enabled in production".to_string());
        }

        let required = [
            (&config.secret_management, "Secret management"),
            (&config.resource_quotas, "Resource quotas"),
            (&config.backup_config, "Backup configuration"),
            (&config.monitoring_config, "Monitoring configuration"),
        ];
        for (section, label) in required {
            if !is_present(section) {
                issues.push(format!("{} is required in production", label));
            }
        }
    }
}

struct ProductionServices;

impl ValidationRule for ProductionServices {
    fn name(&self) -> &'static str {
        "production-services"
    }

    fn check(&self, config: &DeploymentConfiguration, issues: &mut Vec<String>) {
        for service in &config.services {
            if service.replicas < 2 {
                issues.push(format!(
                    "Service '{}' must run at least 2 replicas in production (has {})",
                    service.name, service.replicas
                ));
            }
            if service.resource_limits.is_empty() {
                issues.push(format!(
                    "Service '{}' must declare resource limits in production",
                    service.name
                ));
            }
        }
    }
}

struct StagingMonitoring;

impl ValidationRule for StagingMonitoring {
    fn name(&self) -> &'static str {
        "staging-monitoring"
    }

    fn check(&self, config: &DeploymentConfiguration, issues: &mut Vec<String>) {
        if !is_present(&config.monitoring_config) {
            issues.push("Monitoring configuration is recommended in staging".to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ServiceDescriptor;
    use serde_json::json;

    fn production_ready() -> DeploymentConfiguration {
        let mut config = DeploymentConfiguration::new(Environment::Production, "prod", "main")
            .with_tls(true)
            .with_service(
                ServiceDescriptor::new("api", 8080)
                    .with_replicas(3)
                    .with_resource_limit("cpu", "500m")
                    .with_resource_limit("memory", "512Mi"),
            );
        config.secret_management = Some(json!({"provider": "vault"}));
        config.resource_quotas = Some(json!({"cpu": "8"}));
        config.backup_config = Some(json!({"schedule": "0 3 * * *"}));
        config.monitoring_config = Some(json!({"prometheus": true}));
        config
    }

    #[test]
    fn test_empty_configuration() {
        let config = DeploymentConfiguration::new(Environment::Development, "dev", "local");
        let report = validate(&config);
        assert!(!report.is_valid());
        assert_eq!(report.issues, vec!["No services defined"]);
    }

    #[test]
    fn test_single_development_service_is_valid() {
        let config = DeploymentConfiguration::new(Environment::Development, "dev", "local")
            .with_service(ServiceDescriptor::new("api", 8080));
        let report = validate(&config);
        assert!(report.is_valid(), "unexpected issues: {:?}", report.issues);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn test_port_conflict_in_every_environment() {
        for env in [
            Environment::Development,
            Environment::Staging,
            Environment::Production,
            Environment::Test,
        ] {
            let config = DeploymentConfiguration::new(env, "ns", "cluster")
                .with_service(ServiceDescriptor::new("a", 8080))
                .with_service(ServiceDescriptor::new("b", 8080));
            let report = validate(&config);
            assert!(!report.is_valid());
            assert!(
                report
                    .issues
                    .iter()
                    .any(|i| i.contains("port") && i.contains("conflict")),
                "no port conflict reported for {}: {:?}",
                env,
                report.issues
            );
        }
    }

    #[test]
    fn test_duplicate_names_reported_once() {
        let config = DeploymentConfiguration::new(Environment::Test, "ns", "cluster")
            .with_service(ServiceDescriptor::new("api", 1))
            .with_service(ServiceDescriptor::new("api", 2))
            .with_service(ServiceDescriptor::new("api", 3));
        let report = validate(&config);
        assert_eq!(report.issues, vec!["Duplicate service name: 'api'"]);
    }

    #[test]
    fn test_missing_dependency_names_both_sides() {
        let config = DeploymentConfiguration::new(Environment::Development, "ns", "cluster")
            .with_service(ServiceDescriptor::new("api", 8080).with_dependency("postgres"));
        let report = validate(&config);
        assert_eq!(
            report.issues,
            vec!["Service 'api' depends on unknown service 'postgres'"]
        );
    }

    #[test]
    fn test_service_field_rules() {
        let config = DeploymentConfiguration::new(Environment::Development, "ns", "cluster")
            .with_service(ServiceDescriptor::new("", 1))
            .with_service(ServiceDescriptor::new("idle", 2).with_replicas(0))
            .with_service(ServiceDescriptor::new("loop", 3).with_dependency("loop"));
        let report = validate(&config);
        assert!(report.issues.contains(&"Service at position 0 has an empty name".to_string()));
        assert!(report.issues.contains(&"Service 'idle' must declare at least 1 replica".to_string()));
        assert!(report.issues.contains(&"Service 'loop' depends on itself".to_string()));
    }

    #[test]
    fn test_production_ready_configuration() {
        let report = validate(&production_ready());
        assert!(report.is_valid(), "unexpected issues: {:?}", report.issues);
    }

    #[test]
    fn test_production_requires_tls_but_development_does_not() {
        let mut config = production_ready().with_tls(false);
        let report = validate(&config);
        assert!(!report.is_valid());
        assert_eq!(report.issues, vec!["TLS must be enabled in production"]);

        config.environment = Environment::Development;
        assert!(validate(&config).is_valid());
    }

    #[test]
    fn test_production_collects_every_violation() {
        let config = DeploymentConfiguration::new(Environment::Production, "prod", "main")
            .with_service(ServiceDescriptor::new("api", 8080));
        let report = validate(&config);
        assert_eq!(
            report.issues,
            vec![
                "TLS must be enabled in production",
                "Secret management is required in production",
                "Resource quotas is required in production",
                "Backup configuration is required in production",
                "Monitoring configuration is required in production",
                "Service 'api' must run at least 2 replicas in production (has 1)",
                "Service 'api' must declare resource limits in production",
            ]
        );
    }

    #[test]
    fn test_empty_sections_count_as_missing() {
        let mut config = production_ready();
        config.backup_config = Some(json!({}));
        let report = validate(&config);
        assert_eq!(report.issues, vec!["Backup configuration is required in production"]);
    }

    #[test]
    fn test_staging_monitoring_advisory_invalidates() {
        let mut config = DeploymentConfiguration::new(Environment::Staging, "stage", "main")
            .with_service(ServiceDescriptor::new("api", 8080));
        let report = validate(&config);
        assert!(!report.is_valid());
        assert_eq!(
            report.issues,
            vec!["Monitoring configuration is recommended in staging"]
        );

        config.monitoring_config = Some(json!({"grafana": "on"}));
        assert!(validate(&config).is_valid());
    }

    #[test]
    fn test_rule_sets_per_environment() {
        let dev = ConfigurationValidator::for_environment(Environment::Development);
        let prod = ConfigurationValidator::for_environment(Environment::Production);
        assert_eq!(dev.rule_names().len(), 5);
        assert!(prod.rule_names().contains(&"production-sections"));
        assert!(!dev.rule_names().contains(&"production-sections"));
    }

    #[test]
    fn test_custom_rule() {
        struct NoLatest;
        impl ValidationRule for NoLatest {
            fn name(&self) -> &'static str {
                "no-latest"
            }
            fn check(&self, config: &DeploymentConfiguration, issues: &mut Vec<String>) {
                for s in config.services.iter().filter(|s| s.version == "latest") {
                    issues.push(format!("Service '{}' uses an unpinned version", s.name));
                }
            }
        }

        let config = DeploymentConfiguration::new(Environment::Test, "ns", "cluster")
            .with_service(ServiceDescriptor::new("api", 8080));
        let report = ConfigurationValidator::empty()
            .with_rule(NoLatest)
            .validate(&config);
        assert_eq!(report.issues, vec!["Service 'api' uses an unpinned version"]);
    }
}

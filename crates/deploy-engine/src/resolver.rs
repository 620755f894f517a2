//! Dependency graph resolution
//!
//! Computes the order in which services are deployed so that every service
//! starts after all of its dependencies. Teardown uses the exact reverse.

use crate::descriptor::ServiceDescriptor;
use indexmap::IndexMap;
use std::collections::HashMap;
use tracing::debug;

/// Errors produced while resolving a deployment order
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The dependency graph contains a cycle
    #[error("Circular dependency detected involving service '{service}': {}", .cycle.join(" -> "))]
    Circular {
        /// Service reached again while its own dependencies were being visited
        service: String,
        /// The cycle, starting and ending with `service`
        cycle: Vec<String>,
    },

    /// A service depends on a name that is not declared
    #[error("Service '{service}' depends on unknown service '{dependency}'")]
    UnknownDependency {
        /// Service declaring the dependency
        service: String,
        /// Missing dependency name
        dependency: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Service dependency graph
///
/// Nodes keep the order in which services were declared, and each node's
/// edges keep the order in which its dependencies were declared. Both orders
/// feed the traversal, so the same input always yields the same result.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// service -> its dependencies
    edges: IndexMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Build a graph from service descriptors
    ///
    /// A duplicated name keeps its first declaration.
    pub fn from_services(services: &[ServiceDescriptor]) -> Self {
        let mut edges = IndexMap::new();
        for service in services {
            edges
                .entry(service.name.clone())
                .or_insert_with(|| service.dependencies.iter().cloned().collect());
        }
        Self { edges }
    }

    /// Number of services in the graph
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Whether the graph has no services
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Direct dependencies of a service
    pub fn dependencies_of(&self, service: &str) -> &[String] {
        self.edges.get(service).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Services that directly depend on `service`, in declaration order
    pub fn dependents_of(&self, service: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|(_, deps)| deps.iter().any(|d| d == service))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Topological order: dependencies first
    pub fn deployment_order(&self) -> Result<Vec<String>, ResolveError> {
        let mut marks: HashMap<&str, Mark> = HashMap::new();
        let mut path: Vec<&str> = Vec::new();
        let mut order = Vec::with_capacity(self.edges.len());

        for service in self.edges.keys() {
            if !marks.contains_key(service.as_str()) {
                self.visit(service, &mut marks, &mut path, &mut order)?;
            }
        }

        debug!("Resolved deployment order: {:?}", order);
        Ok(order)
    }

    /// Reverse topological order: dependents first
    pub fn shutdown_order(&self) -> Result<Vec<String>, ResolveError> {
        let mut order = self.deployment_order()?;
        order.reverse();
        Ok(order)
    }

    fn visit<'a>(
        &'a self,
        service: &'a str,
        marks: &mut HashMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
        order: &mut Vec<String>,
    ) -> Result<(), ResolveError> {
        match marks.get(service) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::InProgress) => {
                let start = path.iter().position(|s| *s == service).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(|s| s.to_string()).collect();
                cycle.push(service.to_string());
                return Err(ResolveError::Circular {
                    service: service.to_string(),
                    cycle,
                });
            }
            None => {}
        }

        marks.insert(service, Mark::InProgress);
        path.push(service);

        for dependency in self.dependencies_of(service) {
            if !self.edges.contains_key(dependency) {
                return Err(ResolveError::UnknownDependency {
                    service: service.to_string(),
                    dependency: dependency.clone(),
                });
            }
            self.visit(dependency, marks, path, order)?;
        }

        path.pop();
        marks.insert(service, Mark::Done);
        order.push(service.to_string());
        Ok(())
    }
}

/// Compute the deployment order of a set of services
pub fn compute_deployment_order(services: &[ServiceDescriptor]) -> Result<Vec<String>, ResolveError> {
    DependencyGraph::from_services(services).deployment_order()
}

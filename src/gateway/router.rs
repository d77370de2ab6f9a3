//! Prefix route table mapping request paths onto backend clusters

use arc_swap::ArcSwap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{ClusterConfig, RouteConfig, SelectionPolicy, Settings};
use crate::error::{GatewayError, Result};
use crate::gateway::load_balancer::DestinationSelector;

/// A named group of backend destinations
#[derive(Debug)]
pub struct Cluster {
    id: String,
    destinations: Vec<String>,
    selector: DestinationSelector,
}

impl Cluster {
    pub fn new(id: impl Into<String>, destinations: Vec<String>, policy: SelectionPolicy) -> Self {
        Self {
            id: id.into(),
            destinations: destinations
                .into_iter()
                .map(|d| d.trim_end_matches('/').to_string())
                .collect(),
            selector: DestinationSelector::new(policy),
        }
    }

    fn from_config(config: &ClusterConfig) -> Result<Self> {
        if config.destinations.is_empty() {
            return Err(GatewayError::config(format!(
                "Cluster '{}' must have at least one destination",
                config.id
            )));
        }
        Ok(Self::new(config.id.clone(), config.destinations.clone(), config.policy))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn destinations(&self) -> &[String] {
        &self.destinations
    }

    /// Next destination according to the cluster's selection policy
    pub fn next_destination(&self) -> Result<&str> {
        self.selector
            .select(&self.destinations)
            .ok_or_else(|| GatewayError::Internal(format!("Cluster '{}' has no destinations", self.id)))
    }
}

/// A path prefix bound to a cluster
#[derive(Debug, Clone)]
pub struct Route {
    pub prefix: String,
    pub cluster_id: String,
    /// Exempt from the auth gate
    pub public: bool,
    pub required_roles: HashSet<String>,
}

impl Route {
    /// Residual path if `path` lies under this route's prefix on a segment boundary
    fn strip(&self, path: &str) -> Option<String> {
        if self.prefix == "/" {
            return Some(path.to_string());
        }

        let rest = path.strip_prefix(self.prefix.as_str())?;
        if rest.is_empty() {
            Some("/".to_string())
        } else if rest.starts_with('/') {
            Some(rest.to_string())
        } else {
            None
        }
    }
}

/// Outcome of a successful resolution
#[derive(Debug, Clone)]
pub struct ResolvedRoute {
    pub route: Arc<Route>,
    pub cluster: Arc<Cluster>,
    pub residual_path: String,
}

/// Immutable route table, ordered by descending prefix length
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<(Arc<Route>, Arc<Cluster>)>,
}

/// Strip trailing slashes, keeping the root route as "/"
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

impl RouteTable {
    /// Build the table from route and cluster definitions
    pub fn build(routes: &[RouteConfig], clusters: &[ClusterConfig]) -> Result<Self> {
        let mut cluster_map: HashMap<&str, Arc<Cluster>> = HashMap::new();
        for config in clusters {
            let cluster = Arc::new(Cluster::from_config(config)?);
            if cluster_map.insert(config.id.as_str(), cluster).is_some() {
                return Err(GatewayError::config(format!("Duplicate cluster '{}'", config.id)));
            }
        }

        let mut seen = HashSet::new();
        let mut table = Vec::with_capacity(routes.len());
        for config in routes {
            if !config.prefix.starts_with('/') {
                return Err(GatewayError::config(format!(
                    "Route prefix '{}' must start with '/'",
                    config.prefix
                )));
            }

            let prefix = normalize_prefix(&config.prefix);
            if !seen.insert(prefix.clone()) {
                return Err(GatewayError::config(format!("Duplicate route prefix '{}'", prefix)));
            }

            let cluster = cluster_map.get(config.cluster.as_str()).cloned().ok_or_else(|| {
                GatewayError::config(format!(
                    "Route '{}' references unknown cluster '{}'",
                    prefix, config.cluster
                ))
            })?;

            let route = Route {
                prefix,
                cluster_id: config.cluster.clone(),
                public: config.public,
                required_roles: config.required_roles.iter().cloned().collect(),
            };
            table.push((Arc::new(route), cluster));
        }

        table.sort_by(|(a, _), (b, _)| b.prefix.len().cmp(&a.prefix.len()));

        Ok(Self { routes: table })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::build(&settings.routes, &settings.clusters)
    }

    /// Resolve a request path to its route, cluster and residual path
    pub fn resolve(&self, path: &str) -> Result<ResolvedRoute> {
        for (route, cluster) in &self.routes {
            if let Some(residual_path) = route.strip(path) {
                debug!(
                    path = %path,
                    prefix = %route.prefix,
                    cluster = %cluster.id(),
                    residual = %residual_path,
                    "Resolved route"
                );
                return Ok(ResolvedRoute {
                    route: route.clone(),
                    cluster: cluster.clone(),
                    residual_path,
                });
            }
        }

        Err(GatewayError::RouteNotFound(path.to_string()))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Route prefixes in match order
    pub fn prefixes(&self) -> Vec<&str> {
        self.routes.iter().map(|(r, _)| r.prefix.as_str()).collect()
    }
}

/// Route table published behind an atomic pointer.
///
/// Readers take a snapshot with [`SharedRouteTable::snapshot`]; a reload
/// builds a complete table first and swaps it in with a single store.
#[derive(Debug)]
pub struct SharedRouteTable {
    table: ArcSwap<RouteTable>,
}

impl SharedRouteTable {
    pub fn new(table: RouteTable) -> Self {
        Self {
            table: ArcSwap::from_pointee(table),
        }
    }

    pub fn snapshot(&self) -> Arc<RouteTable> {
        self.table.load_full()
    }

    pub fn resolve(&self, path: &str) -> Result<ResolvedRoute> {
        self.table.load().resolve(path)
    }

    /// Replace the whole table. A table that fails to build leaves the current one in place.
    pub fn reload(&self, settings: &Settings) -> Result<()> {
        let table = RouteTable::from_settings(settings)?;
        let count = table.len();
        self.table.store(Arc::new(table));
        info!(routes = count, "Route table reloaded");
        Ok(())
    }
}

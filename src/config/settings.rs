//! Gateway settings and configuration management

use crate::error::{GatewayError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
    #[serde(default)]
    pub clusters: Vec<ClusterConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Bearer token validation settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// JWT algorithm name, e.g. "HS256" or "RS256"
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    /// Shared secret for HMAC algorithms
    #[serde(default)]
    pub secret: Option<String>,
    /// PEM-encoded public key for asymmetric algorithms
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
    /// Claim holding the caller's roles (string or array of strings)
    #[serde(default = "default_roles_claim")]
    pub roles_claim: String,
    #[serde(default = "default_leeway")]
    pub leeway_secs: u64,
}

fn default_algorithm() -> String {
    "HS256".to_string()
}

fn default_roles_claim() -> String {
    "roles".to_string()
}

fn default_leeway() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

/// Upstream forwarding configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxyConfig {
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// Extra attempts after a connection failure, idempotent methods only
    #[serde(default)]
    pub retries: u32,
    #[serde(default = "default_max_body")]
    pub max_body_bytes: usize,
}

fn default_timeout() -> u64 {
    30000
}

fn default_connect_timeout() -> u64 {
    5000
}

fn default_max_body() -> usize {
    10 * 1024 * 1024
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout(),
            connect_timeout_ms: default_connect_timeout(),
            retries: 0,
            max_body_bytes: default_max_body(),
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_rps")]
    pub requests_per_second: u32,
    #[serde(default = "default_burst")]
    pub burst_size: u32,
}

fn default_rps() -> u32 {
    100
}

fn default_burst() -> u32 {
    200
}

/// Health monitoring configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthConfig {
    #[serde(default = "default_health_check_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_check_timeout")]
    pub timeout_ms: u64,
    /// JSON-lines file for the health log; in-memory when unset
    #[serde(default)]
    pub log_path: Option<String>,
    /// Records kept per service by the in-memory store
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default)]
    pub services: Vec<HealthTargetConfig>,
}

fn default_health_check_interval() -> u64 {
    30
}

fn default_check_timeout() -> u64 {
    5000
}

fn default_history_limit() -> usize {
    100
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_health_check_interval(),
            timeout_ms: default_check_timeout(),
            log_path: None,
            history_limit: default_history_limit(),
            services: vec![],
        }
    }
}

/// A single monitored service
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthTargetConfig {
    pub name: String,
    /// Full liveness URL, e.g. "http://users:8080/health"
    pub url: String,
    /// Overrides `health.interval_secs` for this service
    #[serde(default)]
    pub interval_secs: Option<u64>,
}

/// Audit collaborator configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuditConfig {
    /// Collector URL receiving JSON audit records; logged only when unset
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// A path prefix mapped onto a cluster
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    pub prefix: String,
    pub cluster: String,
    /// Skips the auth gate entirely (health endpoints and the like)
    #[serde(default)]
    pub public: bool,
    /// Caller must hold at least one of these roles
    #[serde(default)]
    pub required_roles: Vec<String>,
}

/// Destination selection across a cluster's destinations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    #[default]
    RoundRobin,
    First,
}

/// A named group of backend destinations
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClusterConfig {
    pub id: String,
    pub destinations: Vec<String>,
    #[serde(default)]
    pub policy: SelectionPolicy,
}

impl Settings {
    /// Load settings from the file named by `GATEWAY_CONFIG`, or `config/gateway.toml`
    pub fn load() -> Result<Self> {
        let path = std::env::var("GATEWAY_CONFIG").unwrap_or_else(|_| "config/gateway.toml".to_string());
        Self::load_from_path(path)
    }

    /// Load settings from a specific configuration file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path
            .as_ref()
            .to_str()
            .ok_or_else(|| GatewayError::config("Configuration path is not valid UTF-8"))?;

        let config = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("auth.algorithm", "HS256")?
            .set_default("rate_limit.enabled", true)?
            .set_default("rate_limit.requests_per_second", 100)?
            .set_default("rate_limit.burst_size", 200)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?
            .add_source(File::with_name(path).required(false))
            // Override with environment variables (prefixed with GATEWAY__)
            .add_source(
                Environment::with_prefix("GATEWAY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(config_error("Server port cannot be 0".to_string()));
        }

        let mut cluster_ids = HashSet::new();
        for cluster in &self.clusters {
            if cluster.id.is_empty() {
                return Err(config_error("Cluster id cannot be empty".to_string()));
            }
            if !cluster_ids.insert(cluster.id.as_str()) {
                return Err(config_error(format!("Duplicate cluster '{}'", cluster.id)));
            }
            if cluster.destinations.is_empty() {
                return Err(config_error(format!(
                    "Cluster '{}' must have at least one destination",
                    cluster.id
                )));
            }
            for destination in &cluster.destinations {
                if !destination.starts_with("http://") && !destination.starts_with("https://") {
                    return Err(config_error(format!(
                        "Cluster '{}' has invalid destination '{}'. Must be an http(s) URL",
                        cluster.id, destination
                    )));
                }
            }
        }

        for route in &self.routes {
            if !route.prefix.starts_with('/') {
                return Err(config_error(format!(
                    "Route prefix '{}' must start with '/'",
                    route.prefix
                )));
            }
            if !cluster_ids.contains(route.cluster.as_str()) {
                return Err(config_error(format!(
                    "Route '{}' references unknown cluster '{}'",
                    route.prefix, route.cluster
                )));
            }
        }

        let mut services = HashSet::new();
        for target in &self.health.services {
            if target.name.is_empty() {
                return Err(config_error("Health target name cannot be empty".to_string()));
            }
            if !services.insert(target.name.as_str()) {
                return Err(config_error(format!("Duplicate health target '{}'", target.name)));
            }
        }
        if self.health.interval_secs == 0 {
            return Err(config_error("health.interval_secs cannot be 0".to_string()));
        }
        if self.health.timeout_ms == 0 {
            return Err(config_error("health.timeout_ms cannot be 0".to_string()));
        }
        if self.proxy.timeout_ms == 0 || self.proxy.connect_timeout_ms == 0 {
            return Err(config_error("proxy timeouts cannot be 0".to_string()));
        }

        Ok(())
    }
}

fn config_error(message: String) -> GatewayError {
    GatewayError::config(message)
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
            },
            auth: AuthConfig {
                algorithm: default_algorithm(),
                secret: None,
                public_key: None,
                issuer: None,
                audience: None,
                roles_claim: default_roles_claim(),
                leeway_secs: default_leeway(),
            },
            proxy: ProxyConfig::default(),
            rate_limit: RateLimitConfig {
                enabled: true,
                requests_per_second: default_rps(),
                burst_size: default_burst(),
            },
            health: HealthConfig::default(),
            audit: AuditConfig::default(),
            logging: LoggingConfig {
                level: default_log_level(),
                format: default_log_format(),
            },
            routes: vec![],
            clusters: vec![],
        }
    }
}

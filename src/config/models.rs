//! Configuration data structures for the gateway.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files. They are
//! serde‑friendly and carry defaults so that a minimal config only needs the
//! service URLs. Durations are humantime strings (`"30s"`, `"500ms"`).
use std::{collections::BTreeMap, time::Duration};

use serde::{Deserialize, Serialize};

use crate::config::validation::{ValidationResult, parse_duration};

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:9000";
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_COOL_DOWN: &str = "30s";
pub const DEFAULT_FORWARD_TIMEOUT: &str = "5s";

/// Path every documentation alias rewrites to on its backend.
pub const API_DOCS_PATH: &str = "/api-docs";

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

/// Root configuration for the gateway.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub forwarding: ForwardingConfig,
    /// Backend services keyed by service id (`product`, `order`, ...).
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,
    /// Route table. Omitted means [`default_routes`].
    #[serde(default = "default_routes")]
    pub routes: Vec<RouteConfig>,
}

impl GatewayConfig {
    /// Create a new gateway configuration builder
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::default()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            logging: LoggingConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            forwarding: ForwardingConfig::default(),
            services: BTreeMap::new(),
            routes: default_routes(),
        }
    }
}

/// A single backend service.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Base URL, e.g. `http://localhost:8084`
    pub url: String,
    /// Per-service override of `forwarding.timeout`
    #[serde(default)]
    pub timeout: Option<String>,
}

impl ServiceConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: None,
        }
    }

    /// Parsed timeout override, if one is configured.
    pub fn timeout(&self, service: &str) -> ValidationResult<Option<Duration>> {
        self.timeout
            .as_deref()
            .map(|t| parse_duration(&format!("services.{service}.timeout"), t))
            .transpose()
    }
}

/// One entry of the route table.
///
/// A route with `rewrite` set is a documentation alias: the matched path
/// prefix is replaced by `rewrite` before forwarding.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RouteConfig {
    pub path: String,
    pub service: String,
    #[serde(default)]
    pub rewrite: Option<String>,
}

impl RouteConfig {
    pub fn api(path: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            service: service.into(),
            rewrite: None,
        }
    }

    pub fn docs(
        path: impl Into<String>,
        service: impl Into<String>,
        rewrite: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            service: service.into(),
            rewrite: Some(rewrite.into()),
        }
    }
}

/// The stock route table: one API prefix and one documentation alias for
/// each of the product, order and inventory services.
pub fn default_routes() -> Vec<RouteConfig> {
    ["product", "order", "inventory"]
        .into_iter()
        .flat_map(|service| {
            [
                RouteConfig::api(format!("/api/{service}"), service),
                RouteConfig::docs(
                    format!("/aggregate/{service}-service/v3/api-docs"),
                    service,
                    API_DOCS_PATH,
                ),
            ]
        })
        .collect()
}

/// Circuit breaker tuning shared by every service.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip a closed breaker
    pub failure_threshold: u32,
    /// How long an open breaker rejects traffic before admitting a probe
    pub cool_down: String,
}

impl CircuitBreakerConfig {
    pub fn cool_down(&self) -> ValidationResult<Duration> {
        parse_duration("circuit_breaker.cool_down", &self.cool_down)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cool_down: DEFAULT_COOL_DOWN.to_string(),
        }
    }
}

/// Outbound call settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ForwardingConfig {
    /// Upper bound on waiting for a backend's response headers
    pub timeout: String,
}

impl ForwardingConfig {
    pub fn timeout(&self) -> ValidationResult<Duration> {
        parse_duration("forwarding.timeout", &self.timeout)
    }
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_FORWARD_TIMEOUT.to_string(),
        }
    }
}

/// Log output format
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence when set
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Builder for GatewayConfig to allow for cleaner configuration creation
#[derive(Default)]
pub struct GatewayConfigBuilder {
    listen_addr: Option<String>,
    services: BTreeMap<String, ServiceConfig>,
    routes: Option<Vec<RouteConfig>>,
    circuit_breaker: CircuitBreakerConfig,
    forwarding: ForwardingConfig,
    logging: LoggingConfig,
}

impl GatewayConfigBuilder {
    /// Set the listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = Some(addr.into());
        self
    }

    /// Register a backend service
    pub fn service(mut self, id: impl Into<String>, url: impl Into<String>) -> Self {
        self.services.insert(id.into(), ServiceConfig::new(url));
        self
    }

    /// Register a backend service with its own timeout
    pub fn service_with_timeout(
        mut self,
        id: impl Into<String>,
        url: impl Into<String>,
        timeout: impl Into<String>,
    ) -> Self {
        self.services.insert(
            id.into(),
            ServiceConfig {
                url: url.into(),
                timeout: Some(timeout.into()),
            },
        );
        self
    }

    /// Add a route; the first call replaces the default route table
    pub fn route(mut self, route: RouteConfig) -> Self {
        self.routes.get_or_insert_with(Vec::new).push(route);
        self
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.circuit_breaker.failure_threshold = threshold;
        self
    }

    pub fn cool_down(mut self, cool_down: impl Into<String>) -> Self {
        self.circuit_breaker.cool_down = cool_down.into();
        self
    }

    pub fn forward_timeout(mut self, timeout: impl Into<String>) -> Self {
        self.forwarding.timeout = timeout.into();
        self
    }

    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    /// Build the final GatewayConfig
    pub fn build(self) -> GatewayConfig {
        GatewayConfig {
            listen_addr: self.listen_addr.unwrap_or_else(default_listen_addr),
            logging: self.logging,
            circuit_breaker: self.circuit_breaker,
            forwarding: self.forwarding,
            services: self.services,
            routes: self.routes.unwrap_or_else(default_routes),
        }
    }
}

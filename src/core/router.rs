//! Static route table and path matching.
//!
//! Routes are compiled once from configuration and never change afterwards.
//! Matching is longest-prefix on whole path segments: `/api/order` matches
//! `/api/order` and `/api/order/7` but not `/api/orders`.
use std::collections::HashSet;

use crate::config::{RouteConfig, ValidationError, ValidationResult};

/// What a route does with the matched path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteKind {
    /// Forward the path unchanged
    Api,
    /// Replace the matched prefix with `rewrite_target` before forwarding
    Documentation { rewrite_target: String },
}

/// One compiled route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pattern: String,
    service_id: String,
    kind: RouteKind,
}

impl Route {
    pub fn api(pattern: impl Into<String>, service_id: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            service_id: service_id.into(),
            kind: RouteKind::Api,
        }
    }

    pub fn documentation(
        pattern: impl Into<String>,
        service_id: impl Into<String>,
        rewrite_target: impl Into<String>,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            service_id: service_id.into(),
            kind: RouteKind::Documentation {
                rewrite_target: rewrite_target.into(),
            },
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn rewrite_target(&self) -> Option<&str> {
        match &self.kind {
            RouteKind::Api => None,
            RouteKind::Documentation { rewrite_target } => Some(rewrite_target),
        }
    }

    /// True when `path` is this route's pattern or lies beneath it.
    pub fn matches(&self, path: &str) -> bool {
        match path.strip_prefix(self.pattern.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/') || self.pattern.ends_with('/'),
            None => false,
        }
    }

    /// The path to send to the backend for a request that matched this route.
    pub fn forward_path(&self, path: &str) -> String {
        match &self.kind {
            RouteKind::Api => path.to_string(),
            RouteKind::Documentation { rewrite_target } => {
                let rest = path.get(self.pattern.len()..).unwrap_or_default();
                if rest.is_empty() {
                    rewrite_target.clone()
                } else {
                    format!("{}{}", rewrite_target.trim_end_matches('/'), rest)
                }
            }
        }
    }

    fn from_config(config: &RouteConfig) -> ValidationResult<Self> {
        match &config.rewrite {
            None => Ok(Self::api(&config.path, &config.service)),
            Some(target) if target.starts_with('/') => {
                Ok(Self::documentation(&config.path, &config.service, target))
            }
            Some(_) => Err(ValidationError::InvalidField {
                field: format!("route '{}' rewrite", config.path),
                message: "Rewrite targets must be non-empty and start with '/'".to_string(),
            }),
        }
    }
}

/// The immutable set of routes consulted for every request.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Build a table, rejecting duplicate patterns.
    pub fn new(routes: Vec<Route>) -> ValidationResult<Self> {
        let mut seen = HashSet::new();
        for route in &routes {
            if !seen.insert(route.pattern.as_str()) {
                return Err(ValidationError::RouteConflict {
                    message: format!("duplicate route path: {}", route.pattern),
                });
            }
        }
        Ok(Self { routes })
    }

    pub fn from_config(routes: &[RouteConfig]) -> ValidationResult<Self> {
        let routes = routes
            .iter()
            .map(Route::from_config)
            .collect::<ValidationResult<Vec<_>>>()?;
        Self::new(routes)
    }

    /// Longest‑prefix match to find the route for an incoming path.
    pub fn find(&self, path: &str) -> Option<&Route> {
        self.routes
            .iter()
            .filter(|route| route.matches(path))
            .max_by_key(|route| route.pattern.len())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

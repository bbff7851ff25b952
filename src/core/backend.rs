//! Backend registry: service id → base URL (+ optional timeout override).
use std::{collections::HashMap, fmt, str::FromStr, time::Duration};

use thiserror::Error;

use crate::config::GatewayConfig;

/// Errors related to backend operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BackendError {
    /// Error when URL is invalid
    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),

    /// A route or request named a service the registry does not know
    #[error("Unknown service '{0}'")]
    UnknownService(String),

    /// A service timeout override could not be parsed
    #[error("Invalid timeout for service '{service}': {reason}")]
    InvalidTimeout { service: String, reason: String },
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// A type-safe representation of a backend URL
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackendUrl {
    /// The underlying URL as a string, without trailing slash
    url: String,
    /// Whether the URL is secure (HTTPS)
    is_secure: bool,
}

impl BackendUrl {
    /// Creates a new BackendUrl if the provided string is a valid URL
    ///
    /// # Arguments
    /// * `url` - The URL string to validate and wrap
    ///
    /// # Returns
    /// A result containing the BackendUrl or an error
    pub fn new(url: &str) -> BackendResult<Self> {
        // Basic validation - ensure URL starts with http:// or https://
        let is_secure = url.starts_with("https://");
        let is_http = url.starts_with("http://");

        if !is_secure && !is_http {
            return Err(BackendError::InvalidUrl(format!(
                "Backend URL must start with http:// or https://, got: {url}"
            )));
        }

        let uri = url
            .parse::<http::Uri>()
            .map_err(|e| BackendError::InvalidUrl(format!("{url}: {e}")))?;
        if uri.host().is_none() {
            return Err(BackendError::InvalidUrl(format!(
                "Backend URL has no host: {url}"
            )));
        }

        Ok(BackendUrl {
            url: url.trim_end_matches('/').to_string(),
            is_secure,
        })
    }

    /// Get the underlying URL as a string reference
    pub fn as_str(&self) -> &str {
        &self.url
    }

    /// Check if the URL is using HTTPS
    pub fn is_secure(&self) -> bool {
        self.is_secure
    }

    /// Compose an absolute URL from this base, a request path and an optional query.
    pub fn join(&self, path: &str, query: Option<&str>) -> String {
        let mut out = String::with_capacity(
            self.url.len() + path.len() + query.map_or(0, |q| q.len() + 1) + 1,
        );
        out.push_str(&self.url);
        if !path.starts_with('/') {
            out.push('/');
        }
        out.push_str(path);
        if let Some(query) = query {
            out.push('?');
            out.push_str(query);
        }
        out
    }
}

impl FromStr for BackendUrl {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BackendUrl::new(s)
    }
}

impl fmt::Display for BackendUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// One backend the gateway forwards to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTarget {
    id: String,
    url: BackendUrl,
    timeout: Option<Duration>,
}

impl ServiceTarget {
    pub fn new(id: impl Into<String>, url: BackendUrl) -> Self {
        Self {
            id: id.into(),
            url,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn url(&self) -> &BackendUrl {
        &self.url
    }

    /// Timeout override for this service, if any
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Immutable mapping from service id to [`ServiceTarget`], built once at startup.
#[derive(Debug, Clone, Default)]
pub struct BackendRegistry {
    targets: HashMap<String, ServiceTarget>,
}

impl BackendRegistry {
    pub fn new(targets: impl IntoIterator<Item = ServiceTarget>) -> Self {
        Self {
            targets: targets
                .into_iter()
                .map(|t| (t.id.clone(), t))
                .collect(),
        }
    }

    /// Build the registry from the `services` section of the configuration.
    pub fn from_config(config: &GatewayConfig) -> BackendResult<Self> {
        let mut targets = Vec::with_capacity(config.services.len());
        for (id, service) in &config.services {
            let mut target = ServiceTarget::new(id, BackendUrl::new(&service.url)?);
            let timeout = service
                .timeout(id)
                .map_err(|e| BackendError::InvalidTimeout {
                    service: id.clone(),
                    reason: e.to_string(),
                })?;
            if let Some(timeout) = timeout {
                target = target.with_timeout(timeout);
            }
            targets.push(target);
        }
        Ok(Self::new(targets))
    }

    /// Look up a service, failing with [`BackendError::UnknownService`].
    pub fn resolve(&self, service_id: &str) -> BackendResult<&ServiceTarget> {
        self.targets
            .get(service_id)
            .ok_or_else(|| BackendError::UnknownService(service_id.to_string()))
    }

    pub fn contains(&self, service_id: &str) -> bool {
        self.targets.contains_key(service_id)
    }

    /// All registered service ids, in no particular order.
    pub fn service_ids(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

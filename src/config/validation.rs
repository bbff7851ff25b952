#![allow(clippy::collapsible_if)]

use std::{collections::HashSet, net::SocketAddr, time::Duration};

use crate::config::models::{GatewayConfig, RouteConfig, ServiceConfig};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Route '{path}' references unknown service '{service}'")]
    UnknownService { path: String, service: String },

    #[error("Route conflict detected: {message}")]
    RouteConflict { message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Parse a humantime duration field, rejecting zero.
pub fn parse_duration(field: &str, value: &str) -> ValidationResult<Duration> {
    let duration =
        humantime::parse_duration(value).map_err(|e| ValidationError::InvalidField {
            field: field.to_string(),
            message: format!("'{value}' is not a valid duration: {e}"),
        })?;
    if duration.is_zero() {
        return Err(ValidationError::InvalidField {
            field: field.to_string(),
            message: "Duration must be greater than zero".to_string(),
        });
    }
    Ok(duration)
}

/// Gateway configuration validator
pub struct GatewayConfigValidator;

impl GatewayConfigValidator {
    /// Validate the entire gateway configuration, reporting every problem at once
    pub fn validate(config: &GatewayConfig) -> ValidationResult<()> {
        let errors = Self::collect_errors(config);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Run every check and return the individual failures
    pub fn collect_errors(config: &GatewayConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        if config.services.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "services".to_string(),
            });
        }
        for (id, service) in &config.services {
            errors.extend(Self::validate_service(id, service));
        }

        if config.routes.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "routes".to_string(),
            });
        }
        for route in &config.routes {
            errors.extend(Self::validate_route(route));
            if !config.services.contains_key(&route.service) {
                errors.push(ValidationError::UnknownService {
                    path: route.path.clone(),
                    service: route.service.clone(),
                });
            }
        }
        if let Err(e) = Self::check_route_conflicts(&config.routes) {
            errors.push(e);
        }

        if config.circuit_breaker.failure_threshold == 0 {
            errors.push(ValidationError::InvalidField {
                field: "circuit_breaker.failure_threshold".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }
        if let Err(e) = config.circuit_breaker.cool_down() {
            errors.push(e);
        }
        if let Err(e) = config.forwarding.timeout() {
            errors.push(e);
        }

        errors
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:9000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    fn validate_service(id: &str, service: &ServiceConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if let Err(e) = Self::validate_url(&service.url, &format!("services.{id}.url")) {
            errors.push(e);
        }
        if let Err(e) = service.timeout(id) {
            errors.push(e);
        }
        errors
    }

    fn validate_route(route: &RouteConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let path = &route.path;

        if !path.starts_with('/') {
            errors.push(ValidationError::InvalidField {
                field: format!("route path: {path}"),
                message: "Route paths must start with '/'".to_string(),
            });
        }

        if let Some(rewrite) = &route.rewrite {
            if !rewrite.starts_with('/') {
                errors.push(ValidationError::InvalidField {
                    field: format!("route '{path}' rewrite"),
                    message: "Rewrite targets must be non-empty and start with '/'".to_string(),
                });
            }
        }

        errors
    }

    /// Validate URL format
    fn validate_url(url: &str, field_name: &str) -> ValidationResult<()> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ValidationError::InvalidField {
                field: field_name.to_string(),
                message: format!("URL must start with http:// or https://, got: {url}"),
            });
        }
        if url.parse::<http::Uri>().is_err() {
            return Err(ValidationError::InvalidField {
                field: field_name.to_string(),
                message: format!("'{url}' is not a valid URL"),
            });
        }
        Ok(())
    }

    /// Path patterns must be unique across the table
    fn check_route_conflicts(routes: &[RouteConfig]) -> ValidationResult<()> {
        let mut seen = HashSet::new();
        let duplicates: Vec<&str> = routes
            .iter()
            .filter(|r| !seen.insert(r.path.as_str()))
            .map(|r| r.path.as_str())
            .collect();

        if duplicates.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::RouteConflict {
                message: format!("duplicate route paths: {}", duplicates.join(", ")),
            })
        }
    }

    /// Format multiple errors into a readable message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} configuration errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}

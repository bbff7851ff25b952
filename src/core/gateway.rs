//! Core gateway orchestration service.
//!
//! The `GatewayService` owns everything built from configuration at startup:
//! the route table, one circuit breaker per service and the forwarder. For
//! each request it:
//! * finds the longest matching route (404 when none)
//! * asks the service's breaker for admission (fallback when denied)
//! * forwards, records the outcome, then relays the backend's response or
//!   serves the fallback when no response came back
//!
//! Everything except the outbound call is in-memory and synchronous, so the
//! service can be driven end-to-end with a fake [`HttpClient`].
use std::sync::Arc;

use axum::{
    body::Body as AxumBody,
    response::{IntoResponse, Response},
};
use eyre::{Result, WrapErr};
use http::{Request, StatusCode, header};
use thiserror::Error;

use crate::{
    config::{GatewayConfig, GatewayConfigValidator},
    core::{
        backend::{BackendError, BackendRegistry},
        circuit_breaker::{BreakerSettings, CircuitBreakers},
        fallback,
        forwarder::{ForwardOutcome, Forwarder},
        router::RouteTable,
    },
    ports::{
        clock::{Clock, SystemClock},
        http_client::{HttpClient, HttpClientError},
    },
};

/// Per-request failures. Each one becomes a response at the router boundary.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GatewayError {
    /// No route matches the request path
    #[error("No route found for {path}")]
    RouteNotFound { path: String },

    /// The service's breaker refused admission
    #[error("Circuit breaker for service '{service}' is open")]
    BreakerOpen { service: String },

    /// The backend produced no response
    #[error("Backend '{service}' did not respond: {source}")]
    Network {
        service: String,
        #[source]
        source: HttpClientError,
    },

    /// A route resolved to a service the registry does not know
    #[error("Unknown service '{service}'")]
    UnknownService { service: String },

    #[error(transparent)]
    Backend(BackendError),
}

impl From<BackendError> for GatewayError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::UnknownService(service) => GatewayError::UnknownService { service },
            other => GatewayError::Backend(other),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match self {
            GatewayError::RouteNotFound { path } => (
                StatusCode::NOT_FOUND,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                format!("No route found for {path}"),
            )
                .into_response(),
            _ => fallback::respond(),
        }
    }
}

/// Central orchestrator for routing, admission and forwarding.
///
/// Construct once with [`GatewayService::new`] and share behind an `Arc`;
/// all request-time state lives in the per-service breakers.
pub struct GatewayService {
    routes: RouteTable,
    breakers: CircuitBreakers,
    forwarder: Forwarder,
}

impl GatewayService {
    /// Build the gateway from a configuration using the system clock.
    pub fn new(config: &GatewayConfig, client: Arc<dyn HttpClient>) -> Result<Self> {
        Self::with_clock(config, client, Arc::new(SystemClock))
    }

    /// Build the gateway with an explicit clock for the circuit breakers.
    ///
    /// Fails when the configuration does not validate, so a route can never
    /// reference a service without a backend.
    pub fn with_clock(
        config: &GatewayConfig,
        client: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        GatewayConfigValidator::validate(config).wrap_err("Invalid gateway configuration")?;

        let registry = Arc::new(
            BackendRegistry::from_config(config).wrap_err("Failed to build backend registry")?,
        );
        let routes =
            RouteTable::from_config(&config.routes).wrap_err("Failed to build route table")?;
        if let Some(route) = routes.iter().find(|r| !registry.contains(r.service_id())) {
            return Err(eyre::Report::new(BackendError::UnknownService(
                route.service_id().to_string(),
            ))
            .wrap_err(format!("Route '{}' has no backend", route.pattern())));
        }

        let settings = BreakerSettings::from_config(&config.circuit_breaker)
            .wrap_err("Invalid circuit breaker settings")?;
        let breakers = CircuitBreakers::new(registry.service_ids(), settings, clock);
        let default_timeout = config
            .forwarding
            .timeout()
            .wrap_err("Invalid forwarding timeout")?;

        for target in registry.service_ids().filter_map(|id| registry.resolve(id).ok()) {
            tracing::info!(
                service = %target.id(),
                url = %target.url(),
                timeout = %humantime::format_duration(target.timeout().unwrap_or(default_timeout)),
                "Configured backend"
            );
        }
        for route in routes.iter() {
            match route.rewrite_target() {
                Some(target) => tracing::info!(
                    "Configured route: {} -> {} (rewritten to {})",
                    route.pattern(),
                    route.service_id(),
                    target
                ),
                None => tracing::info!(
                    "Configured route: {} -> {}",
                    route.pattern(),
                    route.service_id()
                ),
            }
        }
        tracing::info!(
            failure_threshold = settings.failure_threshold,
            cool_down = %humantime::format_duration(settings.cool_down),
            "Circuit breakers ready for {} services",
            breakers.len()
        );

        Ok(Self {
            routes,
            breakers,
            forwarder: Forwarder::new(registry, client, default_timeout),
        })
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn breakers(&self) -> &CircuitBreakers {
        &self.breakers
    }

    /// Handle one inbound request. Never fails: every error maps to a response.
    pub async fn route(&self, req: Request<AxumBody>) -> Response {
        match self.dispatch(req).await {
            Ok(response) => response,
            Err(err) => {
                match &err {
                    GatewayError::RouteNotFound { path } => {
                        tracing::debug!(path = %path, "No route found");
                    }
                    GatewayError::BreakerOpen { service } => {
                        tracing::debug!(
                            service = %service,
                            "Request rejected by open circuit breaker"
                        );
                    }
                    GatewayError::Network { service, source } => {
                        tracing::warn!(
                            service = %service,
                            error = %source,
                            "Backend request failed, serving fallback"
                        );
                    }
                    other => {
                        tracing::error!(
                            error = %other,
                            "Request could not be forwarded, serving fallback"
                        );
                    }
                }
                err.into_response()
            }
        }
    }

    /// Route, admit, forward and record. Backend responses of any status are `Ok`.
    pub async fn dispatch(&self, req: Request<AxumBody>) -> Result<Response, GatewayError> {
        let path = req.uri().path().to_string();
        let route = self
            .routes
            .find(&path)
            .ok_or_else(|| GatewayError::RouteNotFound { path: path.clone() })?;
        let service = route.service_id();
        tracing::info!(
            service = %service,
            route = %route.pattern(),
            method = %req.method(),
            uri = %req.uri(),
            "Routing request"
        );

        let admission = self
            .breakers
            .allow(service)
            .ok_or_else(|| GatewayError::BreakerOpen {
                service: service.to_string(),
            })?;

        let forward_path = route.forward_path(&path);
        let outcome = self.forwarder.forward(service, &forward_path, req).await?;

        let result = outcome.result();
        tracing::debug!(
            service = %service,
            probe = admission.is_probe(),
            success = result.success,
            status = ?result.status,
            "Recording backend result"
        );
        self.breakers.record(admission, &result);

        match outcome {
            ForwardOutcome::Responded(response) => {
                if response.status().is_server_error() {
                    tracing::warn!(
                        service = %service,
                        status = %response.status(),
                        "Backend returned server error"
                    );
                }
                Ok(response)
            }
            ForwardOutcome::Failed(source) => Err(GatewayError::Network {
                service: service.to_string(),
                source,
            }),
        }
    }
}

//! gatekeep - a path-routing API gateway with per-service circuit breakers.
//!
//! gatekeep sits in front of a fixed set of backend services (product, order
//! and inventory by default), implementing a **hexagonal architecture**. It
//! forwards each request to the service whose path prefix matches, relays
//! the backend's response verbatim and answers with a uniform `503` when the
//! backend is down or its circuit breaker is open.
//!
//! # Features
//! - Longest-prefix routing on whole path segments, `404` for everything else
//! - Documentation aliases that rewrite an aggregated public path to a
//!   backend's own `/api-docs`
//! - One circuit breaker per service (CLOSED / OPEN / HALF_OPEN) with a
//!   configurable failure threshold and cool-down, and a single probe
//! - Bounded per-service forward timeouts, no retries
//! - Structured tracing via `tracing`
//! - Graceful shutdown on SIGINT / SIGTERM
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use gatekeep::{GatewayService, HttpClientAdapter, HttpHandler};
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let cfg = gatekeep::config::load_config("gatekeep.toml").await?;
//! let gateway = GatewayService::new(&cfg, Arc::new(HttpClientAdapter::new()?))?;
//! let app = HttpHandler::new(Arc::new(gateway)).into_router();
//! let listener = tokio::net::TcpListener::bind(&cfg.listen_addr).await?;
//! axum::serve(listener, app).await?;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits: the outbound [`HttpClient`] and the
//! breakers' [`ports::Clock`]) from **adapters** (hyper client, axum handler)
//! while keeping routing, admission and forwarding logic inside `core`.
//!
//! # Error Handling
//! Startup and configuration APIs return `eyre::Result<T>` with `WrapErr`
//! context. Per-request failures are [`core::GatewayError`] values that turn
//! into a `404` or the fallback `503` at the router boundary.
pub mod config;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{HttpClientAdapter, HttpHandler},
    core::{GatewayError, GatewayService},
    ports::http_client::HttpClient,
    utils::GracefulShutdown,
};

//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::{
    convert::Infallible,
    pin::Pin,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    task::{Context, Poll},
    time::Duration,
};

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use gatekeep::{
    config::GatewayConfig,
    core::GatewayService,
    ports::{HttpClient, HttpClientError, HttpClientResult, ManualClock},
};
use http::{Request, Response, StatusCode};
use http_body_util::BodyExt;
use hyper::body::{Body as HttpBody, Bytes, Frame};

/// What the scripted backend does with the next request.
#[derive(Debug, Clone)]
pub enum Behavior {
    Respond(u16, &'static str),
    /// Never answers; only the forward timeout ends the call
    Hang,
    /// Sends the status line and headers, then never yields a body frame
    StallBody(u16),
    Refuse,
}

struct StalledBody;

impl HttpBody for StalledBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
        Poll::Pending
    }
}

/// A fake [`HttpClient`] that follows a script and records every call.
pub struct ScriptedClient {
    behavior: Mutex<Behavior>,
    calls: AtomicUsize,
    uris: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(behavior),
            calls: AtomicUsize::new(0),
            uris: Mutex::new(Vec::new()),
        })
    }

    pub fn set(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    /// Number of outbound calls attempted so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Absolute URIs of every outbound call, in order
    pub fn uris(&self) -> Vec<String> {
        self.uris.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for ScriptedClient {
    async fn send_request(&self, req: Request<AxumBody>) -> HttpClientResult<Response<AxumBody>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.uris.lock().unwrap().push(req.uri().to_string());

        let behavior = self.behavior.lock().unwrap().clone();
        match behavior {
            Behavior::Respond(status, body) => Ok(Response::builder()
                .status(status)
                .body(AxumBody::from(body))
                .unwrap()),
            Behavior::Hang => std::future::pending().await,
            Behavior::StallBody(status) => Ok(Response::builder()
                .status(status)
                .body(AxumBody::new(StalledBody))
                .unwrap()),
            Behavior::Refuse => Err(HttpClientError::ConnectionError(
                "connection refused".to_string(),
            )),
        }
    }
}

pub const COOL_DOWN: Duration = Duration::from_secs(30);

/// Three services, default routes, threshold 5, 30s cool-down and a short timeout.
pub fn test_config() -> GatewayConfig {
    GatewayConfig::builder()
        .service("product", "http://product:8084")
        .service("order", "http://order:8082")
        .service("inventory", "http://inventory:8083")
        .failure_threshold(5)
        .cool_down("30s")
        .forward_timeout("50ms")
        .build()
}

pub struct TestGateway {
    pub gateway: GatewayService,
    pub client: Arc<ScriptedClient>,
    pub clock: Arc<ManualClock>,
}

pub fn test_gateway(behavior: Behavior) -> TestGateway {
    test_gateway_with(&test_config(), behavior)
}

pub fn test_gateway_with(config: &GatewayConfig, behavior: Behavior) -> TestGateway {
    let client = ScriptedClient::new(behavior);
    let clock = Arc::new(ManualClock::new());
    let gateway = GatewayService::with_clock(config, client.clone(), clock.clone())
        .expect("test config is valid");
    TestGateway {
        gateway,
        client,
        clock,
    }
}

pub fn get(uri: &str) -> Request<AxumBody> {
    Request::get(uri).body(AxumBody::empty()).unwrap()
}

pub async fn read(response: Response<AxumBody>) -> (StatusCode, String) {
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

//! Request forwarding to a resolved backend.
//!
//! The forwarder rebuilds the outbound request against the service's base URL
//! and strips hop-by-hop headers in both directions. One deadline, the
//! service's timeout, covers the response headers and the full body; the body
//! is buffered before it is relayed, so a backend that stalls mid-body fails
//! the same way as one that never answers. It never retries and never
//! interprets the backend's status code; classification into success or
//! failure happens in [`ForwardResult`].
use std::{sync::Arc, time::Duration};

use axum::body::Body as AxumBody;
use http::{HeaderMap, HeaderName, Request, Response, StatusCode, Uri, header};
use http_body_util::BodyExt;
use tokio::time::timeout;

use crate::{
    core::backend::{BackendRegistry, BackendResult},
    ports::http_client::{HttpClient, HttpClientError, HttpClientResult},
};

/// Headers that describe a single connection and are never forwarded.
static HOP_BY_HOP_HEADERS: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Why a forward attempt produced no response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Timeout,
    Connection,
    InvalidRequest,
}

impl From<&HttpClientError> for ErrorKind {
    fn from(err: &HttpClientError) -> Self {
        match err {
            HttpClientError::Timeout(_) => ErrorKind::Timeout,
            HttpClientError::ConnectionError(_) => ErrorKind::Connection,
            _ => ErrorKind::InvalidRequest,
        }
    }
}

/// Summary of one forward attempt, as seen by the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardResult {
    pub success: bool,
    pub status: Option<StatusCode>,
    pub error: Option<ErrorKind>,
}

impl ForwardResult {
    /// The backend answered. Only 5xx counts against it.
    pub fn responded(status: StatusCode) -> Self {
        Self {
            success: !status.is_server_error(),
            status: Some(status),
            error: None,
        }
    }

    /// The backend could not be reached or did not answer in time.
    pub fn failed(kind: ErrorKind) -> Self {
        Self {
            success: false,
            status: None,
            error: Some(kind),
        }
    }
}

/// What came back from the backend.
#[derive(Debug)]
pub enum ForwardOutcome {
    /// A response with any status code, to be relayed as-is
    Responded(Response<AxumBody>),
    /// No response was received
    Failed(HttpClientError),
}

impl ForwardOutcome {
    pub fn result(&self) -> ForwardResult {
        match self {
            ForwardOutcome::Responded(response) => ForwardResult::responded(response.status()),
            ForwardOutcome::Failed(err) => ForwardResult::failed(err.into()),
        }
    }
}

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed.iter().chain(HOP_BY_HOP_HEADERS.iter()) {
        headers.remove(name);
    }
}

/// Sends requests to the backend a route resolved to.
pub struct Forwarder {
    registry: Arc<BackendRegistry>,
    client: Arc<dyn HttpClient>,
    default_timeout: Duration,
}

impl Forwarder {
    pub fn new(
        registry: Arc<BackendRegistry>,
        client: Arc<dyn HttpClient>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            client,
            default_timeout,
        }
    }

    /// Timeout applied to `service_id`: its override, else the gateway default.
    pub fn timeout_for(&self, service_id: &str) -> Duration {
        self.registry
            .resolve(service_id)
            .ok()
            .and_then(|target| target.timeout())
            .unwrap_or(self.default_timeout)
    }

    /// Forward `req` to `service_id` with its path replaced by `forward_path`.
    ///
    /// Fails only when the service is unknown. Transport problems are
    /// reported as [`ForwardOutcome::Failed`].
    pub async fn forward(
        &self,
        service_id: &str,
        forward_path: &str,
        req: Request<AxumBody>,
    ) -> BackendResult<ForwardOutcome> {
        let target = self.registry.resolve(service_id)?;
        let limit = target.timeout().unwrap_or(self.default_timeout);

        let (mut parts, body) = req.into_parts();
        let url = target.url().join(forward_path, parts.uri.query());
        let uri = match url.parse::<Uri>() {
            Ok(uri) => uri,
            Err(e) => {
                return Ok(ForwardOutcome::Failed(HttpClientError::InvalidRequest(
                    format!("{url}: {e}"),
                )));
            }
        };

        strip_hop_by_hop(&mut parts.headers);
        // The client sets Host from the backend URI.
        parts.headers.remove(header::HOST);
        parts.uri = uri;

        tracing::debug!(
            service = %service_id,
            method = %parts.method,
            upstream = %parts.uri,
            timeout = %humantime::format_duration(limit),
            "Forwarding request"
        );

        let outbound = Request::from_parts(parts, body);
        let outcome = match timeout(limit, self.exchange(outbound)).await {
            Ok(Ok(response)) => ForwardOutcome::Responded(response),
            Ok(Err(e)) => ForwardOutcome::Failed(e),
            Err(_) => ForwardOutcome::Failed(HttpClientError::Timeout(limit)),
        };
        Ok(outcome)
    }

    /// Send the request and read the complete response.
    async fn exchange(&self, req: Request<AxumBody>) -> HttpClientResult<Response<AxumBody>> {
        let response = self.client.send_request(req).await?;
        let (mut parts, body) = response.into_parts();
        let bytes = body
            .collect()
            .await
            .map_err(|e| {
                HttpClientError::ConnectionError(format!("Failed to read response body: {e}"))
            })?
            .to_bytes();

        strip_hop_by_hop(&mut parts.headers);
        Ok(Response::from_parts(parts, AxumBody::from(bytes)))
    }
}

#[cfg(test)]
mod tests {
    use std::{
        convert::Infallible,
        pin::Pin,
        sync::Mutex,
        task::{Context, Poll},
    };

    use async_trait::async_trait;
    use http::Method;
    use hyper::body::{Body as HttpBody, Bytes, Frame};

    use super::*;
    use crate::core::backend::{BackendError, ServiceTarget};

    /// Captures the outbound request and answers with a fixed status.
    struct RecordingClient {
        status: StatusCode,
        seen: Mutex<Option<http::request::Parts>>,
    }

    #[async_trait]
    impl HttpClient for RecordingClient {
        async fn send_request(
            &self,
            req: Request<AxumBody>,
        ) -> HttpClientResult<Response<AxumBody>> {
            let (parts, _) = req.into_parts();
            *self.seen.lock().unwrap() = Some(parts);
            Ok(Response::builder()
                .status(self.status)
                .header(header::CONNECTION, "keep-alive, x-backend-hop")
                .header("x-backend-hop", "1")
                .header("x-request-id", "abc")
                .body(AxumBody::from("ok"))
                .unwrap())
        }
    }

    struct HangingClient;

    #[async_trait]
    impl HttpClient for HangingClient {
        async fn send_request(
            &self,
            _req: Request<AxumBody>,
        ) -> HttpClientResult<Response<AxumBody>> {
            std::future::pending().await
        }
    }

    /// Sends headers at once, then never yields a body frame.
    struct StalledBodyClient;

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

    #[async_trait]
    impl HttpClient for StalledBodyClient {
        async fn send_request(
            &self,
            _req: Request<AxumBody>,
        ) -> HttpClientResult<Response<AxumBody>> {
            Ok(Response::new(AxumBody::new(StalledBody)))
        }
    }

    fn registry() -> Arc<BackendRegistry> {
        Arc::new(BackendRegistry::new([
            ServiceTarget::new("order", "http://order:8082".parse().unwrap()),
            ServiceTarget::new("inventory", "http://inventory:8083".parse().unwrap())
                .with_timeout(Duration::from_millis(20)),
        ]))
    }

    fn recording(status: StatusCode) -> Arc<RecordingClient> {
        Arc::new(RecordingClient {
            status,
            seen: Mutex::new(None),
        })
    }

    #[test]
    fn test_result_classification() {
        assert!(ForwardResult::responded(StatusCode::OK).success);
        assert!(ForwardResult::responded(StatusCode::FOUND).success);
        assert!(ForwardResult::responded(StatusCode::NOT_FOUND).success);
        assert!(ForwardResult::responded(StatusCode::TOO_MANY_REQUESTS).success);
        assert!(!ForwardResult::responded(StatusCode::INTERNAL_SERVER_ERROR).success);
        assert!(!ForwardResult::responded(StatusCode::SERVICE_UNAVAILABLE).success);

        let failed = ForwardResult::failed(ErrorKind::Connection);
        assert!(!failed.success);
        assert_eq!(failed.status, None);
        assert_eq!(failed.error, Some(ErrorKind::Connection));
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, "close, x-secret".parse().unwrap());
        headers.insert("x-secret", "1".parse().unwrap());
        headers.insert(header::TRANSFER_ENCODING, "chunked".parse().unwrap());
        headers.insert(header::UPGRADE, "websocket".parse().unwrap());
        headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key(header::CONTENT_TYPE));
    }

    #[tokio::test]
    async fn test_forward_rewrites_uri_and_headers() {
        let client = recording(StatusCode::CREATED);
        let forwarder = Forwarder::new(registry(), client.clone(), Duration::from_secs(5));

        let req = Request::builder()
            .method(Method::POST)
            .uri("/aggregate/order-service/v3/api-docs?group=public")
            .header(header::HOST, "gateway.local")
            .header(header::TE, "trailers")
            .header(header::AUTHORIZATION, "Bearer t")
            .body(AxumBody::from("{}"))
            .unwrap();

        let outcome = forwarder.forward("order", "/api-docs", req).await.unwrap();
        let ForwardOutcome::Responded(response) = outcome else {
            panic!("expected a response");
        };
        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(!response.headers().contains_key(header::CONNECTION));
        assert!(!response.headers().contains_key("x-backend-hop"));
        assert_eq!(response.headers()["x-request-id"], "abc");

        let seen = client.seen.lock().unwrap().take().unwrap();
        assert_eq!(seen.method, Method::POST);
        assert_eq!(
            seen.uri.to_string(),
            "http://order:8082/api-docs?group=public"
        );
        assert!(!seen.headers.contains_key(header::HOST));
        assert!(!seen.headers.contains_key(header::TE));
        assert_eq!(seen.headers[header::AUTHORIZATION], "Bearer t");
    }

    #[tokio::test]
    async fn test_forward_relays_server_errors() {
        let forwarder = Forwarder::new(
            registry(),
            recording(StatusCode::INTERNAL_SERVER_ERROR),
            Duration::from_secs(5),
        );
        let req = Request::get("/api/order/1").body(AxumBody::empty()).unwrap();

        let outcome = forwarder.forward("order", "/api/order/1", req).await.unwrap();
        assert!(matches!(&outcome, ForwardOutcome::Responded(r) if r.status() == 500));
        assert!(!outcome.result().success);
    }

    #[tokio::test]
    async fn test_forward_timeout_uses_service_override() {
        let forwarder =
            Forwarder::new(registry(), Arc::new(HangingClient), Duration::from_secs(60));
        assert_eq!(forwarder.timeout_for("inventory"), Duration::from_millis(20));
        assert_eq!(forwarder.timeout_for("order"), Duration::from_secs(60));

        let req = Request::get("/api/inventory").body(AxumBody::empty()).unwrap();
        let outcome = forwarder.forward("inventory", "/api/inventory", req).await.unwrap();

        match outcome {
            ForwardOutcome::Failed(HttpClientError::Timeout(limit)) => {
                assert_eq!(limit, Duration::from_millis(20));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_forward_timeout_covers_response_body() {
        let forwarder =
            Forwarder::new(registry(), Arc::new(StalledBodyClient), Duration::from_secs(60));
        let req = Request::get("/api/inventory").body(AxumBody::empty()).unwrap();

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            forwarder.forward("inventory", "/api/inventory", req),
        )
        .await
        .expect("forward must give up on a stalled body")
        .unwrap();

        assert!(matches!(
            &outcome,
            ForwardOutcome::Failed(HttpClientError::Timeout(limit))
                if *limit == Duration::from_millis(20)
        ));
        assert_eq!(outcome.result().error, Some(ErrorKind::Timeout));
    }

    #[tokio::test]
    async fn test_forward_unknown_service() {
        let forwarder =
            Forwarder::new(registry(), recording(StatusCode::OK), Duration::from_secs(5));
        let req = Request::get("/api/billing").body(AxumBody::empty()).unwrap();

        let err = forwarder.forward("billing", "/api/billing", req).await.unwrap_err();
        assert_eq!(err, BackendError::UnknownService("billing".to_string()));
    }
}

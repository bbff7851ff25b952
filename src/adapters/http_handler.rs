use std::sync::Arc;

use axum::{
    Router,
    body::Body as AxumBody,
    extract::{Request, State},
    response::Response,
    routing::any,
};
use tower_http::trace::TraceLayer;

use crate::core::GatewayService;

/// HTTP handler for the gateway: every method on every path goes through
/// [`GatewayService::route`].
#[derive(Clone)]
pub struct HttpHandler {
    gateway_service: Arc<GatewayService>,
}

impl HttpHandler {
    pub fn new(gateway_service: Arc<GatewayService>) -> Self {
        Self { gateway_service }
    }

    /// Main request handler
    pub async fn handle_request(&self, req: Request) -> Response<AxumBody> {
        tracing::debug!("Handling {} request to {}", req.method(), req.uri().path());
        self.gateway_service.route(req).await
    }

    /// Build the axum router serving the gateway, with a request span per call.
    pub fn into_router(self) -> Router {
        Router::new()
            .route("/", any(proxy))
            .route("/{*path}", any(proxy))
            .with_state(self)
            .layer(TraceLayer::new_for_http())
    }
}

async fn proxy(State(handler): State<HttpHandler>, req: Request) -> Response<AxumBody> {
    handler.handle_request(req).await
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use http::StatusCode;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        config::GatewayConfig,
        core::fallback::FALLBACK_MESSAGE,
        ports::http_client::{HttpClient, HttpClientError, HttpClientResult},
    };

    struct RefusingClient;

    #[async_trait]
    impl HttpClient for RefusingClient {
        async fn send_request(
            &self,
            _req: axum::http::Request<AxumBody>,
        ) -> HttpClientResult<Response<AxumBody>> {
            Err(HttpClientError::ConnectionError("connection refused".to_string()))
        }
    }

    fn create_test_router() -> Router {
        let config = GatewayConfig::builder()
            .service("product", "http://127.0.0.1:1")
            .service("order", "http://127.0.0.1:1")
            .service("inventory", "http://127.0.0.1:1")
            .build();
        let gateway = GatewayService::new(&config, Arc::new(RefusingClient)).unwrap();
        HttpHandler::new(Arc::new(gateway)).into_router()
    }

    async fn call(router: Router, method: &str, uri: &str) -> (StatusCode, String) {
        let req = axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .body(AxumBody::empty())
            .unwrap();
        let response = router.oneshot(req).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_root_has_no_route() {
        let (status, body) = call(create_test_router(), "GET", "/").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "No route found for /");
    }

    #[tokio::test]
    async fn test_any_method_reaches_gateway() {
        for method in ["GET", "POST", "PUT", "DELETE", "PATCH"] {
            let (status, body) = call(create_test_router(), method, "/api/order/1").await;
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{method}");
            assert_eq!(body, FALLBACK_MESSAGE);
        }
    }
}

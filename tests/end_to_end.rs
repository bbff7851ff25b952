//! Gateway in front of real HTTP backends through the hyper client adapter.
use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router,
    body::Body as AxumBody,
    extract::Request,
    http::{StatusCode, header},
    routing::{any, get},
};
use gatekeep::{
    HttpClientAdapter, HttpHandler,
    config::GatewayConfig,
    core::{BreakerStatus, GatewayService, fallback::FALLBACK_MESSAGE},
};
use tokio::net::TcpListener;
use tower::ServiceExt;

mod common;

use common::read;

/// Start a backend on an ephemeral port and return its address.
async fn start_backend(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

fn order_backend() -> Router {
    Router::new()
        .route(
            "/api/order",
            get(|| async { "[]" }).post(|| async { (StatusCode::CREATED, "order placed") }),
        )
        .route(
            "/api/order/fail",
            any(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "db down") }),
        )
        .route(
            "/api-docs",
            get(|| async {
                (
                    [(header::CONTENT_TYPE, "application/json")],
                    "{\"openapi\":\"3.0.1\"}",
                )
            }),
        )
        .route(
            "/api/order/echo",
            any(|req: Request| async move {
                let host = req
                    .headers()
                    .get(header::HOST)
                    .and_then(|h| h.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                let query = req.uri().query().unwrap_or_default().to_string();
                format!("{} {} host={host} query={query}", req.method(), req.uri().path())
            }),
        )
}

/// Reserve a port and release it so nothing is listening there.
async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

async fn gateway_router(order_url: &str, threshold: u32) -> Router {
    let down = closed_port_url().await;
    let config = GatewayConfig::builder()
        .service("product", down.clone())
        .service("order", order_url)
        .service("inventory", down)
        .failure_threshold(threshold)
        .forward_timeout("2s")
        .build();
    let client = Arc::new(HttpClientAdapter::new().unwrap());
    let gateway = GatewayService::new(&config, client).unwrap();
    HttpHandler::new(Arc::new(gateway)).into_router()
}

fn request(method: &str, uri: &str) -> Request {
    axum::http::Request::builder()
        .method(method)
        .uri(uri)
        .body(AxumBody::empty())
        .unwrap()
}

#[tokio::test]
async fn test_proxies_to_live_backend() {
    let addr = start_backend(order_backend()).await;
    let app = gateway_router(&format!("http://{addr}"), 5).await;

    let response = app.clone().oneshot(request("GET", "/api/order")).await.unwrap();
    let (status, body) = read(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "[]");

    let response = app.clone().oneshot(request("POST", "/api/order")).await.unwrap();
    let (status, body) = read(response).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, "order placed");

    let (status, body) = read(
        app.oneshot(request("PUT", "/api/order/echo?id=7"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, format!("PUT /api/order/echo host={addr} query=id=7"));
}

#[tokio::test]
async fn test_documentation_alias_against_live_backend() {
    let addr = start_backend(order_backend()).await;
    let app = gateway_router(&format!("http://{addr}"), 5).await;

    let response = app
        .oneshot(request("GET", "/aggregate/order-service/v3/api-docs"))
        .await
        .unwrap();
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/json"
    );
    let (status, body) = read(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "{\"openapi\":\"3.0.1\"}");
}

#[tokio::test]
async fn test_unreachable_backend_serves_fallback() {
    let addr = start_backend(order_backend()).await;
    let app = gateway_router(&format!("http://{addr}"), 5).await;

    let response = app.oneshot(request("GET", "/api/product/1")).await.unwrap();
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/plain; charset=utf-8"
    );
    let (status, body) = read(response).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, FALLBACK_MESSAGE);
}

#[tokio::test]
async fn test_backend_errors_relayed_then_breaker_opens() {
    let addr = start_backend(order_backend()).await;
    let down = closed_port_url().await;
    let config = GatewayConfig::builder()
        .service("product", down.clone())
        .service("order", format!("http://{addr}"))
        .service("inventory", down)
        .failure_threshold(2)
        .build();
    let client = Arc::new(HttpClientAdapter::new().unwrap());
    let gateway = Arc::new(GatewayService::new(&config, client).unwrap());
    let app = HttpHandler::new(gateway.clone()).into_router();

    for _ in 0..2 {
        let (status, body) = read(
            app.clone()
                .oneshot(request("GET", "/api/order/fail"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "db down");
    }
    assert_eq!(
        gateway.breakers().snapshot("order").unwrap().status,
        BreakerStatus::Open
    );

    // Even healthy paths on the same service are now short-circuited
    let (status, body) = read(app.oneshot(request("GET", "/api/order")).await.unwrap()).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, FALLBACK_MESSAGE);
}

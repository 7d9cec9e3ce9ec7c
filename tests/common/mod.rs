//! Shared utilities for integration tests.

#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceExt;

use opspulse::config::{ChaosConfig, ServiceConfig};
use opspulse::http::{build_router, routes, with_layers, AppState};
use opspulse::lifecycle::Shutdown;
use opspulse::{HttpServer, ServiceMetrics};

/// Fresh router and state with isolated metrics.
pub fn test_app(chaos: ChaosConfig) -> (Router, AppState) {
    let metrics = Arc::new(ServiceMetrics::new().unwrap());
    let state = AppState::new(metrics, &chaos);
    let router = build_router(state.clone(), Duration::from_secs(30));
    (router, state)
}

pub fn default_app() -> (Router, AppState) {
    test_app(ChaosConfig::default())
}

/// Service routes plus `extra`, all behind the production middleware stack.
pub fn app_with_routes(extra: Router<AppState>, request_timeout: Duration) -> (Router, AppState) {
    let metrics = Arc::new(ServiceMetrics::new().unwrap());
    let state = AppState::new(metrics, &ChaosConfig::default());
    let router = with_layers(routes().merge(extra), state.clone(), request_timeout);
    (router, state)
}

/// Issue a GET through the router without a socket.
pub async fn get(router: &Router, uri: &str) -> Response {
    router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn get_json(router: &Router, uri: &str) -> (StatusCode, Value) {
    let response = get(router, uri).await;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

pub async fn get_text(router: &Router, uri: &str) -> (StatusCode, String) {
    let response = get(router, uri).await;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

/// A server bound to an ephemeral port.
pub struct LiveServer {
    pub addr: SocketAddr,
    pub state: AppState,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<Result<(), std::io::Error>>,
}

impl LiveServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn start_live_server(config: ServiceConfig) -> LiveServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = HttpServer::new(config).unwrap();
    let state = server.state().clone();
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let handle = tokio::spawn(async move { server.run(listener, server_shutdown).await });

    LiveServer {
        addr,
        state,
        shutdown,
        handle,
    }
}

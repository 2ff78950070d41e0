use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::{info, warn};

use crate::config::GatewayConfig;
use crate::connection::run_connection;
use crate::origin::OriginAllowList;
use crate::retry::RetryPolicy;
use crate::subscribe::PushStrategy;

/// One gateway flavor: validates request paths and binds a push strategy
/// to each accepted connection.
pub trait GatewayFlavor: Send + Sync + 'static {
    type Push: PushStrategy + 'static;

    fn name(&self) -> &'static str;

    /// Body returned with a 400 when `bind` rejects the path.
    fn reject_message(&self) -> &'static str;

    fn bind(&self, path: &str) -> Option<Self::Push>;
}

/// Shared state behind the router.
pub struct Gateway<F: GatewayFlavor> {
    pub config: GatewayConfig,
    pub redis: redis::Client,
    pub flavor: F,
    pub retry: RetryPolicy,
    pub origins: OriginAllowList,
    pub metrics: Option<PrometheusHandle>,
}

/// `/health`, `/metrics`, and a wildcard GET that upgrades to a WebSocket
/// after path and origin validation. Non-GET methods on matched routes get
/// a 405 from axum's method routing.
pub fn router<F: GatewayFlavor>(gateway: Arc<Gateway<F>>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler::<F>))
        .route("/*path", get(ws_handler::<F>))
        .with_state(gateway)
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn metrics_handler<F: GatewayFlavor>(State(gateway): State<Arc<Gateway<F>>>) -> Response {
    match &gateway.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn ws_handler<F: GatewayFlavor>(
    State(gateway): State<Arc<Gateway<F>>>,
    Path(path): Path<String>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let path = match path.strip_suffix('/') {
        Some(stripped) => stripped.to_string(),
        None => path,
    };

    let Some(push) = gateway.flavor.bind(&path) else {
        return (StatusCode::BAD_REQUEST, gateway.flavor.reject_message()).into_response();
    };

    let origin = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok());
    if !gateway.origins.allows(origin) {
        warn!(origin = ?origin, path = %path, "origin not allowed");
        return StatusCode::FORBIDDEN.into_response();
    }

    let max_message_size = gateway.config.max_message_size;
    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| async move {
            info!(service = gateway.flavor.name(), path = %path, "client connected");
            let result = run_connection(
                socket,
                gateway.redis.clone(),
                &gateway.config,
                gateway.retry.clone(),
                push,
            )
            .await;
            match result {
                Ok(()) => {}
                Err(err) if err.is_clean_close() => {}
                Err(err) => warn!(path = %path, error = %err, "connection ended with error"),
            }
            info!(service = gateway.flavor.name(), path = %path, "client disconnected");
        })
}

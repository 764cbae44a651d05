use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;

use super::{alerts, health, ingest, metrics, ws};
use crate::engine::AlertEngine;
use crate::metrics::EngineMetrics;
use crate::notifier::WsBroadcaster;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AlertEngine>,
    pub ws: WsBroadcaster,
    pub metrics: Arc<EngineMetrics>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/ready", get(health::ready))
        .route("/metrics", get(metrics::metrics))
        .route("/write", post(ingest::write))
        .route("/alerts", get(alerts::list_alerts))
        .route("/alerts/{alert_id}/acknowledge", post(alerts::acknowledge))
        .route("/ws", get(ws::upgrade))
        .with_state(state)
}

pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

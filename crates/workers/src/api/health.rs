use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use super::server::AppState;
use crate::alert::AlertFilter;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub rules: usize,
    pub tracked_pairs: usize,
    pub websocket_clients: usize,
}

pub async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        rules: state.engine.rules().enabled_rules().len(),
        tracked_pairs: state.engine.tracker().len(),
        websocket_clients: state.ws.client_count(),
    })
}

/// Ready once the alert store answers a query.
pub async fn ready(State(state): State<AppState>) -> StatusCode {
    let filter = AlertFilter {
        limit: Some(1),
        ..AlertFilter::default()
    };
    match state.engine.lifecycle().store().list(&filter).await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "alert store not ready");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

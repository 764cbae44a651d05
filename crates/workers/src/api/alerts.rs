use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use super::server::AppState;
use crate::alert::{AlertEvent, AlertFilter, AlertStatus};

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
    pub host: Option<String>,
    pub rule_id: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct AcknowledgeRequest {
    pub by: String,
}

pub async fn list_alerts(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<AlertEvent>>, StatusCode> {
    let status = match params.status.as_deref() {
        None => None,
        Some(s) => Some(AlertStatus::parse(s).ok_or(StatusCode::BAD_REQUEST)?),
    };
    let filter = AlertFilter {
        status,
        host: params.host,
        rule_id: params.rule_id,
        limit: Some(params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT)),
    };

    state
        .engine
        .lifecycle()
        .store()
        .list(&filter)
        .await
        .map(Json)
        .map_err(|e| {
            tracing::error!(error = %e, "failed to list alerts");
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

pub async fn acknowledge(
    State(state): State<AppState>,
    Path(alert_id): Path<String>,
    Json(body): Json<AcknowledgeRequest>,
) -> StatusCode {
    if body.by.trim().is_empty() {
        return StatusCode::BAD_REQUEST;
    }
    let now_ms = hostwatch_common::clock::now_ms();
    match state
        .engine
        .lifecycle()
        .store()
        .acknowledge(&alert_id, &body.by, now_ms)
        .await
    {
        Ok(true) => {
            tracing::info!(alert_id = %alert_id, by = %body.by, "alert acknowledged");
            StatusCode::NO_CONTENT
        }
        // Unknown id, or not in the triggered state.
        Ok(false) => StatusCode::CONFLICT,
        Err(e) => {
            tracing::error!(alert_id = %alert_id, error = %e, "failed to acknowledge alert");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

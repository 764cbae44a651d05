use axum::extract::State;
use axum::http::StatusCode;
use hostwatch_common::line_protocol::{parse_batch, FieldValue, Sample};
use serde::Serialize;
use std::collections::HashMap;

use super::server::AppState;
use crate::notifier::{Broadcaster, TOPIC_METRIC_UPDATE};

#[derive(Serialize)]
struct MetricUpdate<'a> {
    measurement: &'a str,
    host: &'a str,
    fields: &'a HashMap<String, FieldValue>,
    time: String,
}

/// Line-protocol webhook. Malformed lines are logged and skipped; valid lines
/// are evaluated in body order and streamed to websocket clients.
pub async fn write(State(state): State<AppState>, body: String) -> StatusCode {
    let (samples, errors) = parse_batch(&body);

    if !errors.is_empty() {
        state.metrics.add_lines_rejected(errors.len() as u64);
        for (line, err) in &errors {
            tracing::warn!(line, error = %err, "skipping malformed metric line");
        }
    }

    for sample in &samples {
        state
            .engine
            .process_sample(
                &sample.measurement,
                &sample.host,
                &sample.fields,
                sample.timestamp_ms(),
            )
            .await;
        forward(&state, sample);
    }

    tracing::debug!(accepted = samples.len(), rejected = errors.len(), "metric batch processed");
    StatusCode::NO_CONTENT
}

fn forward(state: &AppState, sample: &Sample) {
    if state.ws.client_count() == 0 {
        return;
    }
    let update = MetricUpdate {
        measurement: &sample.measurement,
        host: &sample.host,
        fields: &sample.fields,
        time: hostwatch_common::clock::ms_to_rfc3339(sample.timestamp_ms()),
    };
    let result = serde_json::to_value(&update)
        .map_err(|e| e.to_string())
        .and_then(|payload| {
            state
                .ws
                .broadcast(TOPIC_METRIC_UPDATE, payload)
                .map_err(|e| e.to_string())
        });
    if let Err(e) = result {
        tracing::warn!(host = %sample.host, error = %e, "metric update not forwarded");
    }
}

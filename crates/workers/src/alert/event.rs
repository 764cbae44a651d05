use serde::{Deserialize, Serialize};

use super::rule::{Comparison, Rule, Severity};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: String,
    pub rule_id: String,
    pub rule_name: String,
    pub host: String,
    pub metric_type: String,
    pub comparison: Comparison,
    pub severity: Severity,
    pub status: AlertStatus,
    pub value: f64,
    pub threshold: f64,
    pub message: String,
    pub triggered_at_ms: i64,
    pub acknowledged_at_ms: Option<i64>,
    pub acknowledged_by: Option<String>,
    pub resolved_at_ms: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Triggered,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Triggered => "triggered",
            Self::Acknowledged => "acknowledged",
            Self::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "triggered" => Some(Self::Triggered),
            "acknowledged" => Some(Self::Acknowledged),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }

    pub fn is_open(self) -> bool {
        self != Self::Resolved
    }
}

impl AlertEvent {
    pub fn triggered(rule: &Rule, host: &str, value: f64, now_ms: i64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            host: host.to_string(),
            metric_type: rule.metric_type.clone(),
            comparison: rule.comparison,
            severity: rule.severity,
            status: AlertStatus::Triggered,
            value,
            threshold: rule.threshold,
            message: alert_message(rule, host, value),
            triggered_at_ms: now_ms,
            acknowledged_at_ms: None,
            acknowledged_by: None,
            resolved_at_ms: None,
        }
    }

    /// Compact `"<METRIC> <value> <symbol> <threshold>"` form.
    pub fn summary(&self) -> String {
        format!(
            "{} {} {} {}",
            self.metric_type.to_uppercase(),
            self.value,
            self.comparison.symbol(),
            self.threshold
        )
    }

    /// Payload pushed to websocket clients.
    pub fn broadcast_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "rule_id": self.rule_id,
            "rule_name": self.rule_name,
            "host": self.host,
            "value": self.value,
            "message": self.message,
            "comparison": self.comparison.as_str(),
            "threshold": self.threshold,
            "metric_type": self.metric_type,
            "severity": self.severity.as_str(),
            "triggered_at": hostwatch_common::clock::ms_to_rfc3339(self.triggered_at_ms),
            "status": self.status.as_str(),
        })
    }
}

pub fn alert_message(rule: &Rule, host: &str, value: f64) -> String {
    format!(
        "{} on {} {} threshold: {} (threshold: {})",
        metric_title(&rule.metric_type),
        host,
        rule.comparison.phrase(),
        value,
        rule.threshold
    )
}

/// `"cpu.usage_percent"` becomes `"Cpu Usage Percent"`.
fn metric_title(metric_type: &str) -> String {
    metric_type
        .split(['.', '_'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

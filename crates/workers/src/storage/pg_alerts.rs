use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::alert::{AlertEvent, AlertEventStore, AlertFilter, AlertStatus, StoreError};

const COLUMNS: &str = "id, rule_id, rule_name, host, metric_type, comparison, severity, status, \
     value, threshold, message, triggered_at_ms, acknowledged_at_ms, acknowledged_by, resolved_at_ms";

/// PostgreSQL-backed alert events. The partial unique index on
/// `(rule_id, host) WHERE status <> 'resolved'` rejects a second open alert
/// even when two workers race past `find_open`.
#[derive(Clone)]
pub struct PgAlertStore {
    pool: PgPool,
}

impl PgAlertStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AlertEventStore for PgAlertStore {
    async fn find_open(&self, rule_id: &str, host: &str) -> Result<Option<AlertEvent>, StoreError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM alert_events \
             WHERE rule_id = $1 AND host = $2 AND status <> 'resolved' \
             ORDER BY triggered_at_ms DESC LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(rule_id)
            .bind(host)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| from_row(&r)).transpose()
    }

    async fn insert(&self, event: &AlertEvent) -> Result<String, StoreError> {
        let result = sqlx::query(
            r#"INSERT INTO alert_events
               (id, rule_id, rule_name, host, metric_type, comparison, severity, status,
                value, threshold, message, triggered_at_ms, acknowledged_at_ms,
                acknowledged_by, resolved_at_ms)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"#,
        )
        .bind(&event.id)
        .bind(&event.rule_id)
        .bind(&event.rule_name)
        .bind(&event.host)
        .bind(&event.metric_type)
        .bind(event.comparison.as_str())
        .bind(event.severity.as_str())
        .bind(event.status.as_str())
        .bind(event.value)
        .bind(event.threshold)
        .bind(&event.message)
        .bind(event.triggered_at_ms)
        .bind(event.acknowledged_at_ms)
        .bind(event.acknowledged_by.as_deref())
        .bind(event.resolved_at_ms)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(event.id.clone()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::DuplicateOpen {
                    rule_id: event.rule_id.clone(),
                    host: event.host.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn resolve(&self, id: &str, resolved_at_ms: i64) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE alert_events SET status = 'resolved', resolved_at_ms = $2 \
             WHERE id = $1 AND status <> 'resolved'",
        )
        .bind(id)
        .bind(resolved_at_ms)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn acknowledge(&self, id: &str, by: &str, at_ms: i64) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE alert_events \
             SET status = 'acknowledged', acknowledged_at_ms = $2, acknowledged_by = $3 \
             WHERE id = $1 AND status = 'triggered'",
        )
        .bind(id)
        .bind(at_ms)
        .bind(by)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, filter: &AlertFilter) -> Result<Vec<AlertEvent>, StoreError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM alert_events \
             WHERE ($1::text IS NULL OR status = $1) \
               AND ($2::text IS NULL OR host = $2) \
               AND ($3::text IS NULL OR rule_id = $3) \
             ORDER BY triggered_at_ms DESC \
             LIMIT $4"
        );
        let limit = filter.limit.map(|l| l as i64).unwrap_or(i64::MAX);
        let rows = sqlx::query(&sql)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.host.as_deref())
            .bind(filter.rule_id.as_deref())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(from_row).collect()
    }
}

fn from_row(row: &PgRow) -> Result<AlertEvent, StoreError> {
    let status: String = row.try_get("status")?;
    let comparison: String = row.try_get("comparison")?;
    let severity: String = row.try_get("severity")?;

    Ok(AlertEvent {
        id: row.try_get("id")?,
        rule_id: row.try_get("rule_id")?,
        rule_name: row.try_get("rule_name")?,
        host: row.try_get("host")?,
        metric_type: row.try_get("metric_type")?,
        comparison: parse_label(&comparison)?,
        severity: parse_label(&severity)?,
        status: AlertStatus::parse(&status)
            .ok_or_else(|| StoreError::Backend(format!("unknown status {status}")))?,
        value: row.try_get("value")?,
        threshold: row.try_get("threshold")?,
        message: row.try_get("message")?,
        triggered_at_ms: row.try_get("triggered_at_ms")?,
        acknowledged_at_ms: row.try_get("acknowledged_at_ms")?,
        acknowledged_by: row.try_get("acknowledged_by")?,
        resolved_at_ms: row.try_get("resolved_at_ms")?,
    })
}

fn parse_label<T: serde::de::DeserializeOwned>(label: &str) -> Result<T, StoreError> {
    serde_json::from_value(serde_json::Value::String(label.to_string()))
        .map_err(|e| StoreError::Backend(format!("bad column value {label}: {e}")))
}

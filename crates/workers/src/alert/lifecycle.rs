use std::sync::Arc;

use super::event::{AlertEvent, AlertStatus};
use super::rule::Rule;
use super::store::{AlertEventStore, StoreError};
use crate::metrics::EngineMetrics;
use crate::notifier::NotificationDispatcher;

#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    Created(AlertEvent),
    AlreadyOpen(AlertEvent),
    /// Persistence failed; nothing was recorded or sent.
    Failed,
}

impl TriggerOutcome {
    pub fn event(&self) -> Option<&AlertEvent> {
        match self {
            Self::Created(e) | Self::AlreadyOpen(e) => Some(e),
            Self::Failed => None,
        }
    }
}

/// Opens and resolves persisted alerts. Callers hold the (rule, host) breach
/// lock across every call so check-then-insert cannot interleave in-process;
/// the store's duplicate guard covers other processes.
pub struct AlertLifecycle {
    store: Arc<dyn AlertEventStore>,
    dispatcher: Arc<NotificationDispatcher>,
    metrics: Arc<EngineMetrics>,
}

impl AlertLifecycle {
    pub fn new(
        store: Arc<dyn AlertEventStore>,
        dispatcher: Arc<NotificationDispatcher>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            metrics,
        }
    }

    pub fn store(&self) -> &Arc<dyn AlertEventStore> {
        &self.store
    }

    pub fn dispatcher(&self) -> &Arc<NotificationDispatcher> {
        &self.dispatcher
    }

    pub async fn on_core_fired(&self, rule: &Rule, host: &str, value: f64, now_ms: i64) -> TriggerOutcome {
        match self.store.find_open(&rule.id, host).await {
            Ok(Some(open)) => {
                self.metrics.inc_duplicates_suppressed();
                tracing::debug!(rule_id = %rule.id, host, alert_id = %open.id, "alert already open");
                return TriggerOutcome::AlreadyOpen(open);
            }
            Ok(None) => {}
            Err(e) => {
                self.persistence_failed(rule, host, "find_open", &e);
                return TriggerOutcome::Failed;
            }
        }

        let event = AlertEvent::triggered(rule, host, value, now_ms);
        match self.store.insert(&event).await {
            Ok(_) => {
                self.metrics.inc_alerts_triggered();
                tracing::info!(
                    rule_id = %rule.id,
                    host,
                    alert_id = %event.id,
                    severity = rule.severity.as_str(),
                    value,
                    threshold = rule.threshold,
                    "alert triggered"
                );
                self.dispatcher.alert_created(rule, &event, now_ms);
                TriggerOutcome::Created(event)
            }
            Err(StoreError::DuplicateOpen { .. }) => {
                self.metrics.inc_duplicates_suppressed();
                match self.open_alert(&rule.id, host).await {
                    Some(open) => TriggerOutcome::AlreadyOpen(open),
                    None => TriggerOutcome::Failed,
                }
            }
            Err(e) => {
                self.persistence_failed(rule, host, "insert", &e);
                TriggerOutcome::Failed
            }
        }
    }

    /// Resolves the open alert only when the core threshold and every
    /// configured channel lane are clear for `value`.
    pub async fn resolve_if_clear(&self, rule: &Rule, host: &str, value: f64, now_ms: i64) -> Option<AlertEvent> {
        if !rule.is_clear(value) {
            return None;
        }

        let mut open = self.open_alert(&rule.id, host).await?;
        match self.store.resolve(&open.id, now_ms).await {
            Ok(true) => {
                open.status = AlertStatus::Resolved;
                open.resolved_at_ms = Some(now_ms);
                self.metrics.inc_alerts_resolved();
                tracing::info!(rule_id = %rule.id, host, alert_id = %open.id, value, "alert resolved");
                self.dispatcher.alert_resolved(&open);
                Some(open)
            }
            Ok(false) => None,
            Err(e) => {
                self.persistence_failed(rule, host, "resolve", &e);
                None
            }
        }
    }

    pub async fn open_alert(&self, rule_id: &str, host: &str) -> Option<AlertEvent> {
        match self.store.find_open(rule_id, host).await {
            Ok(open) => open,
            Err(e) => {
                self.metrics.inc_persistence_errors();
                tracing::error!(rule_id, host, error = %e, "failed to look up open alert");
                None
            }
        }
    }

    fn persistence_failed(&self, rule: &Rule, host: &str, op: &str, err: &StoreError) {
        self.metrics.inc_persistence_errors();
        tracing::error!(rule_id = %rule.id, host, op, error = %err, "alert persistence failed");
    }
}

use hostwatch_common::line_protocol::FieldValue;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::alert::{
    AlertEvent, AlertLifecycle, BreachState, BreachTracker, LaneFirings, Rule, RuleStore,
    TriggerOutcome,
};
use crate::metrics::EngineMetrics;
use crate::notifier::{Channel, DeliveryOutcome};
use crate::poller::LastSeenIndex;

/// Metric evaluated by the liveness poller rather than by ingestion.
pub const UPTIME_METRIC: &str = "uptime.status";
pub const UPTIME_MEASUREMENT: &str = "uptime";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldMatch {
    Matched(f64),
    NoMatch,
}

/// Resolves the value a rule should see in one sample: the host must be
/// targeted and the rule's field present and numeric.
pub fn match_field(rule: &Rule, measurement: &str, host: &str, fields: &HashMap<String, FieldValue>) -> FieldMatch {
    if !rule.targets_host(host) {
        return FieldMatch::NoMatch;
    }
    let Some((m, field)) = rule.metric_parts() else {
        return FieldMatch::NoMatch;
    };
    if m != measurement {
        return FieldMatch::NoMatch;
    }
    match fields.get(field).and_then(FieldValue::as_f64) {
        Some(v) => FieldMatch::Matched(v),
        None => FieldMatch::NoMatch,
    }
}

/// Result of one evaluation of a (rule, host) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub state: BreachState,
    pub firings: LaneFirings,
    pub trigger: Option<TriggerOutcome>,
    pub resolved: Option<AlertEvent>,
    pub lane_sends: Vec<(Channel, DeliveryOutcome)>,
}

/// Shared evaluation pipeline for pushed samples and polled liveness values.
pub struct AlertEngine {
    rules: Arc<dyn RuleStore>,
    tracker: BreachTracker,
    lifecycle: AlertLifecycle,
    last_seen: LastSeenIndex,
    metrics: Arc<EngineMetrics>,
}

impl AlertEngine {
    pub fn new(
        rules: Arc<dyn RuleStore>,
        tracker: BreachTracker,
        lifecycle: AlertLifecycle,
        last_seen: LastSeenIndex,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            rules,
            tracker,
            lifecycle,
            last_seen,
            metrics,
        }
    }

    pub fn rules(&self) -> &Arc<dyn RuleStore> {
        &self.rules
    }

    pub fn tracker(&self) -> &BreachTracker {
        &self.tracker
    }

    pub fn lifecycle(&self) -> &AlertLifecycle {
        &self.lifecycle
    }

    pub fn last_seen(&self) -> &LastSeenIndex {
        &self.last_seen
    }

    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    /// Ingestion entry point, called once per parsed sample. Returns how many
    /// rules were evaluated.
    pub async fn process_sample(
        &self,
        measurement: &str,
        host: &str,
        fields: &HashMap<String, FieldValue>,
        ts_ms: i64,
    ) -> usize {
        self.metrics.inc_samples_processed();
        self.last_seen.record(measurement, host, ts_ms);

        let mut evaluated = 0;
        for rule in self.rules.enabled_rules_for_measurement(measurement) {
            // Liveness rules are driven by the poller's staleness value.
            if rule.metric_type == UPTIME_METRIC {
                continue;
            }
            match match_field(&rule, measurement, host, fields) {
                FieldMatch::Matched(value) => {
                    self.evaluate(&rule, host, value, ts_ms).await;
                    evaluated += 1;
                }
                FieldMatch::NoMatch => {
                    tracing::trace!(rule_id = %rule.id, host, measurement, "rule does not apply to sample");
                }
            }
        }
        evaluated
    }

    /// Runs one value through the breach lanes and acts on the result. The
    /// pair's lock is held until persistence and notification hand-off finish.
    pub async fn evaluate(&self, rule: &Rule, host: &str, value: f64, ts_ms: i64) -> Evaluation {
        let start = Instant::now();
        let mut state = self.tracker.lock(&rule.id, host).await;
        let core_before = state.core_breach_count;
        let firings = state.observe(rule, value, ts_ms);
        self.metrics.inc_rules_evaluated();

        let mut trigger = None;
        let mut resolved = None;
        let mut lane_sends = Vec::new();

        if firings.core {
            let outcome = self.lifecycle.on_core_fired(rule, host, value, ts_ms).await;
            if outcome == TriggerOutcome::Failed {
                // Leave the streak one short so the next breaching sample retries.
                state.core_breach_count = core_before;
            }
            trigger = Some(outcome);
        }

        // Lanes that crossed their count before the alert existed have no
        // edge left in this episode; deliver them with the new alert.
        if let Some(TriggerOutcome::Created(event)) = &trigger {
            for channel in [Channel::Email, Channel::Sms] {
                if firings.channel(channel) {
                    continue;
                }
                let Some(lane) = rule.lane(channel) else {
                    continue;
                };
                if state.lane_count(channel) >= lane.breach_count.max(1) {
                    let outcome = self
                        .lifecycle
                        .dispatcher()
                        .lane_fired(rule, event, channel, ts_ms);
                    lane_sends.push((channel, outcome));
                }
            }
        }

        if firings.email || firings.sms {
            let open = match trigger.as_ref().and_then(TriggerOutcome::event) {
                Some(event) => Some(event.clone()),
                None => self.lifecycle.open_alert(&rule.id, host).await,
            };
            for channel in [Channel::Email, Channel::Sms] {
                if !firings.channel(channel) {
                    continue;
                }
                match &open {
                    Some(event) => {
                        let outcome = self
                            .lifecycle
                            .dispatcher()
                            .lane_fired(rule, event, channel, ts_ms);
                        lane_sends.push((channel, outcome));
                    }
                    None => {
                        tracing::debug!(
                            rule_id = %rule.id,
                            host,
                            channel = channel.as_str(),
                            "lane fired without an open alert"
                        );
                    }
                }
            }
        }

        if !firings.core {
            resolved = self.lifecycle.resolve_if_clear(rule, host, value, ts_ms).await;
        }

        let snapshot = *state;
        drop(state);
        self.metrics.record_evaluation_latency(start);

        Evaluation {
            state: snapshot,
            firings,
            trigger,
            resolved,
            lane_sends,
        }
    }
}

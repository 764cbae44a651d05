//! In-process fixtures for exercising the engine without SMTP, SMS, or a database.

use async_trait::async_trait;
use hostwatch_common::retry::RetryConfig;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::alert::{
    AlertEvent, AlertEventStore, AlertFilter, AlertLifecycle, BreachTracker, InMemoryAlertStore,
    InMemoryRuleStore, Rule, StoreError,
};
use crate::engine::AlertEngine;
use crate::metrics::EngineMetrics;
use crate::notifier::{
    Broadcaster, DispatchConfig, EmailSender, NotificationDispatcher, NotifyError, Senders,
    SmsSender,
};
use crate::poller::{LastSeenIndex, MetricSource, SourceError};

#[derive(Default)]
pub struct RecordingEmail {
    sent: Mutex<Vec<(Vec<String>, String, String)>>,
    attempts: AtomicUsize,
    fail: AtomicBool,
    blocked: AtomicBool,
}

impl RecordingEmail {
    /// `(recipients, subject, body)` per successful send.
    pub fn sent(&self) -> Vec<(Vec<String>, String, String)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn fail_all(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Sends hang until the attempt times out.
    pub fn block(&self, blocked: bool) {
        self.blocked.store(blocked, Ordering::SeqCst);
    }
}

#[async_trait]
impl EmailSender for RecordingEmail {
    fn name(&self) -> &str {
        "recording-email"
    }

    async fn send_email(&self, recipients: &[String], subject: &str, body: &str) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.blocked.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError("smtp unavailable".into()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((recipients.to_vec(), subject.to_string(), body.to_string()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSms {
    sent: Mutex<Vec<(Vec<String>, String)>>,
    attempts: AtomicUsize,
    fail: AtomicBool,
}

impl RecordingSms {
    pub fn sent(&self) -> Vec<(Vec<String>, String)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn fail_all(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SmsSender for RecordingSms {
    fn name(&self) -> &str {
        "recording-sms"
    }

    async fn send_sms(&self, recipients: &[String], body: &str) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError("gateway returned 503".into()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((recipients.to_vec(), body.to_string()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingBroadcaster {
    frames: Mutex<Vec<(String, serde_json::Value)>>,
}

impl RecordingBroadcaster {
    pub fn topics(&self) -> Vec<String> {
        self.frames()
            .into_iter()
            .map(|(topic, _)| topic)
            .collect()
    }

    pub fn frames(&self) -> Vec<(String, serde_json::Value)> {
        self.frames.lock().map(|f| f.clone()).unwrap_or_default()
    }
}

impl Broadcaster for RecordingBroadcaster {
    fn broadcast(&self, topic: &str, payload: serde_json::Value) -> Result<usize, NotifyError> {
        if let Ok(mut frames) = self.frames.lock() {
            frames.push((topic.to_string(), payload));
        }
        Ok(1)
    }
}

/// Alert store that fails every call until healed.
pub struct FailingAlertStore {
    inner: InMemoryAlertStore,
    failing: AtomicBool,
}

impl Default for FailingAlertStore {
    fn default() -> Self {
        Self {
            inner: InMemoryAlertStore::new(),
            failing: AtomicBool::new(true),
        }
    }
}

impl FailingAlertStore {
    pub fn heal(&self) {
        self.failing.store(false, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Backend("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl AlertEventStore for FailingAlertStore {
    async fn find_open(&self, rule_id: &str, host: &str) -> Result<Option<AlertEvent>, StoreError> {
        self.check()?;
        self.inner.find_open(rule_id, host).await
    }

    async fn insert(&self, event: &AlertEvent) -> Result<String, StoreError> {
        self.check()?;
        self.inner.insert(event).await
    }

    async fn resolve(&self, id: &str, resolved_at_ms: i64) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.resolve(id, resolved_at_ms).await
    }

    async fn acknowledge(&self, id: &str, by: &str, at_ms: i64) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.acknowledge(id, by, at_ms).await
    }

    async fn list(&self, filter: &AlertFilter) -> Result<Vec<AlertEvent>, StoreError> {
        self.check()?;
        self.inner.list(filter).await
    }
}

/// Metric source with canned last-seen timestamps.
#[derive(Default)]
pub struct FixedMetricSource {
    last_seen: HashMap<String, Option<i64>>,
    failing: HashSet<String>,
    delay: Option<Duration>,
}

impl FixedMetricSource {
    pub fn with(mut self, host: &str, last_ms: Option<i64>) -> Self {
        self.last_seen.insert(host.to_string(), last_ms);
        self
    }

    pub fn failing(mut self, host: &str) -> Self {
        self.failing.insert(host.to_string());
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl MetricSource for FixedMetricSource {
    async fn latest_sample_timestamp(&self, _measurement: &str, host: &str) -> Result<Option<i64>, SourceError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(host) {
            return Err(SourceError::Http(format!("timeout querying {host}")));
        }
        Ok(self.last_seen.get(host).copied().flatten())
    }

    async fn list_hosts_reporting(&self, _measurement: &str) -> Result<Vec<String>, SourceError> {
        let mut hosts: Vec<String> = self
            .last_seen
            .keys()
            .chain(self.failing.iter())
            .cloned()
            .collect();
        hosts.sort();
        hosts.dedup();
        Ok(hosts)
    }
}

/// A fully wired engine backed by recording senders.
pub struct Harness {
    pub engine: Arc<AlertEngine>,
    pub rules: InMemoryRuleStore,
    pub store: Arc<InMemoryAlertStore>,
    pub email: Arc<RecordingEmail>,
    pub sms: Arc<RecordingSms>,
    pub ws: Arc<RecordingBroadcaster>,
    pub metrics: Arc<EngineMetrics>,
}

pub struct EngineBuilder {
    rules: InMemoryRuleStore,
    store: Option<Arc<dyn AlertEventStore>>,
    tracker: BreachTracker,
    dispatch: DispatchConfig,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            rules: InMemoryRuleStore::new(),
            store: None,
            tracker: BreachTracker::new(),
            dispatch: DispatchConfig {
                retry: RetryConfig {
                    max_attempts: 2,
                    initial_delay: Duration::from_millis(1),
                    backoff_factor: 1.0,
                    attempt_timeout: Some(Duration::from_millis(500)),
                },
                ..DispatchConfig::default()
            },
        }
    }

    pub fn rule(self, rule: Rule) -> Self {
        self.rules.insert(rule);
        self
    }

    pub fn rule_store(mut self, rules: InMemoryRuleStore) -> Self {
        self.rules = rules;
        self
    }

    /// Replaces the in-memory store the harness exposes as `store`.
    pub fn store(mut self, store: Arc<dyn AlertEventStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn tracker(mut self, tracker: BreachTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn dispatch(mut self, dispatch: DispatchConfig) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Must be called inside a Tokio runtime.
    pub fn build(self) -> Harness {
        let metrics = EngineMetrics::new();
        let email = Arc::new(RecordingEmail::default());
        let sms = Arc::new(RecordingSms::default());
        let ws = Arc::new(RecordingBroadcaster::default());
        let memory = Arc::new(InMemoryAlertStore::new());
        let store: Arc<dyn AlertEventStore> = match self.store {
            Some(store) => store,
            None => memory.clone(),
        };

        let (dispatcher, _worker) = NotificationDispatcher::spawn(
            Senders {
                email: Some(email.clone()),
                sms: Some(sms.clone()),
                broadcaster: ws.clone(),
            },
            self.dispatch,
            metrics.clone(),
        );
        let lifecycle = AlertLifecycle::new(store, dispatcher, metrics.clone());
        let engine = AlertEngine::new(
            Arc::new(self.rules.clone()),
            self.tracker,
            lifecycle,
            LastSeenIndex::new(),
            metrics.clone(),
        );

        Harness {
            engine: Arc::new(engine),
            rules: self.rules,
            store: memory,
            email,
            sms,
            ws,
            metrics,
        }
    }
}

/// Polls `cond` for up to two seconds.
pub async fn eventually(cond: impl Fn() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(cond(), "condition not met within 2s");
}

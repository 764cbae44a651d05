use futures::future::join_all;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::source::{MetricSource, SourceError};
use crate::alert::{Comparison, Rule, Target};
use crate::engine::{AlertEngine, UPTIME_MEASUREMENT, UPTIME_METRIC};

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    /// Idle breach state older than this is evicted after each tick.
    pub state_ttl: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            state_ttl: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub hosts: usize,
    pub evaluated: usize,
    pub host_errors: usize,
    pub evicted: usize,
}

/// Periodically turns "seconds since the last uptime sample" into a value for
/// every `uptime.status` rule and host, and runs it through the engine.
pub struct LivenessPoller {
    engine: Arc<AlertEngine>,
    source: Arc<dyn MetricSource>,
    config: PollerConfig,
    busy: AtomicBool,
}

impl LivenessPoller {
    pub fn new(engine: Arc<AlertEngine>, source: Arc<dyn MetricSource>, config: PollerConfig) -> Self {
        Self {
            engine,
            source,
            config,
            busy: AtomicBool::new(false),
        }
    }

    /// Runs a tick unless one is already in progress.
    pub async fn try_tick(&self, now_ms: i64) -> Option<TickReport> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.engine.metrics().inc_poller_ticks_skipped();
            tracing::warn!("previous liveness tick still running, skipping");
            return None;
        }
        let report = self.tick(now_ms).await;
        self.busy.store(false, Ordering::Release);
        Some(report)
    }

    pub async fn tick(&self, now_ms: i64) -> TickReport {
        self.engine.metrics().inc_poller_ticks();
        let mut report = TickReport::default();

        let rules: Vec<Arc<Rule>> = self
            .engine
            .rules()
            .enabled_rules()
            .into_iter()
            .filter(|r| r.metric_type == UPTIME_METRIC)
            .collect();

        if !rules.is_empty() {
            let plan = self.plan(&rules).await;
            report.hosts = plan.len();

            let results = join_all(
                plan.into_iter()
                    .map(|(host, rules)| self.poll_host(host, rules, now_ms)),
            )
            .await;

            for result in results {
                match result {
                    Ok(n) => report.evaluated += n,
                    Err(_) => report.host_errors += 1,
                }
            }
        }

        let cutoff = now_ms - self.config.state_ttl.as_millis() as i64;
        report.evicted = self.engine.tracker().evict_idle(cutoff);

        tracing::debug!(
            hosts = report.hosts,
            evaluated = report.evaluated,
            host_errors = report.host_errors,
            evicted = report.evicted,
            "liveness tick complete"
        );
        report
    }

    /// Host to the uptime rules that target it. ALL targets expand to every
    /// host the metric source knows about.
    async fn plan(&self, rules: &[Arc<Rule>]) -> HashMap<String, Vec<Arc<Rule>>> {
        let directory: Vec<String> = if rules.iter().any(|r| r.targets_all()) {
            match self.source.list_hosts_reporting(UPTIME_MEASUREMENT).await {
                Ok(hosts) => hosts,
                Err(e) => {
                    self.engine.metrics().inc_poller_host_errors();
                    tracing::error!(error = %e, "failed to list reporting hosts");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let mut plan: HashMap<String, Vec<Arc<Rule>>> = HashMap::new();
        for rule in rules {
            let mut hosts: BTreeSet<&str> = rule
                .targets
                .iter()
                .filter_map(|t| match t {
                    Target::Host { id } => Some(id.as_str()),
                    Target::All => None,
                })
                .collect();
            if rule.targets_all() {
                hosts.extend(directory.iter().map(String::as_str));
            }
            for host in hosts {
                plan.entry(host.to_string()).or_default().push(rule.clone());
            }
        }
        plan
    }

    async fn poll_host(&self, host: String, rules: Vec<Arc<Rule>>, now_ms: i64) -> Result<usize, SourceError> {
        let last = match self
            .source
            .latest_sample_timestamp(UPTIME_MEASUREMENT, &host)
            .await
        {
            Ok(last) => last,
            Err(e) => {
                self.engine.metrics().inc_poller_host_errors();
                tracing::error!(host = %host, error = %e, "liveness lookup failed");
                return Err(e);
            }
        };

        let staleness = staleness_secs(last, now_ms);
        for rule in &rules {
            let rule = rule.with_comparison(Comparison::Above);
            self.engine.evaluate(&rule, &host, staleness, now_ms).await;
        }
        Ok(rules.len())
    }

    /// Ticks every `interval` until `shutdown` flips to true. A tick that
    /// overruns the interval causes later ticks to be skipped, never overlapped.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!(interval_s = self.config.interval.as_secs(), "liveness poller started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let poller = self.clone();
                        tokio::spawn(async move {
                            poller.try_tick(hostwatch_common::clock::now_ms()).await;
                        });
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!("liveness poller stopped");
        })
    }
}

/// Seconds since `last_ms`; a host that never reported is infinitely stale.
pub fn staleness_secs(last_ms: Option<i64>, now_ms: i64) -> f64 {
    match last_ms {
        Some(last) => ((now_ms - last).max(0)) as f64 / 1000.0,
        None => f64::INFINITY,
    }
}

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Default)]
pub struct EngineMetrics {
    samples_processed: AtomicU64,
    lines_rejected: AtomicU64,
    rules_evaluated: AtomicU64,
    alerts_triggered: AtomicU64,
    alerts_resolved: AtomicU64,
    duplicates_suppressed: AtomicU64,
    notifications_queued: AtomicU64,
    notifications_sent: AtomicU64,
    notifications_failed: AtomicU64,
    notifications_cooling_down: AtomicU64,
    notifications_dropped: AtomicU64,
    persistence_errors: AtomicU64,
    poller_ticks: AtomicU64,
    poller_ticks_skipped: AtomicU64,
    poller_host_errors: AtomicU64,
    evaluation_latency_sum_us: AtomicU64,
    evaluation_latency_count: AtomicU64,
}

impl EngineMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_samples_processed(&self) {
        self.samples_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_lines_rejected(&self, count: u64) {
        self.lines_rejected.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_rules_evaluated(&self) {
        self.rules_evaluated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_alerts_triggered(&self) {
        self.alerts_triggered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_alerts_resolved(&self) {
        self.alerts_resolved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_duplicates_suppressed(&self) {
        self.duplicates_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_notifications_queued(&self) {
        self.notifications_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_notifications_sent(&self) {
        self.notifications_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_notifications_failed(&self) {
        self.notifications_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_notifications_cooling_down(&self) {
        self.notifications_cooling_down.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_notifications_dropped(&self) {
        self.notifications_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_persistence_errors(&self) {
        self.persistence_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_poller_ticks(&self) {
        self.poller_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_poller_ticks_skipped(&self) {
        self.poller_ticks_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_poller_host_errors(&self) {
        self.poller_host_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evaluation_latency(&self, start: Instant) {
        let us = start.elapsed().as_micros() as u64;
        self.evaluation_latency_sum_us.fetch_add(us, Ordering::Relaxed);
        self.evaluation_latency_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn samples_processed_val(&self) -> u64 {
        self.samples_processed.load(Ordering::Relaxed)
    }

    pub fn lines_rejected_val(&self) -> u64 {
        self.lines_rejected.load(Ordering::Relaxed)
    }

    pub fn rules_evaluated_val(&self) -> u64 {
        self.rules_evaluated.load(Ordering::Relaxed)
    }

    pub fn alerts_triggered_val(&self) -> u64 {
        self.alerts_triggered.load(Ordering::Relaxed)
    }

    pub fn alerts_resolved_val(&self) -> u64 {
        self.alerts_resolved.load(Ordering::Relaxed)
    }

    pub fn duplicates_suppressed_val(&self) -> u64 {
        self.duplicates_suppressed.load(Ordering::Relaxed)
    }

    pub fn notifications_queued_val(&self) -> u64 {
        self.notifications_queued.load(Ordering::Relaxed)
    }

    pub fn notifications_sent_val(&self) -> u64 {
        self.notifications_sent.load(Ordering::Relaxed)
    }

    pub fn notifications_failed_val(&self) -> u64 {
        self.notifications_failed.load(Ordering::Relaxed)
    }

    pub fn notifications_cooling_down_val(&self) -> u64 {
        self.notifications_cooling_down.load(Ordering::Relaxed)
    }

    pub fn notifications_dropped_val(&self) -> u64 {
        self.notifications_dropped.load(Ordering::Relaxed)
    }

    pub fn persistence_errors_val(&self) -> u64 {
        self.persistence_errors.load(Ordering::Relaxed)
    }

    pub fn poller_ticks_val(&self) -> u64 {
        self.poller_ticks.load(Ordering::Relaxed)
    }

    pub fn poller_ticks_skipped_val(&self) -> u64 {
        self.poller_ticks_skipped.load(Ordering::Relaxed)
    }

    pub fn poller_host_errors_val(&self) -> u64 {
        self.poller_host_errors.load(Ordering::Relaxed)
    }

    pub fn evaluation_latency_vals(&self) -> (u64, u64) {
        (
            self.evaluation_latency_sum_us.load(Ordering::Relaxed),
            self.evaluation_latency_count.load(Ordering::Relaxed),
        )
    }
}

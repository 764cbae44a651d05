pub mod engine_metrics;
pub mod exposition;

pub use engine_metrics::EngineMetrics;

#[cfg(test)]
mod tests {
    use super::exposition::render_prometheus;
    use super::EngineMetrics;
    use std::time::Instant;

    #[test]
    fn counters_increment() {
        let m = EngineMetrics::new();
        m.inc_alerts_triggered();
        m.inc_alerts_triggered();
        m.inc_alerts_resolved();
        m.add_lines_rejected(3);
        assert_eq!(m.alerts_triggered_val(), 2);
        assert_eq!(m.alerts_resolved_val(), 1);
        assert_eq!(m.lines_rejected_val(), 3);
    }

    #[test]
    fn latency_recording() {
        let m = EngineMetrics::new();
        let start = Instant::now();
        std::thread::sleep(std::time::Duration::from_millis(1));
        m.record_evaluation_latency(start);
        let (sum, count) = m.evaluation_latency_vals();
        assert!(sum > 0);
        assert_eq!(count, 1);
    }

    #[test]
    fn prometheus_output_contains_metric_names() {
        let m = EngineMetrics::new();
        m.inc_samples_processed();
        m.inc_notifications_cooling_down();
        let output = render_prometheus(&m);
        assert!(output.contains("hostwatch_samples_processed_total 1"));
        assert!(output.contains("hostwatch_notifications_cooldown_suppressed_total 1"));
        assert!(output.contains("# TYPE hostwatch_evaluation_latency_us summary"));
    }
}

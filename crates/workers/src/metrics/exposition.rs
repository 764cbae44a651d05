use super::engine_metrics::EngineMetrics;

pub fn render_prometheus(m: &EngineMetrics) -> String {
    let mut out = String::with_capacity(2048);

    write_counter(&mut out, "hostwatch_samples_processed_total", m.samples_processed_val());
    write_counter(&mut out, "hostwatch_lines_rejected_total", m.lines_rejected_val());
    write_counter(&mut out, "hostwatch_rules_evaluated_total", m.rules_evaluated_val());
    write_counter(&mut out, "hostwatch_alerts_triggered_total", m.alerts_triggered_val());
    write_counter(&mut out, "hostwatch_alerts_resolved_total", m.alerts_resolved_val());
    write_counter(&mut out, "hostwatch_duplicate_triggers_suppressed_total", m.duplicates_suppressed_val());
    write_counter(&mut out, "hostwatch_notifications_queued_total", m.notifications_queued_val());
    write_counter(&mut out, "hostwatch_notifications_sent_total", m.notifications_sent_val());
    write_counter(&mut out, "hostwatch_notifications_failed_total", m.notifications_failed_val());
    write_counter(&mut out, "hostwatch_notifications_cooldown_suppressed_total", m.notifications_cooling_down_val());
    write_counter(&mut out, "hostwatch_notifications_dropped_total", m.notifications_dropped_val());
    write_counter(&mut out, "hostwatch_persistence_errors_total", m.persistence_errors_val());
    write_counter(&mut out, "hostwatch_poller_ticks_total", m.poller_ticks_val());
    write_counter(&mut out, "hostwatch_poller_ticks_skipped_total", m.poller_ticks_skipped_val());
    write_counter(&mut out, "hostwatch_poller_host_errors_total", m.poller_host_errors_val());

    let (sum, count) = m.evaluation_latency_vals();
    write_summary(&mut out, "hostwatch_evaluation_latency_us", sum, count);

    out
}

fn write_counter(out: &mut String, name: &str, val: u64) {
    use std::fmt::Write;
    let _ = writeln!(out, "# TYPE {name} counter");
    let _ = writeln!(out, "{name} {val}");
}

fn write_summary(out: &mut String, name: &str, sum: u64, count: u64) {
    use std::fmt::Write;
    let _ = writeln!(out, "# TYPE {name} summary");
    let _ = writeln!(out, "{name}_sum {sum}");
    let _ = writeln!(out, "{name}_count {count}");
}

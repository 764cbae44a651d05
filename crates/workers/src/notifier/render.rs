use askama::Template;

use super::channel::NotifyError;
use crate::alert::AlertEvent;

#[derive(Template)]
#[template(path = "alert_email.html")]
struct AlertEmailTemplate<'a> {
    rule_name: &'a str,
    host: &'a str,
    severity: String,
    message: &'a str,
    value: f64,
    threshold: f64,
    comparison: &'a str,
    time: String,
}

pub fn email_subject(event: &AlertEvent) -> String {
    format!(
        "ALERT [{}]: {} - {}",
        event.severity.as_str().to_uppercase(),
        event.rule_name,
        event.host
    )
}

/// HTML body; every interpolated field is escaped by the template.
pub fn email_body(event: &AlertEvent) -> Result<String, NotifyError> {
    let template = AlertEmailTemplate {
        rule_name: &event.rule_name,
        host: &event.host,
        severity: event.severity.as_str().to_uppercase(),
        message: &event.message,
        value: event.value,
        threshold: event.threshold,
        comparison: event.comparison.as_str(),
        time: hostwatch_common::clock::ms_to_rfc3339(event.triggered_at_ms),
    };
    Ok(template.render()?)
}

/// `"[WARNING] high cpu h1: CPU.PERCENT 95 > 90"`
pub fn sms_body(event: &AlertEvent) -> String {
    format!(
        "[{}] {} {}: {}",
        event.severity.as_str().to_uppercase(),
        event.rule_name,
        event.host,
        event.summary()
    )
}

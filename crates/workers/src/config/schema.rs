use hostwatch_common::retry::RetryConfig;
use serde::Deserialize;
use std::time::Duration;

use crate::alert::Rule;
use crate::notifier::DispatchConfig;
use crate::poller::{InfluxConfig, PollerConfig};

#[derive(Debug, Clone, Deserialize)]
pub struct HostwatchConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub poller: PollerSection,
    #[serde(default)]
    pub notifications: NotificationSection,
    #[serde(default)]
    pub smtp: Option<SmtpSection>,
    #[serde(default)]
    pub sms: Option<SmsSection>,
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default)]
    pub influx: Option<InfluxSection>,
    #[serde(default)]
    pub state_file: Option<String>,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub rules_file: Option<String>,
}

impl Default for HostwatchConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            poller: PollerSection::default(),
            notifications: NotificationSection::default(),
            smtp: None,
            sms: None,
            database_url: None,
            influx: None,
            state_file: None,
            rules: Vec::new(),
            rules_file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PollerSection {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_state_ttl_secs")]
    pub state_ttl_secs: u64,
}

impl Default for PollerSection {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            state_ttl_secs: default_state_ttl_secs(),
        }
    }
}

impl PollerSection {
    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            interval: Duration::from_secs(self.interval_secs),
            state_ttl: Duration::from_secs(self.state_ttl_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct NotificationSection {
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    #[serde(default)]
    pub default_email_recipients: Vec<String>,
}

impl Default for NotificationSection {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
            send_timeout_secs: default_send_timeout_secs(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            queue_capacity: default_queue_capacity(),
            max_in_flight: default_max_in_flight(),
            default_email_recipients: Vec::new(),
        }
    }
}

impl NotificationSection {
    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            cooldown: Duration::from_secs(self.cooldown_secs),
            retry: RetryConfig {
                max_attempts: self.max_attempts,
                initial_delay: Duration::from_millis(self.initial_backoff_ms),
                backoff_factor: 2.0,
                attempt_timeout: Some(Duration::from_secs(self.send_timeout_secs)),
            },
            queue_capacity: self.queue_capacity,
            max_in_flight: self.max_in_flight,
            default_email_recipients: self.default_email_recipients.clone(),
        }
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SmtpSection {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SmsSection {
    pub endpoint: String,
    pub api_key: String,
    #[serde(default = "default_sms_sender")]
    pub sender: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct InfluxSection {
    pub url: String,
    pub database: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl InfluxSection {
    pub fn influx_config(&self, timeout: Duration) -> InfluxConfig {
        InfluxConfig {
            url: self.url.clone(),
            database: self.database.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            timeout,
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8086".to_string()
}

fn default_interval_secs() -> u64 {
    30
}

fn default_state_ttl_secs() -> u64 {
    3600
}

fn default_cooldown_secs() -> u64 {
    1800
}

fn default_send_timeout_secs() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_max_in_flight() -> usize {
    16
}

fn default_smtp_port() -> u16 {
    587
}

fn default_sms_sender() -> String {
    "HOSTWATCH".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let cfg: HostwatchConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg.listen_addr, "0.0.0.0:8086");
        assert_eq!(cfg.poller, PollerSection::default());
        assert_eq!(cfg.notifications.cooldown_secs, 1800);
        assert!(cfg.smtp.is_none());
        assert!(cfg.rules.is_empty());
    }

    #[test]
    fn dispatch_config_maps_retry_settings() {
        let section = NotificationSection {
            max_attempts: 5,
            send_timeout_secs: 3,
            ..NotificationSection::default()
        };
        let dc = section.dispatch_config();
        assert_eq!(dc.cooldown, Duration::from_secs(1800));
        assert_eq!(dc.retry.max_attempts, 5);
        assert_eq!(dc.retry.attempt_timeout, Some(Duration::from_secs(3)));
        assert_eq!(dc.retry.initial_delay, Duration::from_millis(500));
    }

    #[test]
    fn full_rule_parses() {
        let yaml = r#"
rules:
  - id: r-disk
    name: Disk almost full
    metric_type: disk.used_percent
    comparison: above
    threshold: 85
    breach_count: 2
    severity: critical
    targets:
      - type: host
        id: db-1
    notifications:
      email:
        recipients: [ops@example.com]
        lane:
          threshold: 80
          breach_count: 3
      sms:
        recipients: ["+15550100"]
"#;
        let cfg: HostwatchConfig = serde_yaml::from_str(yaml).unwrap();
        let rule = &cfg.rules[0];
        assert!(rule.enabled);
        assert!(rule.targets_host("db-1"));
        assert!(!rule.targets_host("db-2"));
        let email = rule.notifications.email.as_ref().unwrap();
        assert_eq!(email.lane.map(|l| l.breach_count), Some(3));
        assert!(rule.notifications.sms.as_ref().unwrap().lane.is_none());
    }
}

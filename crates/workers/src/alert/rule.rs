use serde::{Deserialize, Serialize};

use crate::notifier::Channel;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// `"<measurement>.<field>"`.
    pub metric_type: String,
    pub comparison: Comparison,
    pub threshold: f64,
    #[serde(default = "one")]
    pub breach_count: u32,
    #[serde(default = "default_severity")]
    pub severity: Severity,
    #[serde(default = "yes")]
    pub enabled: bool,
    #[serde(default)]
    pub targets: Vec<Target>,
    #[serde(default)]
    pub notifications: Notifications,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Above,
    Below,
    Equal,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Target {
    All,
    Host { id: String },
}

/// Independent threshold track for a notification channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Lane {
    pub threshold: f64,
    #[serde(default = "one")]
    pub breach_count: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChannelConfig {
    #[serde(default)]
    pub recipients: Vec<String>,
    /// Without a lane the channel rides along with core alert creation.
    #[serde(default)]
    pub lane: Option<Lane>,
}

/// A channel block that is absent means the channel is disabled for the rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Notifications {
    #[serde(default)]
    pub email: Option<ChannelConfig>,
    #[serde(default)]
    pub sms: Option<ChannelConfig>,
}

impl Comparison {
    /// Exact comparison on the received value; unknown operators never breach.
    pub fn is_breached(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Above => value > threshold,
            Self::Below => value < threshold,
            Self::Equal => value == threshold,
            Self::Unknown => false,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Above => ">",
            Self::Below => "<",
            Self::Equal => "==",
            Self::Unknown => "?",
        }
    }

    pub fn phrase(self) -> &'static str {
        match self {
            Self::Above => "is above",
            Self::Below => "is below",
            Self::Equal => "equals",
            Self::Unknown => "matches",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Above => "above",
            Self::Below => "below",
            Self::Equal => "equal",
            Self::Unknown => "unknown",
        }
    }
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl Rule {
    pub fn targets_host(&self, host: &str) -> bool {
        self.targets.iter().any(|t| match t {
            Target::All => true,
            Target::Host { id } => id == host,
        })
    }

    pub fn targets_all(&self) -> bool {
        self.targets.iter().any(|t| matches!(t, Target::All))
    }

    /// `(measurement, field)` when `metric_type` is well formed.
    pub fn metric_parts(&self) -> Option<(&str, &str)> {
        let (measurement, field) = self.metric_type.split_once('.')?;
        if measurement.is_empty() || field.is_empty() || field.contains('.') {
            return None;
        }
        Some((measurement, field))
    }

    pub fn required_breaches(&self) -> u32 {
        self.breach_count.max(1)
    }

    pub fn channel(&self, channel: Channel) -> Option<&ChannelConfig> {
        match channel {
            Channel::Email => self.notifications.email.as_ref(),
            Channel::Sms => self.notifications.sms.as_ref(),
            Channel::Websocket => None,
        }
    }

    pub fn lane(&self, channel: Channel) -> Option<Lane> {
        self.channel(channel).and_then(|c| c.lane)
    }

    /// True when neither the core threshold nor any enabled channel lane is
    /// breached by the instantaneous value.
    pub fn is_clear(&self, value: f64) -> bool {
        if self.comparison.is_breached(value, self.threshold) {
            return false;
        }
        [Channel::Email, Channel::Sms].into_iter().all(|ch| {
            self.lane(ch)
                .map(|lane| !self.comparison.is_breached(value, lane.threshold))
                .unwrap_or(true)
        })
    }

    /// Email and SMS are reserved for warning and critical rules.
    pub fn notifies_externally(&self) -> bool {
        self.severity >= Severity::Warning
    }

    pub fn with_comparison(&self, comparison: Comparison) -> Self {
        Self {
            comparison,
            ..self.clone()
        }
    }

    /// Problems that do not prevent loading but make the rule misbehave.
    pub fn config_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.comparison == Comparison::Unknown {
            warnings.push("unknown comparison operator, rule will never breach".to_string());
        }
        if self.breach_count == 0 {
            warnings.push("breach_count is 0, treated as 1".to_string());
        }
        if self.metric_parts().is_none() {
            warnings.push(format!("metric_type {:?} is not <measurement>.<field>", self.metric_type));
        }
        if self.targets.is_empty() {
            warnings.push("rule has no targets and matches no host".to_string());
        }
        for ch in [Channel::Email, Channel::Sms] {
            if self.lane(ch).is_some_and(|l| l.breach_count == 0) {
                warnings.push(format!("{} lane breach_count is 0, treated as 1", ch.as_str()));
            }
        }
        warnings
    }
}

fn one() -> u32 {
    1
}

fn yes() -> bool {
    true
}

fn default_severity() -> Severity {
    Severity::Warning
}

use serde::{Deserialize, Serialize};

use super::rule::Rule;
use crate::notifier::Channel;

/// Hysteresis counters for one (rule, host) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BreachState {
    pub last_value: Option<f64>,
    pub last_check_ms: Option<i64>,
    pub core_breach_count: u32,
    pub email_breach_count: u32,
    pub sms_breach_count: u32,
}

/// Lanes that reached their required count on this evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaneFirings {
    pub core: bool,
    pub email: bool,
    pub sms: bool,
}

impl LaneFirings {
    pub fn channel(&self, channel: Channel) -> bool {
        match channel {
            Channel::Email => self.email,
            Channel::Sms => self.sms,
            Channel::Websocket => false,
        }
    }

    pub fn any(&self) -> bool {
        self.core || self.email || self.sms
    }
}

impl BreachState {
    /// Feeds one sample through every lane of `rule`. Each lane fires only on
    /// the evaluation where its counter becomes equal to the required count.
    pub fn observe(&mut self, rule: &Rule, value: f64, now_ms: i64) -> LaneFirings {
        let core = step(
            &mut self.core_breach_count,
            rule.comparison.is_breached(value, rule.threshold),
            rule.required_breaches(),
        );

        let email = match rule.lane(Channel::Email) {
            Some(lane) => step(
                &mut self.email_breach_count,
                rule.comparison.is_breached(value, lane.threshold),
                lane.breach_count.max(1),
            ),
            None => {
                self.email_breach_count = 0;
                false
            }
        };

        let sms = match rule.lane(Channel::Sms) {
            Some(lane) => step(
                &mut self.sms_breach_count,
                rule.comparison.is_breached(value, lane.threshold),
                lane.breach_count.max(1),
            ),
            None => {
                self.sms_breach_count = 0;
                false
            }
        };

        self.last_value = Some(value);
        self.last_check_ms = Some(now_ms);

        LaneFirings { core, email, sms }
    }

    pub fn lane_count(&self, channel: Channel) -> u32 {
        match channel {
            Channel::Email => self.email_breach_count,
            Channel::Sms => self.sms_breach_count,
            Channel::Websocket => 0,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.core_breach_count == 0 && self.email_breach_count == 0 && self.sms_breach_count == 0
    }
}

fn step(counter: &mut u32, breached: bool, required: u32) -> bool {
    if breached {
        *counter = counter.saturating_add(1);
        *counter == required
    } else {
        *counter = 0;
        false
    }
}

mod event;
mod lifecycle;
pub(crate) mod rule;
mod rule_store;
mod state;
mod store;
mod tracker;

pub use event::{alert_message, AlertEvent, AlertStatus};
pub use lifecycle::{AlertLifecycle, TriggerOutcome};
pub use rule::{ChannelConfig, Comparison, Lane, Notifications, Rule, Severity, Target};
pub use rule_store::{InMemoryRuleStore, RuleStore};
pub use state::{BreachState, LaneFirings};
pub use store::{AlertEventStore, AlertFilter, InMemoryAlertStore, StoreError};
pub use tracker::{BreachSnapshot, BreachTracker};

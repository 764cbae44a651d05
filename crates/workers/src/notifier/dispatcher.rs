use hostwatch_common::retry::{retry_async, RetryConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

use super::channel::{Broadcaster, Channel, EmailSender, NotifyError, SmsSender};
use super::cooldown::CooldownTracker;
use super::render;
use crate::alert::{AlertEvent, Rule};
use crate::metrics::EngineMetrics;

pub const TOPIC_NEW_ALERT: &str = "new_alert";
pub const TOPIC_ALERT_RESOLVED: &str = "alert_resolved";

#[derive(Clone)]
pub struct Senders {
    pub email: Option<Arc<dyn EmailSender>>,
    pub sms: Option<Arc<dyn SmsSender>>,
    pub broadcaster: Arc<dyn Broadcaster>,
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub cooldown: Duration,
    pub retry: RetryConfig,
    pub queue_capacity: usize,
    pub max_in_flight: usize,
    /// Email recipients for rules whose email block lists none.
    pub default_email_recipients: Vec<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(30 * 60),
            retry: RetryConfig {
                max_attempts: 3,
                initial_delay: Duration::from_millis(500),
                backoff_factor: 2.0,
                attempt_timeout: Some(Duration::from_secs(10)),
            },
            queue_capacity: 1024,
            max_in_flight: 16,
            default_email_recipients: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Queued,
    CoolingDown,
    /// Channel off for this rule, no sender configured, or no recipients.
    Disabled,
    /// Queue full or worker gone.
    Dropped,
}

#[derive(Debug, Clone)]
struct Delivery {
    alert_id: String,
    channel: Channel,
    recipients: Vec<String>,
    subject: String,
    body: String,
    acquired_at_ms: i64,
}

/// Gates email/SMS sends on per-(alert, channel) cooldowns and hands them to a
/// background worker so slow providers never stall evaluation. Websocket
/// broadcasts go out inline.
pub struct NotificationDispatcher {
    tx: mpsc::Sender<Delivery>,
    cooldowns: CooldownTracker,
    broadcaster: Arc<dyn Broadcaster>,
    email_enabled: bool,
    sms_enabled: bool,
    cooldown_ms: i64,
    default_email_recipients: Vec<String>,
    metrics: Arc<EngineMetrics>,
}

impl NotificationDispatcher {
    /// The returned handle finishes once every `Arc` of the dispatcher is
    /// dropped and in-flight sends have completed.
    pub fn spawn(
        senders: Senders,
        config: DispatchConfig,
        metrics: Arc<EngineMetrics>,
    ) -> (Arc<Self>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let dispatcher = Arc::new(Self {
            tx,
            cooldowns: CooldownTracker::new(),
            broadcaster: senders.broadcaster.clone(),
            email_enabled: senders.email.is_some(),
            sms_enabled: senders.sms.is_some(),
            cooldown_ms: config.cooldown.as_millis() as i64,
            default_email_recipients: config.default_email_recipients.clone(),
            metrics: metrics.clone(),
        });

        let handle = tokio::spawn(run_worker(
            rx,
            senders,
            config.retry,
            config.max_in_flight.max(1),
            metrics,
        ));

        (dispatcher, handle)
    }

    pub fn cooldowns(&self) -> &CooldownTracker {
        &self.cooldowns
    }

    /// Websocket broadcast for every new alert, plus email/SMS for channels
    /// that have no lane of their own.
    pub fn alert_created(&self, rule: &Rule, event: &AlertEvent, now_ms: i64) {
        self.broadcast(TOPIC_NEW_ALERT, event);

        for channel in [Channel::Email, Channel::Sms] {
            let rides_along = rule.channel(channel).is_some_and(|c| c.lane.is_none());
            if rides_along {
                self.deliver(rule, event, channel, now_ms);
            }
        }
    }

    pub fn lane_fired(&self, rule: &Rule, event: &AlertEvent, channel: Channel, now_ms: i64) -> DeliveryOutcome {
        self.deliver(rule, event, channel, now_ms)
    }

    pub fn alert_resolved(&self, event: &AlertEvent) {
        self.broadcast(TOPIC_ALERT_RESOLVED, event);
        self.cooldowns.forget_alert(&event.id);
    }

    pub fn deliver(&self, rule: &Rule, event: &AlertEvent, channel: Channel, now_ms: i64) -> DeliveryOutcome {
        let Some(recipients) = self.recipients(rule, channel) else {
            return DeliveryOutcome::Disabled;
        };

        if !self.cooldowns.try_acquire(&event.id, channel, now_ms, self.cooldown_ms) {
            self.metrics.inc_notifications_cooling_down();
            tracing::debug!(
                alert_id = %event.id,
                channel = channel.as_str(),
                "notification suppressed by cooldown"
            );
            return DeliveryOutcome::CoolingDown;
        }

        let (subject, body) = match channel {
            Channel::Email => match render::email_body(event) {
                Ok(body) => (render::email_subject(event), body),
                Err(e) => {
                    self.cooldowns.release(&event.id, channel, now_ms);
                    self.metrics.inc_notifications_dropped();
                    tracing::error!(alert_id = %event.id, error = %e, "email body render failed");
                    return DeliveryOutcome::Dropped;
                }
            },
            _ => (String::new(), render::sms_body(event)),
        };

        let delivery = Delivery {
            alert_id: event.id.clone(),
            channel,
            recipients,
            subject,
            body,
            acquired_at_ms: now_ms,
        };

        match self.tx.try_send(delivery) {
            Ok(()) => {
                self.metrics.inc_notifications_queued();
                DeliveryOutcome::Queued
            }
            Err(e) => {
                self.cooldowns.release(&event.id, channel, now_ms);
                self.metrics.inc_notifications_dropped();
                tracing::error!(
                    alert_id = %event.id,
                    channel = channel.as_str(),
                    error = %e,
                    "notification queue unavailable, dropping send"
                );
                DeliveryOutcome::Dropped
            }
        }
    }

    fn recipients(&self, rule: &Rule, channel: Channel) -> Option<Vec<String>> {
        if !rule.notifies_externally() {
            return None;
        }
        let config = rule.channel(channel)?;
        let recipients = match channel {
            Channel::Email if self.email_enabled => {
                if config.recipients.is_empty() {
                    self.default_email_recipients.clone()
                } else {
                    config.recipients.clone()
                }
            }
            Channel::Sms if self.sms_enabled => config.recipients.clone(),
            _ => return None,
        };
        if recipients.is_empty() {
            None
        } else {
            Some(recipients)
        }
    }

    fn broadcast(&self, topic: &str, event: &AlertEvent) {
        match self.broadcaster.broadcast(topic, event.broadcast_payload()) {
            Ok(clients) => {
                tracing::debug!(alert_id = %event.id, topic, clients, "alert broadcast");
            }
            Err(e) => {
                tracing::error!(alert_id = %event.id, topic, error = %e, "broadcast failed");
            }
        }
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<Delivery>,
    senders: Senders,
    retry: RetryConfig,
    max_in_flight: usize,
    metrics: Arc<EngineMetrics>,
) {
    let senders = Arc::new(senders);
    let slots = Arc::new(Semaphore::new(max_in_flight));

    while let Some(delivery) = rx.recv().await {
        let Ok(permit) = slots.clone().acquire_owned().await else {
            break;
        };
        let senders = senders.clone();
        let retry = retry.clone();
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let _permit = permit;
            let result = retry_async(&retry, || send(&senders, &delivery)).await;
            match result {
                Ok(()) => {
                    metrics.inc_notifications_sent();
                    tracing::info!(
                        alert_id = %delivery.alert_id,
                        channel = delivery.channel.as_str(),
                        recipients = delivery.recipients.len(),
                        "notification sent"
                    );
                }
                Err(e) => {
                    metrics.inc_notifications_failed();
                    tracing::error!(
                        alert_id = %delivery.alert_id,
                        channel = delivery.channel.as_str(),
                        queued_at_ms = delivery.acquired_at_ms,
                        error = %e,
                        "notification failed"
                    );
                }
            }
        });
    }

    // Drain: wait for every in-flight send to give its permit back.
    let _ = slots.acquire_many(max_in_flight as u32).await;
    tracing::debug!("notification worker stopped");
}

async fn send(senders: &Senders, delivery: &Delivery) -> Result<(), NotifyError> {
    match delivery.channel {
        Channel::Email => match &senders.email {
            Some(email) => {
                email
                    .send_email(&delivery.recipients, &delivery.subject, &delivery.body)
                    .await
            }
            None => Err(NotifyError("email sender not configured".into())),
        },
        Channel::Sms => match &senders.sms {
            Some(sms) => sms.send_sms(&delivery.recipients, &delivery.body).await,
            None => Err(NotifyError("sms sender not configured".into())),
        },
        Channel::Websocket => Err(NotifyError("websocket is not a queued channel".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::rule::tests::cpu_rule;
    use crate::alert::rule::{ChannelConfig, Lane, Severity};
    use crate::test_harness::{eventually, RecordingBroadcaster, RecordingEmail, RecordingSms};

    struct Fixture {
        dispatcher: Arc<NotificationDispatcher>,
        email: Arc<RecordingEmail>,
        sms: Arc<RecordingSms>,
        ws: Arc<RecordingBroadcaster>,
        metrics: Arc<EngineMetrics>,
    }

    fn fixture(config: DispatchConfig) -> Fixture {
        let email = Arc::new(RecordingEmail::default());
        let sms = Arc::new(RecordingSms::default());
        let ws = Arc::new(RecordingBroadcaster::default());
        let metrics = EngineMetrics::new();
        let (dispatcher, _handle) = NotificationDispatcher::spawn(
            Senders {
                email: Some(email.clone()),
                sms: Some(sms.clone()),
                broadcaster: ws.clone(),
            },
            config,
            metrics.clone(),
        );
        Fixture { dispatcher, email, sms, ws, metrics }
    }

    fn quick() -> DispatchConfig {
        DispatchConfig {
            retry: RetryConfig {
                max_attempts: 2,
                initial_delay: Duration::from_millis(1),
                backoff_factor: 1.0,
                attempt_timeout: Some(Duration::from_millis(200)),
            },
            ..DispatchConfig::default()
        }
    }

    fn emailing_rule(lane: Option<Lane>) -> Rule {
        let mut rule = cpu_rule();
        rule.notifications.email = Some(ChannelConfig {
            recipients: vec!["ops@example.com".into()],
            lane,
        });
        rule
    }

    #[tokio::test]
    async fn creation_broadcasts_and_sends_ride_along_channels() {
        let f = fixture(quick());
        let rule = emailing_rule(None);
        let event = AlertEvent::triggered(&rule, "h1", 95.0, 0);

        f.dispatcher.alert_created(&rule, &event, 0);

        assert_eq!(f.ws.topics(), vec![TOPIC_NEW_ALERT.to_string()]);
        eventually(|| f.email.sent().len() == 1).await;
        let sent = f.email.sent();
        assert_eq!(sent[0].0, vec!["ops@example.com".to_string()]);
        assert_eq!(sent[0].1, "ALERT [WARNING]: High CPU - h1");
        assert!(f.sms.sent().is_empty());
    }

    #[tokio::test]
    async fn laned_channel_waits_for_its_own_firing() {
        let f = fixture(quick());
        let rule = emailing_rule(Some(Lane { threshold: 80.0, breach_count: 2 }));
        let event = AlertEvent::triggered(&rule, "h1", 95.0, 0);

        f.dispatcher.alert_created(&rule, &event, 0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(f.email.sent().is_empty());

        assert_eq!(
            f.dispatcher.lane_fired(&rule, &event, Channel::Email, 10),
            DeliveryOutcome::Queued
        );
        eventually(|| f.email.sent().len() == 1).await;
    }

    #[tokio::test]
    async fn cooldown_allows_one_send_per_window() {
        let f = fixture(quick());
        let rule = emailing_rule(Some(Lane { threshold: 80.0, breach_count: 1 }));
        let event = AlertEvent::triggered(&rule, "h1", 95.0, 0);

        let first = f.dispatcher.lane_fired(&rule, &event, Channel::Email, 1_000);
        let second = f.dispatcher.lane_fired(&rule, &event, Channel::Email, 60_000);
        assert_eq!(first, DeliveryOutcome::Queued);
        assert_eq!(second, DeliveryOutcome::CoolingDown);

        eventually(|| f.email.sent().len() == 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(f.email.sent().len(), 1);
        assert_eq!(f.metrics.notifications_cooling_down_val(), 1);

        let later = f
            .dispatcher
            .lane_fired(&rule, &event, Channel::Email, 1_000 + 30 * 60 * 1000);
        assert_eq!(later, DeliveryOutcome::Queued);
    }

    #[tokio::test]
    async fn info_rules_never_leave_the_websocket() {
        let f = fixture(quick());
        let mut rule = emailing_rule(None);
        rule.severity = Severity::Info;
        let event = AlertEvent::triggered(&rule, "h1", 95.0, 0);

        f.dispatcher.alert_created(&rule, &event, 0);
        assert_eq!(f.ws.topics().len(), 1);
        assert_eq!(
            f.dispatcher.lane_fired(&rule, &event, Channel::Email, 0),
            DeliveryOutcome::Disabled
        );
    }

    #[tokio::test]
    async fn disabled_channel_and_missing_recipients() {
        let f = fixture(quick());
        let rule = cpu_rule();
        let event = AlertEvent::triggered(&rule, "h1", 95.0, 0);
        assert_eq!(
            f.dispatcher.deliver(&rule, &event, Channel::Sms, 0),
            DeliveryOutcome::Disabled
        );

        let mut rule = cpu_rule();
        rule.notifications.sms = Some(ChannelConfig::default());
        assert_eq!(
            f.dispatcher.deliver(&rule, &event, Channel::Sms, 0),
            DeliveryOutcome::Disabled
        );
    }

    #[tokio::test]
    async fn default_email_recipients_fill_empty_list() {
        let f = fixture(DispatchConfig {
            default_email_recipients: vec!["noc@example.com".into()],
            ..quick()
        });
        let mut rule = cpu_rule();
        rule.notifications.email = Some(ChannelConfig::default());
        let event = AlertEvent::triggered(&rule, "h1", 95.0, 0);

        f.dispatcher.alert_created(&rule, &event, 0);
        eventually(|| f.email.sent().len() == 1).await;
        assert_eq!(f.email.sent()[0].0, vec!["noc@example.com".to_string()]);
    }

    #[tokio::test]
    async fn failing_sender_is_retried_then_counted() {
        let f = fixture(quick());
        f.sms.fail_all(true);
        let mut rule = cpu_rule();
        rule.notifications.sms = Some(ChannelConfig {
            recipients: vec!["+15550100".into()],
            lane: None,
        });
        let event = AlertEvent::triggered(&rule, "h1", 95.0, 0);

        f.dispatcher.alert_created(&rule, &event, 0);
        eventually(|| f.metrics.notifications_failed_val() == 1).await;
        assert_eq!(f.sms.attempts(), 2);
        assert_eq!(f.ws.topics().len(), 1);
    }

    #[tokio::test]
    async fn resolution_broadcasts_and_clears_cooldowns() {
        let f = fixture(quick());
        let rule = emailing_rule(Some(Lane { threshold: 80.0, breach_count: 1 }));
        let event = AlertEvent::triggered(&rule, "h1", 95.0, 0);
        f.dispatcher.lane_fired(&rule, &event, Channel::Email, 0);
        assert_eq!(f.dispatcher.cooldowns().len(), 1);

        f.dispatcher.alert_resolved(&event);
        assert!(f.dispatcher.cooldowns().is_empty());
        assert_eq!(f.ws.topics(), vec![TOPIC_ALERT_RESOLVED.to_string()]);
    }

    #[tokio::test]
    async fn full_queue_drops_and_releases_cooldown() {
        let email = Arc::new(RecordingEmail::default());
        email.block(true);
        let metrics = EngineMetrics::new();
        let (dispatcher, _handle) = NotificationDispatcher::spawn(
            Senders {
                email: Some(email.clone()),
                sms: None,
                broadcaster: Arc::new(RecordingBroadcaster::default()),
            },
            DispatchConfig {
                queue_capacity: 1,
                max_in_flight: 1,
                ..quick()
            },
            metrics.clone(),
        );
        let rule = emailing_rule(Some(Lane { threshold: 80.0, breach_count: 1 }));

        let mut outcomes = Vec::new();
        for host in ["h1", "h2", "h3", "h4"] {
            let event = AlertEvent::triggered(&rule, host, 95.0, 0);
            outcomes.push(dispatcher.lane_fired(&rule, &event, Channel::Email, 0));
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(outcomes.contains(&DeliveryOutcome::Dropped));
        assert!(metrics.notifications_dropped_val() >= 1);
        assert!(dispatcher.cooldowns().len() < 4);
    }
}

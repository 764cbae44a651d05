mod channel;
mod cooldown;
mod dispatcher;
pub mod render;
mod sms;
mod smtp;
mod websocket;

pub use channel::{Broadcaster, Channel, EmailSender, NotifyError, SmsSender};
pub use cooldown::CooldownTracker;
pub use dispatcher::{
    DeliveryOutcome, DispatchConfig, NotificationDispatcher, Senders, TOPIC_ALERT_RESOLVED,
    TOPIC_NEW_ALERT,
};
pub use sms::HttpSmsSender;
pub use smtp::SmtpEmailSender;
pub use websocket::{WsBroadcaster, TOPIC_METRIC_UPDATE};

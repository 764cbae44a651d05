use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
    Websocket,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Websocket => "websocket",
        }
    }
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    fn name(&self) -> &str;
    async fn send_email(&self, recipients: &[String], subject: &str, body: &str) -> Result<(), NotifyError>;
}

#[async_trait]
pub trait SmsSender: Send + Sync {
    fn name(&self) -> &str;
    async fn send_sms(&self, recipients: &[String], body: &str) -> Result<(), NotifyError>;
}

/// Fan-out to connected realtime clients. Must not block.
pub trait Broadcaster: Send + Sync {
    fn broadcast(&self, topic: &str, payload: serde_json::Value) -> Result<usize, NotifyError>;
}

#[derive(Debug)]
pub struct NotifyError(pub String);

impl std::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "notify: {}", self.0)
    }
}

impl std::error::Error for NotifyError {}

impl From<askama::Error> for NotifyError {
    fn from(e: askama::Error) -> Self {
        Self(format!("render: {e}"))
    }
}

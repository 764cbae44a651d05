use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::channel::{NotifyError, SmsSender};

/// Posts messages to an HTTP SMS gateway as JSON with a bearer token.
pub struct HttpSmsSender {
    endpoint: String,
    api_key: String,
    sender_id: String,
    client: Client,
}

impl HttpSmsSender {
    pub fn new(endpoint: String, api_key: String, sender_id: String, timeout: Duration) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError(e.to_string()))?;
        Ok(Self {
            endpoint,
            api_key,
            sender_id,
            client,
        })
    }

    fn payload(&self, recipients: &[String], body: &str) -> serde_json::Value {
        serde_json::json!({
            "from": self.sender_id,
            "to": recipients,
            "text": body,
        })
    }
}

#[async_trait]
impl SmsSender for HttpSmsSender {
    fn name(&self) -> &str {
        "http-sms"
    }

    async fn send_sms(&self, recipients: &[String], body: &str) -> Result<(), NotifyError> {
        self.client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.payload(recipients, body))
            .send()
            .await
            .map_err(|e| NotifyError(e.to_string()))?
            .error_for_status()
            .map_err(|e| NotifyError(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_shape() {
        let sender = HttpSmsSender::new(
            "http://127.0.0.1:9/sms".into(),
            "key".into(),
            "HOSTWATCH".into(),
            Duration::from_secs(1),
        )
        .unwrap();
        let p = sender.payload(&["+15550100".into()], "CPU.PERCENT 95 > 90");
        assert_eq!(p["from"], "HOSTWATCH");
        assert_eq!(p["to"][0], "+15550100");
        assert_eq!(p["text"], "CPU.PERCENT 95 > 90");
    }

    #[tokio::test]
    async fn unreachable_gateway_is_an_error() {
        let sender = HttpSmsSender::new(
            "http://127.0.0.1:9/sms".into(),
            "key".into(),
            "HOSTWATCH".into(),
            Duration::from_millis(500),
        )
        .unwrap();
        assert!(sender.send_sms(&["+1".into()], "x").await.is_err());
    }
}

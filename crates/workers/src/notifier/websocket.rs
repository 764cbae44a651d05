use serde::Serialize;
use tokio::sync::broadcast;

use super::channel::{Broadcaster, NotifyError};

/// Every accepted ingestion sample.
pub const TOPIC_METRIC_UPDATE: &str = "metric_update";

#[derive(Serialize)]
struct Frame<'a> {
    topic: &'a str,
    payload: serde_json::Value,
}

/// In-process fan-out of JSON text frames to websocket sessions. Slow
/// sessions lag and lose frames instead of blocking the sender.
#[derive(Clone)]
pub struct WsBroadcaster {
    tx: broadcast::Sender<String>,
}

impl WsBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn client_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Broadcaster for WsBroadcaster {
    fn broadcast(&self, topic: &str, payload: serde_json::Value) -> Result<usize, NotifyError> {
        let text = serde_json::to_string(&Frame { topic, payload })
            .map_err(|e| NotifyError(e.to_string()))?;
        // No subscribers is not a failure.
        Ok(self.tx.send(text).unwrap_or(0))
    }
}

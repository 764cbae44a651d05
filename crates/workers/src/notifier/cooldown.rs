use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

use super::channel::Channel;

/// Last send time per (alert, channel).
#[derive(Clone, Default)]
pub struct CooldownTracker {
    last_sent: Arc<DashMap<(String, Channel), i64>>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a send at `now_ms` and returns true unless the previous send for
    /// the same key is less than `window_ms` old.
    pub fn try_acquire(&self, alert_id: &str, channel: Channel, now_ms: i64, window_ms: i64) -> bool {
        match self.last_sent.entry((alert_id.to_string(), channel)) {
            Entry::Occupied(mut slot) => {
                if now_ms - *slot.get() < window_ms {
                    return false;
                }
                slot.insert(now_ms);
                true
            }
            Entry::Vacant(slot) => {
                slot.insert(now_ms);
                true
            }
        }
    }

    /// Undoes an acquire whose send never left the process.
    pub fn release(&self, alert_id: &str, channel: Channel, sent_at_ms: i64) {
        self.last_sent
            .remove_if(&(alert_id.to_string(), channel), |_, at| *at == sent_at_ms);
    }

    pub fn forget_alert(&self, alert_id: &str) {
        self.last_sent.retain(|(id, _), _| id != alert_id);
    }

    pub fn last_sent(&self, alert_id: &str, channel: Channel) -> Option<i64> {
        self.last_sent
            .get(&(alert_id.to_string(), channel))
            .map(|v| *v.value())
    }

    pub fn len(&self) -> usize {
        self.last_sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_sent.is_empty()
    }
}

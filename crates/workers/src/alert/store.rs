use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

use super::event::{AlertEvent, AlertStatus};

#[derive(Debug)]
pub enum StoreError {
    /// An open alert already exists for the (rule, host) pair.
    DuplicateOpen { rule_id: String, host: String },
    Backend(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateOpen { rule_id, host } => {
                write!(f, "open alert already exists for rule {rule_id} on {host}")
            }
            Self::Backend(e) => write!(f, "backend: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub status: Option<AlertStatus>,
    pub host: Option<String>,
    pub rule_id: Option<String>,
    pub limit: Option<usize>,
}

impl AlertFilter {
    pub fn matches(&self, event: &AlertEvent) -> bool {
        self.status.map_or(true, |s| event.status == s)
            && self.host.as_deref().map_or(true, |h| event.host == h)
            && self.rule_id.as_deref().map_or(true, |r| event.rule_id == r)
    }
}

#[async_trait]
pub trait AlertEventStore: Send + Sync {
    async fn find_open(&self, rule_id: &str, host: &str) -> Result<Option<AlertEvent>, StoreError>;

    /// Fails with [`StoreError::DuplicateOpen`] when the pair already has an
    /// open alert.
    async fn insert(&self, event: &AlertEvent) -> Result<String, StoreError>;

    async fn resolve(&self, id: &str, resolved_at_ms: i64) -> Result<bool, StoreError>;

    async fn acknowledge(&self, id: &str, by: &str, at_ms: i64) -> Result<bool, StoreError>;

    /// Newest first.
    async fn list(&self, filter: &AlertFilter) -> Result<Vec<AlertEvent>, StoreError>;
}

/// Process-local store; the open-pair index is the duplicate guard.
#[derive(Clone, Default)]
pub struct InMemoryAlertStore {
    events: Arc<DashMap<String, AlertEvent>>,
    open: Arc<DashMap<(String, String), String>>,
}

impl InMemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }
}

#[async_trait]
impl AlertEventStore for InMemoryAlertStore {
    async fn find_open(&self, rule_id: &str, host: &str) -> Result<Option<AlertEvent>, StoreError> {
        let id = match self.open.get(&(rule_id.to_string(), host.to_string())) {
            Some(id) => id.value().clone(),
            None => return Ok(None),
        };
        Ok(self.events.get(&id).map(|e| e.value().clone()))
    }

    async fn insert(&self, event: &AlertEvent) -> Result<String, StoreError> {
        let key = (event.rule_id.clone(), event.host.clone());
        match self.open.entry(key) {
            Entry::Occupied(_) => Err(StoreError::DuplicateOpen {
                rule_id: event.rule_id.clone(),
                host: event.host.clone(),
            }),
            Entry::Vacant(slot) => {
                self.events.insert(event.id.clone(), event.clone());
                slot.insert(event.id.clone());
                Ok(event.id.clone())
            }
        }
    }

    async fn resolve(&self, id: &str, resolved_at_ms: i64) -> Result<bool, StoreError> {
        let Some(mut event) = self.events.get_mut(id) else {
            return Ok(false);
        };
        if !event.status.is_open() {
            return Ok(false);
        }
        event.status = AlertStatus::Resolved;
        event.resolved_at_ms = Some(resolved_at_ms);
        let key = (event.rule_id.clone(), event.host.clone());
        drop(event);
        self.open.remove_if(&key, |_, open_id| open_id == id);
        Ok(true)
    }

    async fn acknowledge(&self, id: &str, by: &str, at_ms: i64) -> Result<bool, StoreError> {
        let Some(mut event) = self.events.get_mut(id) else {
            return Ok(false);
        };
        if event.status != AlertStatus::Triggered {
            return Ok(false);
        }
        event.status = AlertStatus::Acknowledged;
        event.acknowledged_at_ms = Some(at_ms);
        event.acknowledged_by = Some(by.to_string());
        Ok(true)
    }

    async fn list(&self, filter: &AlertFilter) -> Result<Vec<AlertEvent>, StoreError> {
        let mut out: Vec<AlertEvent> = self
            .events
            .iter()
            .filter(|e| filter.matches(e.value()))
            .map(|e| e.value().clone())
            .collect();
        out.sort_by(|a, b| b.triggered_at_ms.cmp(&a.triggered_at_ms));
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::rule::tests::cpu_rule;

    fn event(host: &str, at: i64) -> AlertEvent {
        AlertEvent::triggered(&cpu_rule(), host, 95.0, at)
    }

    #[tokio::test]
    async fn insert_then_find_open() {
        let store = InMemoryAlertStore::new();
        let e = event("h1", 1);
        let id = store.insert(&e).await.unwrap();
        assert_eq!(id, e.id);
        let found = store.find_open("r-cpu", "h1").await.unwrap().unwrap();
        assert_eq!(found.id, e.id);
        assert!(store.find_open("r-cpu", "h2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn second_open_alert_rejected() {
        let store = InMemoryAlertStore::new();
        store.insert(&event("h1", 1)).await.unwrap();
        let err = store.insert(&event("h1", 2)).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateOpen { .. }));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn resolve_frees_the_pair() {
        let store = InMemoryAlertStore::new();
        let first = event("h1", 1);
        store.insert(&first).await.unwrap();
        assert!(store.resolve(&first.id, 10).await.unwrap());
        assert!(!store.resolve(&first.id, 11).await.unwrap());
        assert!(store.find_open("r-cpu", "h1").await.unwrap().is_none());

        store.insert(&event("h1", 20)).await.unwrap();
        assert_eq!(store.open_count(), 1);

        let resolved = store
            .list(&AlertFilter { status: Some(AlertStatus::Resolved), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].resolved_at_ms, Some(10));
    }

    #[tokio::test]
    async fn acknowledged_alert_stays_open() {
        let store = InMemoryAlertStore::new();
        let e = event("h1", 1);
        store.insert(&e).await.unwrap();
        assert!(store.acknowledge(&e.id, "alice", 5).await.unwrap());
        assert!(!store.acknowledge(&e.id, "bob", 6).await.unwrap());

        let open = store.find_open("r-cpu", "h1").await.unwrap().unwrap();
        assert_eq!(open.status, AlertStatus::Acknowledged);
        assert_eq!(open.acknowledged_by.as_deref(), Some("alice"));
        assert!(store.insert(&event("h1", 7)).await.is_err());
    }

    #[tokio::test]
    async fn list_filters_and_orders() {
        let store = InMemoryAlertStore::new();
        store.insert(&event("h1", 1)).await.unwrap();
        store.insert(&event("h2", 3)).await.unwrap();
        store.insert(&event("h3", 2)).await.unwrap();

        let all = store.list(&AlertFilter::default()).await.unwrap();
        let hosts: Vec<&str> = all.iter().map(|e| e.host.as_str()).collect();
        assert_eq!(hosts, vec!["h2", "h3", "h1"]);

        let h3 = store
            .list(&AlertFilter { host: Some("h3".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(h3.len(), 1);

        let limited = store
            .list(&AlertFilter { limit: Some(1), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(limited[0].host, "h2");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_inserts_leave_one_open() {
        let store = InMemoryAlertStore::new();
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.insert(&event("h1", i)).await.is_ok() }));
        }
        let mut ok = 0;
        for h in handles {
            if h.await.unwrap() {
                ok += 1;
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(store.open_count(), 1);
    }
}

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::state::BreachState;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BreachKey {
    rule_id: String,
    host: String,
}

/// Serialized form of one tracked pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreachSnapshot {
    pub rule_id: String,
    pub host: String,
    pub state: BreachState,
}

/// Breach state for every (rule, host) pair. Each pair sits behind its own
/// async mutex; the guard returned by [`BreachTracker::lock`] must be held for
/// the whole evaluate/persist/notify sequence of that pair.
#[derive(Clone, Default)]
pub struct BreachTracker {
    states: Arc<DashMap<BreachKey, Arc<Mutex<BreachState>>>>,
}

impl BreachTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, rule_id: &str, host: &str) -> OwnedMutexGuard<BreachState> {
        let slot = self
            .states
            .entry(BreachKey {
                rule_id: rule_id.to_string(),
                host: host.to_string(),
            })
            .or_default()
            .clone();
        slot.lock_owned().await
    }

    pub async fn get(&self, rule_id: &str, host: &str) -> Option<BreachState> {
        let slot = self
            .states
            .get(&BreachKey {
                rule_id: rule_id.to_string(),
                host: host.to_string(),
            })
            .map(|s| s.value().clone())?;
        let state = *slot.lock().await;
        Some(state)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Drops idle pairs not evaluated since `cutoff_ms`. Pairs that are being
    /// evaluated, or whose slot is held by a caller about to lock it, are kept.
    pub fn evict_idle(&self, cutoff_ms: i64) -> usize {
        let before = self.states.len();
        self.states.retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Ok(state) => {
                    !(state.is_idle() && state.last_check_ms.map_or(true, |t| t < cutoff_ms))
                }
                Err(_) => true,
            }
        });
        before - self.states.len()
    }

    /// Waits for in-flight evaluations of each pair before copying it.
    pub async fn snapshot(&self) -> Vec<BreachSnapshot> {
        let slots: Vec<(BreachKey, Arc<Mutex<BreachState>>)> = self
            .states
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        let mut out = Vec::with_capacity(slots.len());
        for (key, slot) in slots {
            let state = *slot.lock().await;
            out.push(BreachSnapshot {
                rule_id: key.rule_id,
                host: key.host,
                state,
            });
        }
        out.sort_by(|a, b| (&a.rule_id, &a.host).cmp(&(&b.rule_id, &b.host)));
        out
    }

    pub fn restore(snapshots: Vec<BreachSnapshot>) -> Self {
        let tracker = Self::new();
        for s in snapshots {
            tracker.states.insert(
                BreachKey {
                    rule_id: s.rule_id,
                    host: s.host,
                },
                Arc::new(Mutex::new(s.state)),
            );
        }
        tracker
    }

    pub async fn save_to_file(&self, path: &Path) -> std::io::Result<usize> {
        let snapshots = self.snapshot().await;
        let json = serde_json::to_vec_pretty(&snapshots)?;
        tokio::fs::write(path, json).await?;
        Ok(snapshots.len())
    }

    pub async fn load_from_file(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let snapshots: Vec<BreachSnapshot> = serde_json::from_slice(&bytes)?;
        Ok(Self::restore(snapshots))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::rule::tests::cpu_rule;

    #[tokio::test]
    async fn new_pair_starts_from_zero() {
        let tracker = BreachTracker::new();
        let rule = cpu_rule();
        {
            let mut state = tracker.lock(&rule.id, "h2").await;
            assert_eq!(*state, BreachState::default());
            state.observe(&rule, 95.0, 1);
        }
        let state = tracker.get(&rule.id, "h2").await.unwrap();
        assert_eq!(state.core_breach_count, 1);
        assert!(tracker.get(&rule.id, "h3").await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_evaluations_do_not_lose_updates() {
        let tracker = BreachTracker::new();
        let mut rule = cpu_rule();
        rule.breach_count = 50;
        let rule = Arc::new(rule);

        let mut handles = Vec::new();
        for i in 0..200 {
            let tracker = tracker.clone();
            let rule = rule.clone();
            handles.push(tokio::spawn(async move {
                let mut state = tracker.lock(&rule.id, "h1").await;
                tokio::task::yield_now().await;
                state.observe(&rule, 95.0, i).core
            }));
        }

        let mut fired = 0;
        for h in handles {
            if h.await.unwrap() {
                fired += 1;
            }
        }

        assert_eq!(fired, 1);
        assert_eq!(tracker.get(&rule.id, "h1").await.unwrap().core_breach_count, 200);
    }

    #[tokio::test]
    async fn snapshot_restore_keeps_counters() {
        let tracker = BreachTracker::new();
        let rule = cpu_rule();
        for (i, host) in ["a", "b"].iter().enumerate() {
            let mut state = tracker.lock(&rule.id, host).await;
            for n in 0..=i {
                state.observe(&rule, 95.0, n as i64);
            }
        }

        let snap = tracker.snapshot().await;
        let restored = BreachTracker::restore(snap.clone());
        assert_eq!(restored.snapshot().await, snap);
        assert_eq!(restored.get(&rule.id, "b").await.unwrap().core_breach_count, 2);
    }

    #[tokio::test]
    async fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("breach.json");
        let tracker = BreachTracker::new();
        let rule = cpu_rule();
        tracker.lock(&rule.id, "h1").await.observe(&rule, 99.0, 5);

        assert_eq!(tracker.save_to_file(&path).await.unwrap(), 1);
        let loaded = BreachTracker::load_from_file(&path).await.unwrap();
        assert_eq!(loaded.snapshot().await, tracker.snapshot().await);
    }

    #[tokio::test]
    async fn evicts_only_idle_and_old() {
        let tracker = BreachTracker::new();
        let rule = cpu_rule();
        tracker.lock(&rule.id, "idle-old").await.observe(&rule, 10.0, 100);
        tracker.lock(&rule.id, "idle-new").await.observe(&rule, 10.0, 10_000);
        tracker.lock(&rule.id, "breaching").await.observe(&rule, 99.0, 100);

        assert_eq!(tracker.evict_idle(5_000), 1);
        assert_eq!(tracker.len(), 2);
        assert!(tracker.get(&rule.id, "idle-old").await.is_none());
    }

    #[tokio::test]
    async fn eviction_skips_slot_about_to_be_locked() {
        let tracker = BreachTracker::new();
        let rule = cpu_rule();
        tracker.lock(&rule.id, "h1").await.observe(&rule, 10.0, 100);

        let key = BreachKey { rule_id: rule.id.clone(), host: "h1".into() };
        let pending = tracker.states.get(&key).map(|s| s.value().clone()).unwrap();
        assert_eq!(tracker.evict_idle(5_000), 0);

        pending.lock_owned().await.observe(&rule, 95.0, 6_000);
        assert_eq!(tracker.get(&rule.id, "h1").await.unwrap().core_breach_count, 1);

        assert_eq!(tracker.evict_idle(10_000), 0, "breaching pair stays");
    }
}

use dashmap::DashMap;
use std::sync::Arc;

use super::rule::Rule;

/// Source of rule definitions for the evaluation paths.
pub trait RuleStore: Send + Sync {
    /// Enabled rules whose `metric_type` starts with `"<measurement>."`.
    fn enabled_rules_for_measurement(&self, measurement: &str) -> Vec<Arc<Rule>>;

    fn enabled_rules(&self) -> Vec<Arc<Rule>>;
}

#[derive(Clone, Default)]
pub struct InMemoryRuleStore {
    rules: Arc<DashMap<String, Arc<Rule>>>,
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rules(rules: Vec<Rule>) -> Self {
        let store = Self::new();
        for rule in rules {
            store.insert(rule);
        }
        store
    }

    /// Replaces any rule with the same id. Misconfigurations are logged, not rejected.
    pub fn insert(&self, rule: Rule) {
        for warning in rule.config_warnings() {
            tracing::warn!(rule_id = %rule.id, rule_name = %rule.name, "{warning}");
        }
        self.rules.insert(rule.id.clone(), Arc::new(rule));
    }

    pub fn count(&self) -> usize {
        self.rules.len()
    }
}

impl RuleStore for InMemoryRuleStore {
    fn enabled_rules_for_measurement(&self, measurement: &str) -> Vec<Arc<Rule>> {
        let mut rules: Vec<Arc<Rule>> = self
            .rules
            .iter()
            .filter(|r| r.enabled && r.metric_parts().is_some_and(|(m, _)| m == measurement))
            .map(|r| r.value().clone())
            .collect();
        rules.sort_by(|a, b| a.id.cmp(&b.id));
        rules
    }

    fn enabled_rules(&self) -> Vec<Arc<Rule>> {
        let mut rules: Vec<Arc<Rule>> = self
            .rules
            .iter()
            .filter(|r| r.enabled)
            .map(|r| r.value().clone())
            .collect();
        rules.sort_by(|a, b| a.id.cmp(&b.id));
        rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::rule::tests::cpu_rule;

    fn rule(id: &str, metric: &str, enabled: bool) -> Rule {
        Rule {
            id: id.into(),
            metric_type: metric.into(),
            enabled,
            ..cpu_rule()
        }
    }

    #[test]
    fn insert_then_list() {
        let store = InMemoryRuleStore::new();
        store.insert(cpu_rule());
        assert_eq!(store.enabled_rules()[0].name, "High CPU");
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn filters_by_measurement_and_enabled() {
        let store = InMemoryRuleStore::from_rules(vec![
            rule("a", "cpu.percent", true),
            rule("b", "cpu.iowait", true),
            rule("c", "cpu.percent", false),
            rule("d", "memory.percent", true),
            rule("e", "cpuload.percent", true),
        ]);
        let ids: Vec<String> = store
            .enabled_rules_for_measurement("cpu")
            .iter()
            .map(|r| r.id.clone())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(store.enabled_rules().len(), 4);
    }

    #[test]
    fn insert_replaces_same_id() {
        let store = InMemoryRuleStore::new();
        store.insert(cpu_rule());
        let mut updated = cpu_rule();
        updated.threshold = 50.0;
        store.insert(updated);
        assert_eq!(store.count(), 1);
        assert_eq!(store.enabled_rules()[0].threshold, 50.0);
    }
}

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;

use super::schema::HostwatchConfig;
use crate::alert::Rule;

pub const CONFIG_ENV: &str = "HOSTWATCH_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "/etc/hostwatch/config.yml";

#[derive(Debug)]
pub enum LoadError {
    Io(std::io::Error),
    Parse(serde_yaml::Error),
    Validation(String),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Parse(e) => write!(f, "parse: {e}"),
            Self::Validation(msg) => write!(f, "validation: {msg}"),
        }
    }
}

impl std::error::Error for LoadError {}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_yaml::Error> for LoadError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Parse(e)
    }
}

/// Reads the file named by `HOSTWATCH_CONFIG` (or the default path), falling
/// back to defaults when it does not exist, then applies env overrides.
pub fn load() -> Result<HostwatchConfig, LoadError> {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let path = Path::new(&path);

    let mut cfg = if path.exists() {
        load_from_file(path)?
    } else {
        tracing::warn!(path = %path.display(), "config file not found, using defaults");
        HostwatchConfig::default()
    };

    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());
    validate(&cfg)?;
    Ok(cfg)
}

pub fn load_from_file(path: &Path) -> Result<HostwatchConfig, LoadError> {
    let contents = std::fs::read_to_string(path)?;
    load_from_str(&contents)
}

pub fn load_from_str(yaml: &str) -> Result<HostwatchConfig, LoadError> {
    let cfg: HostwatchConfig = serde_yaml::from_str(yaml)?;
    validate(&cfg)?;
    Ok(cfg)
}

pub fn apply_env_overrides(cfg: &mut HostwatchConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(addr) = lookup("HOSTWATCH_LISTEN_ADDR") {
        cfg.listen_addr = addr;
    }
    if let Some(url) = lookup("DATABASE_URL") {
        cfg.database_url = Some(url);
    }
}

/// Inline rules followed by those in `rules_file`. Rule ids must be unique
/// across both.
pub fn resolve_rules(cfg: &HostwatchConfig) -> Result<Vec<Rule>, LoadError> {
    let mut rules = cfg.rules.clone();
    if let Some(file) = &cfg.rules_file {
        let contents = std::fs::read_to_string(file)?;
        let from_file: Vec<Rule> = serde_yaml::from_str(&contents)?;
        rules.extend(from_file);
    }

    let mut seen = HashSet::new();
    for rule in &rules {
        if rule.id.trim().is_empty() {
            return Err(LoadError::Validation("rule id must not be empty".into()));
        }
        if !seen.insert(rule.id.as_str()) {
            return Err(LoadError::Validation(format!("duplicate rule id {}", rule.id)));
        }
    }
    Ok(rules)
}

const MAX_SEND_ATTEMPTS: u32 = 20;

fn validate(cfg: &HostwatchConfig) -> Result<(), LoadError> {
    if cfg.listen_addr.parse::<SocketAddr>().is_err() {
        return Err(LoadError::Validation(format!(
            "listen_addr {:?} is not a socket address",
            cfg.listen_addr
        )));
    }
    if cfg.poller.interval_secs == 0 {
        return Err(LoadError::Validation("poller.interval_secs must be > 0".into()));
    }
    let n = &cfg.notifications;
    if n.max_attempts == 0 || n.max_attempts > MAX_SEND_ATTEMPTS {
        return Err(LoadError::Validation(format!(
            "notifications.max_attempts must be between 1 and {MAX_SEND_ATTEMPTS}"
        )));
    }
    if n.queue_capacity == 0 || n.max_in_flight == 0 {
        return Err(LoadError::Validation(
            "notifications.queue_capacity and max_in_flight must be > 0".into(),
        ));
    }
    if n.send_timeout_secs == 0 {
        return Err(LoadError::Validation("notifications.send_timeout_secs must be > 0".into()));
    }
    if let Some(smtp) = &cfg.smtp {
        if smtp.host.is_empty() || smtp.from.is_empty() {
            return Err(LoadError::Validation("smtp.host and smtp.from must not be empty".into()));
        }
    }
    if let Some(sms) = &cfg.sms {
        if sms.endpoint.is_empty() {
            return Err(LoadError::Validation("sms.endpoint must not be empty".into()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_config() {
        let yaml = r#"
listen_addr: 127.0.0.1:9000
poller:
  interval_secs: 15
notifications:
  cooldown_secs: 600
smtp:
  host: mail.example.com
  from: alerts@example.com
rules:
  - id: r-cpu
    name: High CPU
    metric_type: cpu.percent
    comparison: above
    threshold: 90
    targets: [{type: all}]
"#;
        let cfg = load_from_str(yaml).unwrap();
        assert_eq!(cfg.listen_addr, "127.0.0.1:9000");
        assert_eq!(cfg.poller.interval_secs, 15);
        assert_eq!(cfg.poller.state_ttl_secs, 3600);
        assert_eq!(cfg.smtp.as_ref().unwrap().port, 587);
        assert_eq!(cfg.rules.len(), 1);
    }

    #[test]
    fn bad_listen_addr_rejected() {
        let err = load_from_str("listen_addr: nowhere\n").unwrap_err();
        assert!(err.to_string().contains("listen_addr"));
    }

    #[test]
    fn zero_interval_rejected() {
        let err = load_from_str("poller:\n  interval_secs: 0\n").unwrap_err();
        assert!(err.to_string().contains("interval_secs"));
    }

    #[test]
    fn send_attempts_bounded() {
        let err = load_from_str("notifications:\n  max_attempts: 10000\n").unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
        assert!(load_from_str("notifications:\n  max_attempts: 20\n").is_ok());
    }

    #[test]
    fn empty_smtp_host_rejected() {
        let err = load_from_str("smtp:\n  host: \"\"\n  from: a@b.c\n").unwrap_err();
        assert!(matches!(err, LoadError::Validation(_)));
    }

    #[test]
    fn unknown_comparison_still_loads() {
        let yaml = "rules:\n  - {id: r, name: n, metric_type: cpu.percent, comparison: around, threshold: 1}\n";
        let cfg = load_from_str(yaml).unwrap();
        assert_eq!(cfg.rules[0].comparison, crate::alert::Comparison::Unknown);
        assert!(!cfg.rules[0].config_warnings().is_empty());
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = HostwatchConfig::default();
        apply_env_overrides(&mut cfg, |key| match key {
            "HOSTWATCH_LISTEN_ADDR" => Some("127.0.0.1:1".into()),
            "DATABASE_URL" => Some("postgres://localhost/hostwatch".into()),
            _ => None,
        });
        assert_eq!(cfg.listen_addr, "127.0.0.1:1");
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/hostwatch"));
    }

    #[test]
    fn load_from_file_and_rules_file() {
        let dir = tempfile::tempdir().unwrap();
        let rules_path = dir.path().join("rules.yml");
        std::fs::write(
            &rules_path,
            "- {id: r-mem, name: Memory, metric_type: memory.percent, comparison: above, threshold: 95}\n",
        )
        .unwrap();
        let cfg_path = dir.path().join("config.yml");
        std::fs::write(
            &cfg_path,
            format!(
                "rules:\n  - {{id: r-cpu, name: CPU, metric_type: cpu.percent, comparison: above, threshold: 90}}\nrules_file: {}\n",
                rules_path.display()
            ),
        )
        .unwrap();

        let cfg = load_from_file(&cfg_path).unwrap();
        let rules = resolve_rules(&cfg).unwrap();
        let ids: Vec<&str> = rules.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r-cpu", "r-mem"]);
    }

    #[test]
    fn duplicate_rule_ids_rejected() {
        let yaml = "rules:\n  - {id: r, name: a, metric_type: cpu.percent, comparison: above, threshold: 1}\n  - {id: r, name: b, metric_type: cpu.percent, comparison: above, threshold: 2}\n";
        let cfg = load_from_str(yaml).unwrap();
        let err = resolve_rules(&cfg).unwrap_err();
        assert!(err.to_string().contains("duplicate rule id r"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_from_file(Path::new("/nonexistent/hostwatch.yml")).unwrap_err();
        assert!(matches!(err, LoadError::Io(_)));
    }
}

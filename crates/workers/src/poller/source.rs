use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
pub enum SourceError {
    Http(String),
    Decode(String),
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http(e) => write!(f, "metric source request failed: {e}"),
            Self::Decode(e) => write!(f, "metric source response invalid: {e}"),
        }
    }
}

impl std::error::Error for SourceError {}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Http(e.to_string())
        }
    }
}

/// Where the liveness poller learns when hosts last reported.
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Unix milliseconds of the newest sample, `None` if the host never reported.
    async fn latest_sample_timestamp(&self, measurement: &str, host: &str) -> Result<Option<i64>, SourceError>;

    async fn list_hosts_reporting(&self, measurement: &str) -> Result<Vec<String>, SourceError>;
}

/// Newest sample timestamp per (measurement, host), fed by ingestion.
#[derive(Clone, Default)]
pub struct LastSeenIndex {
    seen: Arc<DashMap<(String, String), i64>>,
}

impl LastSeenIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Out-of-order samples never move a host's timestamp backwards.
    pub fn record(&self, measurement: &str, host: &str, ts_ms: i64) {
        self.seen
            .entry((measurement.to_string(), host.to_string()))
            .and_modify(|t| *t = (*t).max(ts_ms))
            .or_insert(ts_ms);
    }

    pub fn get(&self, measurement: &str, host: &str) -> Option<i64> {
        self.seen
            .get(&(measurement.to_string(), host.to_string()))
            .map(|t| *t.value())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[async_trait]
impl MetricSource for LastSeenIndex {
    async fn latest_sample_timestamp(&self, measurement: &str, host: &str) -> Result<Option<i64>, SourceError> {
        Ok(self.get(measurement, host))
    }

    async fn list_hosts_reporting(&self, measurement: &str) -> Result<Vec<String>, SourceError> {
        let mut hosts: Vec<String> = self
            .seen
            .iter()
            .filter(|e| e.key().0 == measurement)
            .map(|e| e.key().1.clone())
            .collect();
        hosts.sort();
        Ok(hosts)
    }
}

#[derive(Debug, Clone)]
pub struct InfluxConfig {
    pub url: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
}

/// InfluxQL over the 1.x HTTP `/query` endpoint.
pub struct InfluxMetricSource {
    config: InfluxConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    #[serde(default)]
    series: Vec<Series>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Series {
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

impl InfluxMetricSource {
    pub fn new(config: InfluxConfig) -> Result<Self, SourceError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    async fn query(&self, q: &str) -> Result<Vec<Series>, SourceError> {
        let mut params = vec![
            ("db", self.config.database.as_str()),
            ("q", q),
            ("epoch", "ms"),
        ];
        if let (Some(u), Some(p)) = (&self.config.username, &self.config.password) {
            params.push(("u", u.as_str()));
            params.push(("p", p.as_str()));
        }

        let url = format!("{}/query", self.config.url.trim_end_matches('/'));
        let resp: QueryResponse = self
            .client
            .get(url)
            .query(&params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut series = Vec::new();
        for result in resp.results {
            if let Some(err) = result.error {
                return Err(SourceError::Http(err));
            }
            series.extend(result.series);
        }
        Ok(series)
    }
}

#[async_trait]
impl MetricSource for InfluxMetricSource {
    async fn latest_sample_timestamp(&self, measurement: &str, host: &str) -> Result<Option<i64>, SourceError> {
        let q = format!(
            "SELECT * FROM {} WHERE \"host\" = {} ORDER BY time DESC LIMIT 1",
            quote_ident(measurement),
            quote_literal(host)
        );
        let series = self.query(&q).await?;
        latest_time(&series)
    }

    async fn list_hosts_reporting(&self, measurement: &str) -> Result<Vec<String>, SourceError> {
        let q = format!("SHOW TAG VALUES FROM {} WITH KEY = \"host\"", quote_ident(measurement));
        let series = self.query(&q).await?;
        Ok(tag_values(&series))
    }
}

fn quote_ident(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn latest_time(series: &[Series]) -> Result<Option<i64>, SourceError> {
    let Some(s) = series.first() else {
        return Ok(None);
    };
    let idx = s.columns.iter().position(|c| c == "time").unwrap_or(0);
    match s.values.first().and_then(|row| row.get(idx)) {
        None => Ok(None),
        Some(v) => v
            .as_i64()
            .or_else(|| v.as_f64().map(|f| f as i64))
            .map(Some)
            .ok_or_else(|| SourceError::Decode(format!("time column is not numeric: {v}"))),
    }
}

fn tag_values(series: &[Series]) -> Vec<String> {
    let mut hosts: Vec<String> = series
        .iter()
        .flat_map(|s| {
            let idx = s.columns.iter().position(|c| c == "value").unwrap_or(1);
            s.values
                .iter()
                .filter_map(move |row| row.get(idx).and_then(|v| v.as_str()).map(String::from))
        })
        .collect();
    hosts.sort();
    hosts.dedup();
    hosts
}

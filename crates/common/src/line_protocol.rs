//! Parser for the metric pipeline's line format:
//!
//! ```text
//! measurement,host=<id>[,tag=v...] key1=val1,key2=val2 <unix_nanos>
//! ```
//!
//! Numeric values become [`FieldValue::Int`] or [`FieldValue::Float`] depending on
//! the presence of a decimal point; anything else is kept as a string.

use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Str(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub measurement: String,
    pub host: String,
    pub fields: HashMap<String, FieldValue>,
    pub timestamp_ns: i64,
}

impl Sample {
    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_ns / 1_000_000
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    Empty,
    MissingSection(&'static str),
    InvalidMeasurement(String),
    MissingHost,
    InvalidHost(String),
    NoFields,
    InvalidTimestamp(String),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty line"),
            Self::MissingSection(s) => write!(f, "missing {s}"),
            Self::InvalidMeasurement(m) => write!(f, "invalid measurement: {m}"),
            Self::MissingHost => write!(f, "missing host tag"),
            Self::InvalidHost(h) => write!(f, "invalid host: {h}"),
            Self::NoFields => write!(f, "no fields"),
            Self::InvalidTimestamp(t) => write!(f, "invalid timestamp: {t}"),
        }
    }
}

impl std::error::Error for ParseError {}

pub fn parse_line(line: &str) -> Result<Sample, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ParseError::Empty);
    }

    let (head, rest) = line
        .split_once(' ')
        .ok_or(ParseError::MissingSection("fields"))?;
    let (fields_str, ts_str) = rest
        .trim()
        .rsplit_once(' ')
        .ok_or(ParseError::MissingSection("timestamp"))?;

    let mut tags = head.split(',');
    let measurement = tags.next().unwrap_or_default();
    if measurement.is_empty() || !measurement.chars().all(is_word_char) {
        return Err(ParseError::InvalidMeasurement(measurement.to_string()));
    }

    let host = tags
        .filter_map(|t| t.split_once('='))
        .find(|(k, _)| *k == "host")
        .map(|(_, v)| v)
        .ok_or(ParseError::MissingHost)?;
    if host.is_empty() || !host.chars().all(|c| is_word_char(c) || c == '-') {
        return Err(ParseError::InvalidHost(host.to_string()));
    }

    let timestamp_ns: i64 = ts_str
        .trim()
        .parse()
        .map_err(|_| ParseError::InvalidTimestamp(ts_str.to_string()))?;
    if timestamp_ns < 0 {
        return Err(ParseError::InvalidTimestamp(ts_str.to_string()));
    }

    let fields = parse_fields(fields_str);
    if fields.is_empty() {
        return Err(ParseError::NoFields);
    }

    Ok(Sample {
        measurement: measurement.to_string(),
        host: host.to_string(),
        fields,
        timestamp_ns,
    })
}

/// Parses a request body line by line. Malformed lines are returned alongside
/// their 1-based line number and never stop the rest of the batch.
pub fn parse_batch(body: &str) -> (Vec<Sample>, Vec<(usize, ParseError)>) {
    let mut samples = Vec::new();
    let mut errors = Vec::new();

    for (idx, line) in body.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(line) {
            Ok(s) => samples.push(s),
            Err(e) => errors.push((idx + 1, e)),
        }
    }

    (samples, errors)
}

fn parse_fields(s: &str) -> HashMap<String, FieldValue> {
    let mut fields = HashMap::new();
    for pair in s.split(',') {
        let pair = pair.trim();
        let Some((key, raw)) = pair.split_once('=') else {
            continue;
        };
        if key.is_empty() {
            continue;
        }
        fields.insert(key.to_string(), parse_value(raw));
    }
    fields
}

fn parse_value(raw: &str) -> FieldValue {
    let digits = raw.strip_prefix('-').unwrap_or(raw);
    let int_digits = digits.strip_suffix('i').unwrap_or(digits);

    if !int_digits.is_empty() && int_digits.chars().all(|c| c.is_ascii_digit()) {
        let text = if raw.starts_with('-') {
            format!("-{int_digits}")
        } else {
            int_digits.to_string()
        };
        if let Ok(v) = text.parse::<i64>() {
            return FieldValue::Int(v);
        }
    }

    let dots = digits.chars().filter(|c| *c == '.').count();
    let numeric = digits.chars().all(|c| c.is_ascii_digit() || c == '.');
    if dots == 1 && numeric && digits.len() > 1 {
        if let Ok(v) = raw.parse::<f64>() {
            return FieldValue::Float(v);
        }
    }

    FieldValue::Str(raw.trim_matches('"').to_string())
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cpu_line() {
        let s = parse_line("cpu,host=web-1 percent=95.5,cores=8 1700000000000000000").unwrap();
        assert_eq!(s.measurement, "cpu");
        assert_eq!(s.host, "web-1");
        assert_eq!(s.fields["percent"], FieldValue::Float(95.5));
        assert_eq!(s.fields["cores"], FieldValue::Int(8));
        assert_eq!(s.timestamp_ms(), 1_700_000_000_000);
    }

    #[test]
    fn non_numeric_passes_through_as_string() {
        let s = parse_line("apache,host=h1 state=\"busy\",version=2.4.1 1").unwrap();
        assert_eq!(s.fields["state"], FieldValue::Str("busy".into()));
        assert_eq!(s.fields["version"], FieldValue::Str("2.4.1".into()));
        assert_eq!(s.fields["state"].as_f64(), None);
    }

    #[test]
    fn integer_suffix_and_sign() {
        let s = parse_line("net,host=h1 rx=42i,delta=-3,temp=-1.5 1").unwrap();
        assert_eq!(s.fields["rx"], FieldValue::Int(42));
        assert_eq!(s.fields["delta"], FieldValue::Int(-3));
        assert_eq!(s.fields["temp"], FieldValue::Float(-1.5));
    }

    #[test]
    fn host_tag_may_follow_other_tags() {
        let s = parse_line("disk,path=root,host=db_2 used=10 5").unwrap();
        assert_eq!(s.host, "db_2");
    }

    #[test]
    fn rejects_missing_host() {
        assert_eq!(parse_line("cpu percent=1 1"), Err(ParseError::MissingHost));
    }

    #[test]
    fn rejects_bad_timestamp() {
        let err = parse_line("cpu,host=h1 percent=1 soon").unwrap_err();
        assert!(err.to_string().contains("timestamp"));
    }

    #[test]
    fn rejects_line_without_fields() {
        assert!(parse_line("cpu,host=h1").is_err());
        assert_eq!(parse_line("cpu,host=h1 garbage 1"), Err(ParseError::NoFields));
    }

    #[test]
    fn batch_skips_malformed_lines() {
        let body = "cpu,host=h1 percent=10 1\nnot a metric\n\nmem,host=h1 used=2.5 2\n";
        let (samples, errors) = parse_batch(body);
        assert_eq!(samples.len(), 2);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, 2);
    }
}

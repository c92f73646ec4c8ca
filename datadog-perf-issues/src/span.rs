// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

/// A single observed operation within a trace.
///
/// All fields default so that partially-populated spans deserialize;
/// detection is fail-open and a span missing the fields a detector needs
/// is skipped by that detector, never an error.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Span {
    #[serde(default)]
    pub span_id: String,
    #[serde(default)]
    pub parent_span_id: Option<String>,
    /// Operation category, e.g. "db", "http.client", "resource.script".
    #[serde(default)]
    pub op: String,
    /// Free text: a query, a `"<VERB> <url>"` pair, an asset path.
    #[serde(default)]
    pub description: Option<String>,
    /// Stable content fingerprint of the normalized description,
    /// computed upstream. Equal hashes mean equivalent descriptions.
    #[serde(default)]
    pub hash: Option<String>,
    /// Seconds since epoch.
    #[serde(default)]
    pub start_timestamp: f64,
    /// End of the span, seconds since epoch.
    #[serde(default)]
    pub timestamp: f64,
    /// Operation-specific attributes (payload sizes, render-blocking
    /// status, main-thread flags, ...).
    #[serde(default)]
    pub data: HashMap<String, Value>,
}

impl Span {
    pub fn duration_ms(&self) -> f64 {
        ((self.timestamp - self.start_timestamp) * 1000.0).max(0.0)
    }

    /// True when the two spans' `[start_timestamp, timestamp]` intervals
    /// intersect for more than a point.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start_timestamp < other.timestamp && other.start_timestamp < self.timestamp
    }

    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or("")
    }

    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key)?.as_str()
    }

    /// Numeric attribute; tolerates SDKs that serialize numbers as
    /// strings.
    pub fn data_f64(&self, key: &str) -> Option<f64> {
        match self.data.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn data_bool(&self, key: &str) -> Option<bool> {
        self.data.get(key)?.as_bool()
    }
}

/// True when `op` equals an allowed op or sits under it in the dotted
/// hierarchy ("db" allows "db.sql.query", not "dbx").
pub fn op_allowed(op: &str, allowed: &[String]) -> bool {
    allowed
        .iter()
        .any(|a| op == a || (op.starts_with(a.as_str()) && op.as_bytes().get(a.len()) == Some(&b'.')))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(start: f64, end: f64) -> Span {
        Span {
            start_timestamp: start,
            timestamp: end,
            ..Default::default()
        }
    }

    #[test]
    fn test_duration_and_overlap() {
        let a = span(10.0, 10.5);
        let b = span(10.4, 10.6);
        let c = span(10.5, 10.7);
        assert_eq!(a.duration_ms(), 500.0);
        assert!(a.overlaps(&b));
        // touching endpoints do not overlap
        assert!(!a.overlaps(&c));
        // negative spans clamp to zero
        assert_eq!(span(2.0, 1.0).duration_ms(), 0.0);
    }

    #[test]
    fn test_op_allowed() {
        let allowed = vec!["db".to_string(), "http.client".to_string()];
        assert!(op_allowed("db", &allowed));
        assert!(op_allowed("db.sql.query", &allowed));
        assert!(op_allowed("http.client", &allowed));
        assert!(!op_allowed("dbx", &allowed));
        assert!(!op_allowed("http", &allowed));
    }

    #[test]
    fn test_data_getters() {
        let mut s = Span::default();
        s.data.insert("size".into(), serde_json::json!(1024));
        s.data.insert("size_str".into(), serde_json::json!("2048"));
        s.data.insert("blocked".into(), serde_json::json!(true));
        assert_eq!(s.data_f64("size"), Some(1024.0));
        assert_eq!(s.data_f64("size_str"), Some(2048.0));
        assert_eq!(s.data_bool("blocked"), Some(true));
        assert_eq!(s.data_f64("missing"), None);
    }
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::span::Span;
use serde::Deserialize;
use std::collections::HashMap;

/// Read-only view of one transaction event: the ordered span list plus
/// the transaction-level fields the detectors consult.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub transaction: String,
    /// Spans in original (assumed chronological) order.
    #[serde(default)]
    pub spans: Vec<Span>,
    /// Transaction start, seconds since epoch.
    #[serde(default)]
    pub start_timestamp: f64,
    /// Page-load measurements; `fcp` is in milliseconds.
    #[serde(default)]
    pub measurements: HashMap<String, Measurement>,
    /// The transaction root; a valid parent for top-level spans even
    /// though it never appears in `spans`.
    #[serde(default)]
    pub trace_context: Option<TraceContext>,
    #[serde(default)]
    pub debug_images: Vec<DebugImage>,
    #[serde(default)]
    pub organization_id: u64,
    #[serde(default)]
    pub project_id: u64,
    #[serde(default)]
    pub sdk_name: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Measurement {
    #[serde(default)]
    pub value: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TraceContext {
    #[serde(default)]
    pub span_id: String,
    #[serde(default)]
    pub op: String,
    #[serde(default)]
    pub hash: Option<String>,
}

/// Reference to a debug/mapping file uploaded for this project; used to
/// resolve a symbol mapper for call-stack fingerprints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DebugImage {
    #[serde(default)]
    pub debug_id: String,
    #[serde(default, rename = "type")]
    pub image_type: String,
}

impl Event {
    /// First-Contentful-Paint in milliseconds, when measured.
    pub fn fcp_ms(&self) -> Option<f64> {
        self.measurements.get("fcp").map(|m| m.value)
    }
}

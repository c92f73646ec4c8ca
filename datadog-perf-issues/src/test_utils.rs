// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Span and event builders for tests. Timestamps are taken in
//! milliseconds relative to an epoch of zero and stored as the seconds
//! the wire format uses.

use crate::event::{Event, TraceContext};
use crate::span::Span;
use std::collections::HashMap;

pub fn span_with_parent(
    span_id: &str,
    parent_span_id: Option<&str>,
    op: &str,
    description: &str,
    hash: &str,
    start_ms: f64,
    end_ms: f64,
) -> Span {
    Span {
        span_id: span_id.to_string(),
        parent_span_id: parent_span_id.map(str::to_string),
        op: op.to_string(),
        description: Some(description.to_string()),
        hash: Some(hash.to_string()),
        start_timestamp: start_ms / 1000.0,
        timestamp: end_ms / 1000.0,
        data: HashMap::new(),
    }
}

pub fn make_span(
    span_id: &str,
    op: &str,
    description: &str,
    hash: &str,
    start_ms: f64,
    end_ms: f64,
) -> Span {
    span_with_parent(span_id, None, op, description, hash, start_ms, end_ms)
}

pub fn db_span(span_id: &str, description: &str, hash: &str, start_ms: f64, end_ms: f64) -> Span {
    make_span(span_id, "db", description, hash, start_ms, end_ms)
}

pub fn db_span_with_parent(
    span_id: &str,
    parent_span_id: Option<&str>,
    description: &str,
    hash: &str,
    start_ms: f64,
    end_ms: f64,
) -> Span {
    span_with_parent(
        span_id,
        parent_span_id,
        "db",
        description,
        hash,
        start_ms,
        end_ms,
    )
}

pub fn http_span(span_id: &str, description: &str, hash: &str, start_ms: f64, end_ms: f64) -> Span {
    make_span(span_id, "http.client", description, hash, start_ms, end_ms)
}

/// An event whose trace root is span `"root"`, a valid parent for
/// top-level spans.
pub fn event_with_spans(spans: Vec<Span>) -> Event {
    Event {
        transaction: "/test/transaction".to_string(),
        spans,
        start_timestamp: 0.0,
        trace_context: Some(TraceContext {
            span_id: "root".to_string(),
            op: "http.server".to_string(),
            hash: Some("hroot".to_string()),
        }),
        ..Default::default()
    }
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! End-to-end detection passes over hand-built events.

use datadog_perf_issues::eligibility::PermissiveGates;
use datadog_perf_issues::symbols::NoopSymbolSource;
use datadog_perf_issues::test_utils::{db_span_with_parent, event_with_spans, http_span};
use datadog_perf_issues::{
    detect_performance_problems, DetectionSettings, Event, ProblemType, Span,
};

fn detect(event: &Event) -> Vec<datadog_perf_issues::PerformanceProblem> {
    detect_performance_problems(
        event,
        &DetectionSettings::default(),
        &PermissiveGates,
        &NoopSymbolSource,
    )
}

fn n_plus_one_event() -> Event {
    let mut spans = vec![db_span_with_parent(
        "source",
        Some("root"),
        "SELECT id FROM users LIMIT ?",
        "hsource",
        0.0,
        10.0,
    )];
    for i in 0..6 {
        let start = 10.0 + 20.0 * i as f64;
        spans.push(db_span_with_parent(
            &format!("rep{i}"),
            Some("root"),
            "SELECT * FROM orders WHERE user_id = ?",
            "hrepeat",
            start,
            start + 20.0,
        ));
    }
    event_with_spans(spans)
}

fn queued_http_event(delays_ms: &[f64]) -> Event {
    let spans: Vec<Span> = delays_ms
        .iter()
        .enumerate()
        .map(|(i, &delay)| {
            let mut span = http_span(
                &format!("s{i}"),
                "GET https://service.io/api/items",
                "h1",
                i as f64,
                i as f64 + 3000.0,
            );
            span.data.insert(
                "http.request.request_start".to_string(),
                serde_json::json!(span.start_timestamp + delay / 1000.0),
            );
            span.data.insert(
                "network.protocol.version".to_string(),
                serde_json::json!("1.1"),
            );
            span
        })
        .collect();
    event_with_spans(spans)
}

#[test]
fn test_n_plus_one_detected_end_to_end() {
    let problems = detect(&n_plus_one_event());
    assert_eq!(problems.len(), 1);
    let problem = &problems[0];
    assert_eq!(problem.problem_type, ProblemType::NPlusOneDbQueries);
    assert_eq!(problem.offender_span_ids.len(), 6);
    assert_eq!(problem.cause_span_ids, vec!["source"]);
    assert!(problem.fingerprint.starts_with("1-1006-"));
}

#[test]
fn test_http_overhead_detected_end_to_end() {
    let problems = detect(&queued_http_event(&[0.0, 0.0, 0.0, 0.0, 400.0, 600.0]));
    assert_eq!(problems.len(), 1);
    let problem = &problems[0];
    assert_eq!(problem.problem_type, ProblemType::HttpOverhead);
    assert_eq!(problem.desc, "service.io");
}

#[test]
fn test_http_chain_too_short_not_flagged() {
    let problems = detect(&queued_http_event(&[0.0, 0.0, 0.0, 400.0, 600.0]));
    assert!(problems.is_empty());
}

#[test]
fn test_alternating_non_db_ops_not_mn_plus_one() {
    // A B A B A B with no DB span in the repeating unit
    let mut spans = Vec::new();
    for i in 0..3 {
        let base = 100.0 * i as f64;
        spans.push(db_span_with_parent(
            &format!("a{i}"),
            Some("root"),
            "",
            "ha",
            base,
            base + 40.0,
        ));
        spans.last_mut().unwrap().op = "cache.get".to_string();
        spans.push(db_span_with_parent(
            &format!("b{i}"),
            Some("root"),
            "",
            "hb",
            base + 40.0,
            base + 80.0,
        ));
        spans.last_mut().unwrap().op = "cache.set".to_string();
    }
    let problems = detect(&event_with_spans(spans));
    assert!(problems.is_empty());
}

#[test]
fn test_detection_is_deterministic() {
    let event = n_plus_one_event();
    let first = detect(&event);
    let second = detect(&event);
    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_eq!(a.offender_span_ids, b.offender_span_ids);
    }
}

#[test]
fn test_empty_event_yields_nothing() {
    let problems = detect(&event_with_spans(vec![]));
    assert!(problems.is_empty());
}

#[test]
fn test_malformed_spans_are_skipped_not_fatal() {
    let mut event = n_plus_one_event();
    event.spans.push(Span::default());
    let problems = detect(&event);
    assert_eq!(problems.len(), 1);
}

#[test]
fn test_event_deserializes_with_missing_fields() {
    let event: Event = serde_json::from_str(
        r#"{"transaction": "/x", "spans": [{"span_id": "s1", "op": "db"}]}"#,
    )
    .unwrap();
    assert_eq!(event.spans.len(), 1);
    assert!(detect(&event).is_empty());
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! N+1 DB queries: one "source" query followed by N repeats of a single
//! other query under the same parent span. The repeats must all share a
//! hash, differ from the source's hash, and add up to enough wall time.

use crate::detectors::{is_db_op, store_problem, DetectorKind, PerformanceDetector};
use crate::event::Event;
use crate::fingerprint::fingerprint;
use crate::problem::{EvidenceEntry, PerformanceProblem, ProblemType};
use crate::settings::NPlusOneDbSettings;
use crate::span::Span;
use datadog_span_obfuscation::sql;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct ParentInfo {
    op: String,
    hash: String,
}

pub struct NPlusOneDbDetector {
    settings: NPlusOneDbSettings,
    kind: DetectorKind,
    problem_type: ProblemType,
    /// Non-DB spans (and the trace root) seen so far, by span id. Only
    /// children of these can anchor an N+1 pattern.
    potential_parents: HashMap<String, ParentInfo>,
    source_span: Option<Span>,
    n_hash: Option<String>,
    n_spans: Vec<Span>,
    problems: HashMap<String, PerformanceProblem>,
}

impl NPlusOneDbDetector {
    pub fn new(settings: NPlusOneDbSettings, event: &Event) -> Self {
        Self::with_kind(
            settings,
            event,
            DetectorKind::NPlusOneDb,
            ProblemType::NPlusOneDbQueries,
        )
    }

    /// Same algorithm, different registration: used by the extended
    /// (metrics-only) variant.
    pub(crate) fn with_kind(
        settings: NPlusOneDbSettings,
        event: &Event,
        kind: DetectorKind,
        problem_type: ProblemType,
    ) -> Self {
        let mut potential_parents = HashMap::new();
        if let Some(trace) = &event.trace_context {
            if !trace.span_id.is_empty() {
                potential_parents.insert(
                    trace.span_id.clone(),
                    ParentInfo {
                        op: trace.op.clone(),
                        hash: trace.hash.clone().unwrap_or_default(),
                    },
                );
            }
        }
        Self {
            settings,
            kind,
            problem_type,
            potential_parents,
            source_span: None,
            n_hash: None,
            n_spans: Vec::new(),
            problems: HashMap::new(),
        }
    }

    fn maybe_use_as_source(&mut self, span: &Span) {
        let Some(parent_id) = span.parent_span_id.as_deref() else {
            return;
        };
        if span.hash.is_none() || !self.potential_parents.contains_key(parent_id) {
            return;
        }
        self.source_span = Some(span.clone());
    }

    fn continues_pattern(&self, span: &Span) -> bool {
        let Some(source) = &self.source_span else {
            return false;
        };
        if span.parent_span_id != source.parent_span_id {
            return false;
        }
        let Some(hash) = span.hash.as_deref() else {
            return false;
        };
        // Source and repeats must be different queries.
        if Some(hash) == source.hash.as_deref() {
            return false;
        }
        match self.n_hash.as_deref() {
            // First repeat defines the repeated query.
            None => true,
            Some(n_hash) => hash == n_hash,
        }
    }

    fn maybe_store_problem(&mut self) {
        let Some(source) = &self.source_span else {
            return;
        };
        if self.n_spans.len() < self.settings.count {
            return;
        }
        let total_repeat_ms: f64 = self.n_spans.iter().map(Span::duration_ms).sum();
        if total_repeat_ms < self.settings.duration_threshold_ms {
            return;
        }

        let first_repeat = &self.n_spans[0];
        if !sql::is_complete_query(source.description())
            || !sql::is_complete_query(first_repeat.description())
        {
            return;
        }
        if sql::parameterize_query(first_repeat.description()).is_empty() {
            return;
        }

        let Some(parent_id) = source.parent_span_id.as_deref() else {
            return;
        };
        let Some(parent) = self.potential_parents.get(parent_id) else {
            return;
        };
        let source_hash = source.hash.clone().unwrap_or_default();
        let repeat_hash = first_repeat.hash.clone().unwrap_or_default();

        let fp = fingerprint(
            self.problem_type,
            &[&parent.op, &parent.hash, &source_hash, &repeat_hash],
        );
        let offender_span_ids: Vec<String> =
            self.n_spans.iter().map(|s| s.span_id.clone()).collect();
        let desc = first_repeat.description().to_string();

        let mut evidence_data = HashMap::new();
        evidence_data.insert("op".to_string(), serde_json::json!("db"));
        evidence_data.insert(
            "repeat_count".to_string(),
            serde_json::json!(self.n_spans.len()),
        );
        evidence_data.insert(
            "parent_span_id".to_string(),
            serde_json::json!(parent_id),
        );

        store_problem(
            &mut self.problems,
            PerformanceProblem {
                fingerprint: fp,
                op: "db".to_string(),
                desc: desc.clone(),
                problem_type: self.problem_type,
                parent_span_ids: vec![parent_id.to_string()],
                cause_span_ids: vec![source.span_id.clone()],
                offender_span_ids,
                evidence_data,
                evidence_display: vec![EvidenceEntry::new("Repeating query", desc, true)],
            },
        );
    }

    fn reset_detection(&mut self) {
        self.source_span = None;
        self.n_hash = None;
        self.n_spans.clear();
    }
}

impl PerformanceDetector for NPlusOneDbDetector {
    fn kind(&self) -> DetectorKind {
        self.kind
    }

    fn visit_span(&mut self, span: &Span) {
        if span.span_id.is_empty() {
            return;
        }
        if !is_db_op(&span.op) {
            // A non-DB span ends any pattern in flight and becomes a
            // potential parent for the next one.
            self.maybe_store_problem();
            self.reset_detection();
            self.potential_parents.insert(
                span.span_id.clone(),
                ParentInfo {
                    op: span.op.clone(),
                    hash: span.hash.clone().unwrap_or_default(),
                },
            );
            return;
        }

        if self.source_span.is_none() {
            self.maybe_use_as_source(span);
            return;
        }

        if self.continues_pattern(span) {
            if self.n_hash.is_none() {
                self.n_hash = span.hash.clone();
            }
            self.n_spans.push(span.clone());
        } else {
            self.maybe_store_problem();
            self.reset_detection();
            self.maybe_use_as_source(span);
        }
    }

    fn on_complete(&mut self) {
        self.maybe_store_problem();
        self.reset_detection();
    }

    fn stored_problems(&self) -> &HashMap<String, PerformanceProblem> {
        &self.problems
    }

    fn take_problems(&mut self) -> HashMap<String, PerformanceProblem> {
        std::mem::take(&mut self.problems)
    }
}

/// Metrics-only shadow of [`NPlusOneDbDetector`]: same algorithm run
/// under separate settings for broader framework compatibility, but its
/// findings never surface to users.
pub struct NPlusOneDbExtendedDetector {
    inner: NPlusOneDbDetector,
}

impl NPlusOneDbExtendedDetector {
    pub fn new(settings: NPlusOneDbSettings, event: &Event) -> Self {
        Self {
            inner: NPlusOneDbDetector::with_kind(
                settings,
                event,
                DetectorKind::NPlusOneDbExtended,
                ProblemType::NPlusOneDbQueriesExtended,
            ),
        }
    }
}

impl PerformanceDetector for NPlusOneDbExtendedDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::NPlusOneDbExtended
    }

    fn visit_span(&mut self, span: &Span) {
        self.inner.visit_span(span);
    }

    fn on_complete(&mut self) {
        self.inner.on_complete();
    }

    fn stored_problems(&self) -> &HashMap<String, PerformanceProblem> {
        self.inner.stored_problems()
    }

    fn take_problems(&mut self) -> HashMap<String, PerformanceProblem> {
        self.inner.take_problems()
    }

    fn surfaces_to_users(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{db_span, event_with_spans, span_with_parent};

    fn settings() -> NPlusOneDbSettings {
        NPlusOneDbSettings {
            count: 3,
            duration_threshold_ms: 50.0,
            ..Default::default()
        }
    }

    fn run_detector(event: &Event, settings: NPlusOneDbSettings) -> Vec<PerformanceProblem> {
        let mut detector = NPlusOneDbDetector::new(settings, event);
        for span in &event.spans {
            detector.visit_span(span);
        }
        detector.on_complete();
        detector.take_problems().into_values().collect()
    }

    /// One source query and `n` repeats of another under one parent.
    fn n_plus_one_spans(n: usize) -> Vec<Span> {
        let mut spans = vec![
            span_with_parent("p1", None, "http.server", "GET /users", "hp", 0.0, 1000.0),
            span_with_parent(
                "src",
                Some("p1"),
                "db",
                "SELECT id FROM users LIMIT ?",
                "hsrc",
                10.0,
                20.0,
            ),
        ];
        for i in 0..n {
            let start = 20.0 + (i as f64) * 60.0;
            spans.push(span_with_parent(
                &format!("n{i}"),
                Some("p1"),
                "db",
                "SELECT * FROM profiles WHERE user_id = ?",
                "hrep",
                start,
                start + 60.0,
            ));
        }
        spans
    }

    #[test]
    fn test_detects_n_plus_one() {
        let event = event_with_spans(n_plus_one_spans(3));
        let problems = run_detector(&event, settings());
        assert_eq!(problems.len(), 1);
        let problem = &problems[0];
        assert_eq!(problem.problem_type, ProblemType::NPlusOneDbQueries);
        assert_eq!(problem.offender_span_ids.len(), 3);
        assert_eq!(problem.cause_span_ids, vec!["src"]);
        assert_eq!(problem.parent_span_ids, vec!["p1"]);
    }

    #[test]
    fn test_below_count_threshold() {
        let event = event_with_spans(n_plus_one_spans(2));
        assert!(run_detector(&event, settings()).is_empty());
    }

    #[test]
    fn test_fingerprint_depends_on_four_tuple_only() {
        let a = run_detector(&event_with_spans(n_plus_one_spans(3)), settings());
        let b = run_detector(&event_with_spans(n_plus_one_spans(5)), settings());
        // more repeats, same parent/source/repeat hashes: same group
        assert_eq!(a[0].fingerprint, b[0].fingerprint);
    }

    #[test]
    fn test_repeats_under_different_parent_not_counted() {
        let mut spans = n_plus_one_spans(2);
        spans.push(span_with_parent(
            "p2", None, "http.server", "GET /other", "hp2", 500.0, 900.0,
        ));
        spans.push(span_with_parent(
            "x1",
            Some("p2"),
            "db",
            "SELECT * FROM profiles WHERE user_id = ?",
            "hrep",
            510.0,
            580.0,
        ));
        let event = event_with_spans(spans);
        assert!(run_detector(&event, settings()).is_empty());
    }

    #[test]
    fn test_truncated_source_rejected() {
        let mut spans = n_plus_one_spans(3);
        spans[1].description = Some("SELECT id FROM users WHERE na...".to_string());
        let event = event_with_spans(spans);
        assert!(run_detector(&event, settings()).is_empty());
    }

    #[test]
    fn test_duration_threshold() {
        let mut spans = n_plus_one_spans(3);
        // shrink every repeat to 10ms: 30ms total, under the 50ms floor
        for span in spans.iter_mut().skip(2) {
            span.timestamp = span.start_timestamp + 0.010;
        }
        let event = event_with_spans(spans);
        assert!(run_detector(&event, settings()).is_empty());
    }

    #[test]
    fn test_extended_variant_is_metrics_only() {
        let event = event_with_spans(n_plus_one_spans(3));
        let mut detector = NPlusOneDbExtendedDetector::new(settings(), &event);
        for span in &event.spans {
            detector.visit_span(span);
        }
        detector.on_complete();
        assert!(!detector.surfaces_to_users());
        // it still finds the problem, for metrics
        assert_eq!(detector.stored_problems().len(), 1);
    }

    #[test]
    fn test_db_span_without_known_parent_ignored() {
        let spans = vec![db_span("s1", "SELECT * FROM a", "h1", 0.0, 100.0)];
        let event = event_with_spans(spans);
        assert!(run_detector(&event, settings()).is_empty());
    }
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Slow DB query: a single read query over the duration threshold.

use crate::detectors::{store_problem, DetectorKind, PerformanceDetector};
use crate::fingerprint::fingerprint;
use crate::problem::{EvidenceEntry, PerformanceProblem, ProblemType};
use crate::settings::SlowDbQuerySettings;
use crate::span::{op_allowed, Span};
use datadog_span_obfuscation::sql;
use std::collections::HashMap;

pub struct SlowDbQueryDetector {
    settings: SlowDbQuerySettings,
    problems: HashMap<String, PerformanceProblem>,
}

impl SlowDbQueryDetector {
    pub fn new(settings: SlowDbQuerySettings) -> Self {
        Self {
            settings,
            problems: HashMap::new(),
        }
    }
}

impl PerformanceDetector for SlowDbQueryDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::SlowDbQuery
    }

    fn visit_span(&mut self, span: &Span) {
        if !op_allowed(&span.op, &self.settings.allowed_span_ops) {
            return;
        }
        if span.duration_ms() < self.settings.duration_threshold_ms {
            return;
        }
        let description = span.description();
        // Only reads: writes and DDL are slow for reasons a user often
        // cannot act on from a trace.
        if !description
            .trim_start()
            .get(..6)
            .is_some_and(|head| head.eq_ignore_ascii_case("select"))
        {
            return;
        }
        if !sql::is_complete_query(description) {
            return;
        }
        let Some(hash) = span.hash.as_deref() else {
            return;
        };

        let fp = fingerprint(ProblemType::SlowDbQuery, &[hash]);
        let mut evidence_data = HashMap::new();
        evidence_data.insert("op".to_string(), serde_json::json!("db"));
        evidence_data.insert(
            "duration_ms".to_string(),
            serde_json::json!(span.duration_ms().round()),
        );

        store_problem(
            &mut self.problems,
            PerformanceProblem {
                fingerprint: fp,
                op: "db".to_string(),
                desc: description.to_string(),
                problem_type: ProblemType::SlowDbQuery,
                parent_span_ids: vec![],
                cause_span_ids: vec![],
                offender_span_ids: vec![span.span_id.clone()],
                evidence_data,
                evidence_display: vec![EvidenceEntry::new(
                    "Slow query",
                    description.to_string(),
                    true,
                )],
            },
        );
    }

    fn stored_problems(&self) -> &HashMap<String, PerformanceProblem> {
        &self.problems
    }

    fn take_problems(&mut self) -> HashMap<String, PerformanceProblem> {
        std::mem::take(&mut self.problems)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::db_span;

    fn run_detector(spans: Vec<Span>) -> HashMap<String, PerformanceProblem> {
        let mut detector = SlowDbQueryDetector::new(SlowDbQuerySettings::default());
        for span in &spans {
            detector.visit_span(span);
        }
        detector.on_complete();
        detector.take_problems()
    }

    #[test]
    fn test_detects_slow_select() {
        let problems = run_detector(vec![db_span(
            "s1",
            "SELECT * FROM orders WHERE total > ?",
            "h1",
            0.0,
            1500.0,
        )]);
        assert_eq!(problems.len(), 1);
        let problem = problems.values().next().unwrap();
        assert_eq!(problem.problem_type, ProblemType::SlowDbQuery);
        assert_eq!(problem.offender_span_ids, vec!["s1"]);
    }

    #[test]
    fn test_fast_query_ignored() {
        let problems = run_detector(vec![db_span("s1", "SELECT 1", "h1", 0.0, 500.0)]);
        assert!(problems.is_empty());
    }

    #[test]
    fn test_write_query_ignored() {
        let problems = run_detector(vec![db_span(
            "s1",
            "UPDATE orders SET total = ?",
            "h1",
            0.0,
            1500.0,
        )]);
        assert!(problems.is_empty());
    }

    #[test]
    fn test_repeats_collapse_to_one_problem() {
        let problems = run_detector(vec![
            db_span("s1", "SELECT * FROM orders", "h1", 0.0, 1500.0),
            db_span("s2", "SELECT * FROM orders", "h1", 1500.0, 3000.0),
        ]);
        assert_eq!(problems.len(), 1);
        // first offender wins
        let problem = problems.values().next().unwrap();
        assert_eq!(problem.offender_span_ids, vec!["s1"]);
    }
}

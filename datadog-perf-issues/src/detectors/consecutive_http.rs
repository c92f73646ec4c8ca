// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Consecutive HTTP calls. A run of sequential HTTP-client spans with
//! small gaps between them is flagged when issuing them concurrently
//! would save enough wall time. Unlike the DB variant there is no
//! independence analysis: HTTP calls in one run are presumed
//! parallelizable.

use crate::detectors::{store_problem, DetectorKind, PerformanceDetector};
use crate::fingerprint::fingerprint;
use crate::problem::{EvidenceEntry, PerformanceProblem, ProblemType};
use crate::settings::ConsecutiveHttpSettings;
use crate::span::{op_allowed, Span};
use datadog_span_obfuscation::http;
use std::collections::HashMap;

pub struct ConsecutiveHttpDetector {
    settings: ConsecutiveHttpSettings,
    run: Vec<Span>,
    problems: HashMap<String, PerformanceProblem>,
}

impl ConsecutiveHttpDetector {
    pub fn new(settings: ConsecutiveHttpSettings) -> Self {
        Self {
            settings,
            run: Vec::new(),
            problems: HashMap::new(),
        }
    }

    fn is_eligible(&self, span: &Span) -> bool {
        if !op_allowed(&span.op, &self.settings.allowed_span_ops) {
            return false;
        }
        // Membership condition, not a validation of the finished run: a
        // fast span ends the run and each side validates independently.
        if span.duration_ms() < self.settings.span_duration_threshold_ms {
            return false;
        }
        match http::parse_verb_and_url(span.description()) {
            Some((_, url)) => !http::is_asset_url(url) && !http::is_graphql_url(url),
            None => false,
        }
    }

    fn breaks_run(&self, span: &Span) -> bool {
        match self.run.last() {
            Some(last) => {
                let gap_ms = (span.start_timestamp - last.timestamp) * 1000.0;
                span.start_timestamp < last.timestamp
                    || gap_ms > self.settings.max_duration_between_spans_ms
            }
            None => false,
        }
    }

    fn validate_and_store(&mut self) {
        if self.run.len() < self.settings.consecutive_count_threshold {
            return;
        }

        let total: f64 = self.run.iter().map(Span::duration_ms).sum();
        let max_single = self
            .run
            .iter()
            .map(Span::duration_ms)
            .fold(0.0_f64, f64::max);
        let time_saved = total - max_single;
        if time_saved < self.settings.min_time_saved_ms {
            return;
        }

        let mut paths: Vec<String> = self
            .run
            .iter()
            .filter_map(|s| http::parse_verb_and_url(s.description()))
            .map(|(_, url)| http::parameterize_url_path(url))
            .collect();
        paths.sort();
        let path_refs: Vec<&str> = paths.iter().map(String::as_str).collect();
        let fp = fingerprint(ProblemType::ConsecutiveHttp, &path_refs);

        let offender_span_ids: Vec<String> = self.run.iter().map(|s| s.span_id.clone()).collect();
        let desc = self.run[0].description().to_string();

        let mut evidence_data = HashMap::new();
        evidence_data.insert("op".to_string(), serde_json::json!("http.client"));
        evidence_data.insert(
            "time_saved_ms".to_string(),
            serde_json::json!(time_saved.round()),
        );

        store_problem(
            &mut self.problems,
            PerformanceProblem {
                fingerprint: fp,
                op: "http.client".to_string(),
                desc: desc.clone(),
                problem_type: ProblemType::ConsecutiveHttp,
                parent_span_ids: vec![],
                cause_span_ids: offender_span_ids.clone(),
                offender_span_ids,
                evidence_data,
                evidence_display: vec![EvidenceEntry::new("Consecutive requests", desc, true)],
            },
        );
    }
}

impl PerformanceDetector for ConsecutiveHttpDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::ConsecutiveHttp
    }

    fn visit_span(&mut self, span: &Span) {
        if !self.is_eligible(span) {
            self.validate_and_store();
            self.run.clear();
            return;
        }
        if self.breaks_run(span) {
            self.validate_and_store();
            self.run.clear();
        }
        self.run.push(span.clone());
    }

    fn on_complete(&mut self) {
        self.validate_and_store();
        self.run.clear();
    }

    fn stored_problems(&self) -> &HashMap<String, PerformanceProblem> {
        &self.problems
    }

    fn take_problems(&mut self) -> HashMap<String, PerformanceProblem> {
        std::mem::take(&mut self.problems)
    }
}

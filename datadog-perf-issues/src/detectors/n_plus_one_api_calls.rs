// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! N+1 API calls: a burst of concurrent GET requests to the same
//! parameterized endpoint (`/users/1`, `/users/2`, ...) issued from one
//! parent, typically a render loop fanning out one request per item.

use crate::detectors::{store_problem, DetectorKind, PerformanceDetector};
use crate::fingerprint::fingerprint;
use crate::problem::{EvidenceEntry, PerformanceProblem, ProblemType};
use crate::settings::NPlusOneApiCallsSettings;
use crate::span::{op_allowed, Span};
use datadog_span_obfuscation::http;
use std::collections::HashMap;

pub struct NPlusOneApiCallsDetector {
    settings: NPlusOneApiCallsSettings,
    spans: Vec<Span>,
    problems: HashMap<String, PerformanceProblem>,
}

impl NPlusOneApiCallsDetector {
    pub fn new(settings: NPlusOneApiCallsSettings) -> Self {
        Self {
            settings,
            spans: Vec::new(),
            problems: HashMap::new(),
        }
    }

    fn is_eligible(&self, span: &Span) -> bool {
        if !op_allowed(&span.op, &self.settings.allowed_span_ops) {
            return false;
        }
        if span.duration_ms() < self.settings.span_duration_threshold_ms {
            return false;
        }
        let Some((verb, url)) = http::parse_verb_and_url(span.description()) else {
            return false;
        };
        verb == "GET" && !http::is_graphql_url(url) && !http::is_asset_url(url)
    }

    /// Part of the current group: started at (almost) the same time as
    /// the previous member and equivalent to it.
    fn continues_group(&self, span: &Span) -> bool {
        let Some(previous) = self.spans.last() else {
            return true;
        };
        let delta_ms = (span.start_timestamp - previous.start_timestamp).abs() * 1000.0;
        delta_ms <= self.settings.concurrency_threshold_ms
            && span.hash == previous.hash
            && span.parent_span_id == previous.parent_span_id
    }

    fn maybe_store_problem(&mut self) {
        if self.spans.len() < self.settings.count {
            return;
        }
        let Some((_, url)) = http::parse_verb_and_url(self.spans[0].description()) else {
            return;
        };
        let literal_path = http::url_path(url);
        let template = http::parameterize_url_path(url);
        // An unparameterizable URL would fingerprint every literal path
        // separately and explode the group count; drop it instead.
        if template == literal_path {
            return;
        }

        let fp = fingerprint(ProblemType::NPlusOneApiCalls, &[&template]);
        let offender_span_ids: Vec<String> =
            self.spans.iter().map(|s| s.span_id.clone()).collect();
        let parent_span_ids: Vec<String> = self.spans[0]
            .parent_span_id
            .clone()
            .into_iter()
            .collect();

        let mut evidence_data = HashMap::new();
        evidence_data.insert("op".to_string(), serde_json::json!("http.client"));
        evidence_data.insert(
            "request_count".to_string(),
            serde_json::json!(self.spans.len()),
        );
        evidence_data.insert("path_template".to_string(), serde_json::json!(template));

        store_problem(
            &mut self.problems,
            PerformanceProblem {
                fingerprint: fp,
                op: "http.client".to_string(),
                desc: template.clone(),
                problem_type: ProblemType::NPlusOneApiCalls,
                parent_span_ids,
                cause_span_ids: vec![],
                offender_span_ids,
                evidence_data,
                evidence_display: vec![EvidenceEntry::new("Repeating request", template, true)],
            },
        );
    }
}

impl PerformanceDetector for NPlusOneApiCallsDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::NPlusOneApiCalls
    }

    fn visit_span(&mut self, span: &Span) {
        // Ineligible spans are transparent; callers interleave all kinds
        // of spans between the fanned-out requests.
        if !self.is_eligible(span) {
            return;
        }
        if self.continues_group(span) {
            self.spans.push(span.clone());
        } else {
            self.maybe_store_problem();
            self.spans.clear();
            self.spans.push(span.clone());
        }
    }

    fn on_complete(&mut self) {
        self.maybe_store_problem();
        self.spans.clear();
    }

    fn stored_problems(&self) -> &HashMap<String, PerformanceProblem> {
        &self.problems
    }

    fn take_problems(&mut self) -> HashMap<String, PerformanceProblem> {
        std::mem::take(&mut self.problems)
    }
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Consecutive DB queries. Maintains a run of sequential (non
//! time-overlapping) database reads and, when the run ends, estimates
//! how much wall time parallelizing the *independent* queries would
//! save. A query is independent when it has no `WHERE` clause and no
//! literals or placeholders, so it cannot depend on a neighbor's result.

use crate::detectors::{store_problem, DetectorKind, PerformanceDetector};
use crate::fingerprint::fingerprint;
use crate::problem::{EvidenceEntry, PerformanceProblem, ProblemType};
use crate::settings::ConsecutiveDbSettings;
use crate::span::{op_allowed, Span};
use datadog_span_obfuscation::sql;
use std::collections::HashMap;

pub struct ConsecutiveDbDetector {
    settings: ConsecutiveDbSettings,
    run: Vec<Span>,
    problems: HashMap<String, PerformanceProblem>,
}

impl ConsecutiveDbDetector {
    pub fn new(settings: ConsecutiveDbSettings) -> Self {
        Self {
            settings,
            run: Vec::new(),
            problems: HashMap::new(),
        }
    }

    fn is_db_query(&self, span: &Span) -> bool {
        if !op_allowed(&span.op, &self.settings.allowed_span_ops) {
            return false;
        }
        let description = span.description();
        !description.is_empty()
            && description
                .trim_start()
                .get(..6)
                .is_some_and(|head| head.eq_ignore_ascii_case("select"))
    }

    fn overlaps_last(&self, span: &Span) -> bool {
        self.run
            .last()
            .is_some_and(|last| span.start_timestamp < last.timestamp)
    }

    fn validate_and_store(&mut self) {
        if self.run.len() < self.settings.consecutive_count_threshold {
            return;
        }

        let independent: Vec<usize> = self
            .run
            .iter()
            .enumerate()
            .filter(|(_, s)| sql::is_independent_query(s.description()))
            .map(|(i, _)| i)
            .collect();
        if independent.is_empty() {
            return;
        }
        if independent
            .iter()
            .any(|&i| self.run[i].duration_ms() <= self.settings.span_duration_threshold_ms)
        {
            return;
        }

        let total: f64 = self.run.iter().map(Span::duration_ms).sum();
        let max_independent = independent
            .iter()
            .map(|&i| self.run[i].duration_ms())
            .fold(0.0_f64, f64::max);
        let sum_dependent: f64 = self
            .run
            .iter()
            .enumerate()
            .filter(|(i, _)| !independent.contains(i))
            .map(|(_, s)| s.duration_ms())
            .sum();

        // Parallelizing leaves the dependent chain plus the longest
        // independent query on the critical path.
        let time_saved = total - max_independent.max(sum_dependent);
        if time_saved < self.settings.min_time_saved_ms {
            return;
        }
        if total <= 0.0 || time_saved / total < self.settings.time_saved_ratio {
            return;
        }

        let first_independent = independent[0];
        let preceding_dependent = self.run[..first_independent]
            .iter()
            .rev()
            .find(|s| !sql::is_independent_query(s.description()));

        let mut parts: Vec<String> = Vec::with_capacity(independent.len() + 1);
        if let Some(dependent) = preceding_dependent {
            parts.push(sql::parameterize_query(dependent.description()));
        }
        for &i in &independent {
            parts.push(sql::parameterize_query(self.run[i].description()));
        }
        let part_refs: Vec<&str> = parts.iter().map(String::as_str).collect();
        let fp = fingerprint(ProblemType::ConsecutiveDbQueries, &part_refs);

        let offender_span_ids: Vec<String> = independent
            .iter()
            .map(|&i| self.run[i].span_id.clone())
            .collect();
        let cause_span_ids: Vec<String> = self.run.iter().map(|s| s.span_id.clone()).collect();
        let desc = self.run[first_independent].description().to_string();

        let mut evidence_data = HashMap::new();
        evidence_data.insert("op".to_string(), serde_json::json!("db"));
        evidence_data.insert(
            "time_saved_ms".to_string(),
            serde_json::json!(time_saved.round()),
        );
        evidence_data.insert(
            "span_count".to_string(),
            serde_json::json!(self.run.len()),
        );

        store_problem(
            &mut self.problems,
            PerformanceProblem {
                fingerprint: fp,
                op: "db".to_string(),
                desc: desc.clone(),
                problem_type: ProblemType::ConsecutiveDbQueries,
                parent_span_ids: vec![],
                cause_span_ids,
                offender_span_ids,
                evidence_data,
                evidence_display: vec![EvidenceEntry::new("Transaction", desc, true)],
            },
        );
    }
}

impl PerformanceDetector for ConsecutiveDbDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::ConsecutiveDb
    }

    fn visit_span(&mut self, span: &Span) {
        let is_db = self.is_db_query(span);
        if !is_db || self.overlaps_last(span) {
            self.validate_and_store();
            self.run.clear();
        }
        if is_db {
            self.run.push(span.clone());
        }
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

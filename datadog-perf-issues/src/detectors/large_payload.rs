// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Large HTTP payload: an API response body over the size threshold.
//! Asset downloads are excluded; they have their own detectors.

use crate::detectors::{store_problem, DetectorKind, PerformanceDetector};
use crate::fingerprint::fingerprint;
use crate::problem::{EvidenceEntry, PerformanceProblem, ProblemType};
use crate::settings::LargeHttpPayloadSettings;
use crate::span::Span;
use datadog_span_obfuscation::http;
use std::collections::HashMap;

const RESPONSE_CONTENT_LENGTH: &str = "http.response_content_length";

pub struct LargeHttpPayloadDetector {
    settings: LargeHttpPayloadSettings,
    problems: HashMap<String, PerformanceProblem>,
}

impl LargeHttpPayloadDetector {
    pub fn new(settings: LargeHttpPayloadSettings) -> Self {
        Self {
            settings,
            problems: HashMap::new(),
        }
    }
}

impl PerformanceDetector for LargeHttpPayloadDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::LargeHttpPayload
    }

    fn visit_span(&mut self, span: &Span) {
        if span.op != "http.client" {
            return;
        }
        let Some(size) = span.data_f64(RESPONSE_CONTENT_LENGTH) else {
            return;
        };
        if size < self.settings.payload_size_threshold_bytes {
            return;
        }
        let Some((_, url)) = http::parse_verb_and_url(span.description()) else {
            return;
        };
        if http::is_asset_url(url) {
            return;
        }
        let Some(hash) = span.hash.as_deref() else {
            return;
        };

        let fp = fingerprint(ProblemType::LargeHttpPayload, &[hash]);
        let mut evidence_data = HashMap::new();
        evidence_data.insert("op".to_string(), serde_json::json!("http.client"));
        evidence_data.insert("payload_size_bytes".to_string(), serde_json::json!(size));

        store_problem(
            &mut self.problems,
            PerformanceProblem {
                fingerprint: fp,
                op: "http.client".to_string(),
                desc: span.description().to_string(),
                problem_type: ProblemType::LargeHttpPayload,
                parent_span_ids: vec![],
                cause_span_ids: vec![],
                offender_span_ids: vec![span.span_id.clone()],
                evidence_data,
                evidence_display: vec![EvidenceEntry::new(
                    "Large payload",
                    span.description().to_string(),
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

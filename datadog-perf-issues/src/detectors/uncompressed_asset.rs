// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Uncompressed asset: a sizable resource download whose transfer size
//! equals its decoded body size, meaning no content encoding was applied
//! on the wire.

use crate::detectors::{store_problem, DetectorKind, PerformanceDetector};
use crate::fingerprint::fingerprint;
use crate::problem::{EvidenceEntry, PerformanceProblem, ProblemType};
use crate::settings::UncompressedAssetSettings;
use crate::span::{op_allowed, Span};
use datadog_span_obfuscation::http;
use std::collections::HashMap;

const RESPONSE_CONTENT_LENGTH: &str = "http.response_content_length";
const RESPONSE_TRANSFER_SIZE: &str = "http.response_transfer_size";

pub struct UncompressedAssetDetector {
    settings: UncompressedAssetSettings,
    problems: HashMap<String, PerformanceProblem>,
}

impl UncompressedAssetDetector {
    pub fn new(settings: UncompressedAssetSettings) -> Self {
        Self {
            settings,
            problems: HashMap::new(),
        }
    }
}

impl PerformanceDetector for UncompressedAssetDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::UncompressedAsset
    }

    fn visit_span(&mut self, span: &Span) {
        if !op_allowed(&span.op, &self.settings.allowed_span_ops) {
            return;
        }
        let Some(content_length) = span.data_f64(RESPONSE_CONTENT_LENGTH) else {
            return;
        };
        let Some(transfer_size) = span.data_f64(RESPONSE_TRANSFER_SIZE) else {
            return;
        };
        // A transfer smaller than the body means the wire bytes were
        // encoded; a zero transfer means a cache hit.
        if transfer_size <= 0.0 || transfer_size != content_length {
            return;
        }
        if content_length < self.settings.size_threshold_bytes {
            return;
        }
        if span.duration_ms() < self.settings.duration_threshold_ms {
            return;
        }
        let description = span.description();
        if description.is_empty() {
            return;
        }

        let template = http::parameterize_url_path(description);
        let fp = fingerprint(ProblemType::UncompressedAsset, &[&template]);
        let mut evidence_data = HashMap::new();
        evidence_data.insert("op".to_string(), serde_json::json!(span.op.clone()));
        evidence_data.insert(
            "asset_size_bytes".to_string(),
            serde_json::json!(content_length),
        );

        store_problem(
            &mut self.problems,
            PerformanceProblem {
                fingerprint: fp,
                op: span.op.clone(),
                desc: description.to_string(),
                problem_type: ProblemType::UncompressedAsset,
                parent_span_ids: vec![],
                cause_span_ids: vec![],
                offender_span_ids: vec![span.span_id.clone()],
                evidence_data,
                evidence_display: vec![EvidenceEntry::new(
                    "Uncompressed asset",
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
    use crate::test_utils::make_span;

    fn asset_span(id: &str, content_length: u64, transfer_size: u64, duration_ms: f64) -> Span {
        let mut span = make_span(
            id,
            "resource.script",
            "https://cdn.io/static/app.js",
            "h1",
            0.0,
            duration_ms,
        );
        span.data.insert(
            RESPONSE_CONTENT_LENGTH.to_string(),
            serde_json::json!(content_length),
        );
        span.data.insert(
            RESPONSE_TRANSFER_SIZE.to_string(),
            serde_json::json!(transfer_size),
        );
        span
    }

    fn run_detector(spans: Vec<Span>) -> HashMap<String, PerformanceProblem> {
        let mut detector = UncompressedAssetDetector::new(UncompressedAssetSettings::default());
        for span in &spans {
            detector.visit_span(span);
        }
        detector.on_complete();
        detector.take_problems()
    }

    #[test]
    fn test_detects_uncompressed_asset() {
        let problems = run_detector(vec![asset_span("s1", 600_000, 600_000, 400.0)]);
        assert_eq!(problems.len(), 1);
        assert_eq!(
            problems.values().next().unwrap().problem_type,
            ProblemType::UncompressedAsset
        );
    }

    #[test]
    fn test_compressed_asset_ignored() {
        // transfer smaller than body: encoding was applied
        let problems = run_detector(vec![asset_span("s1", 600_000, 180_000, 400.0)]);
        assert!(problems.is_empty());
    }

    #[test]
    fn test_cache_hit_ignored() {
        let problems = run_detector(vec![asset_span("s1", 600_000, 0, 400.0)]);
        assert!(problems.is_empty());
    }

    #[test]
    fn test_small_or_fast_asset_ignored() {
        assert!(run_detector(vec![asset_span("s1", 100_000, 100_000, 400.0)]).is_empty());
        assert!(run_detector(vec![asset_span("s1", 600_000, 600_000, 50.0)]).is_empty());
    }
}

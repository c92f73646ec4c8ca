// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Render-blocking asset: a script that delayed First Contentful Paint.
//! Only meaningful when the event measured an FCP in a plausible range,
//! and only for spans that started before paint: once any visited span
//! starts at or after FCP the detector turns itself off for the rest of
//! the event.

use crate::detectors::{store_problem, DetectorKind, PerformanceDetector};
use crate::event::Event;
use crate::fingerprint::fingerprint;
use crate::problem::{EvidenceEntry, PerformanceProblem, ProblemType};
use crate::settings::RenderBlockingAssetSettings;
use crate::span::Span;
use datadog_span_obfuscation::http;
use std::collections::HashMap;

const RENDER_BLOCKING_STATUS: &str = "resource.render_blocking_status";
const RESPONSE_CONTENT_LENGTH: &str = "http.response_content_length";

pub struct RenderBlockingAssetDetector {
    settings: RenderBlockingAssetSettings,
    /// Seconds since epoch at which paint happened; `None` disables the
    /// detector (no FCP, out-of-range FCP, or FCP already passed).
    fcp_deadline: Option<f64>,
    fcp_ms: f64,
    problems: HashMap<String, PerformanceProblem>,
}

impl RenderBlockingAssetDetector {
    pub fn new(settings: RenderBlockingAssetSettings, event: &Event) -> Self {
        let fcp_ms = event.fcp_ms().unwrap_or(0.0);
        let fcp_deadline = event.fcp_ms().and_then(|fcp| {
            if fcp >= settings.fcp_minimum_threshold_ms && fcp <= settings.fcp_maximum_threshold_ms
            {
                Some(event.start_timestamp + fcp / 1000.0)
            } else {
                None
            }
        });
        Self {
            settings,
            fcp_deadline,
            fcp_ms,
            problems: HashMap::new(),
        }
    }
}

impl PerformanceDetector for RenderBlockingAssetDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::RenderBlockingAsset
    }

    fn visit_span(&mut self, span: &Span) {
        let Some(deadline) = self.fcp_deadline else {
            return;
        };
        if span.start_timestamp >= deadline {
            // Paint has happened; nothing after this point can block it.
            self.fcp_deadline = None;
            return;
        }
        if span.op != "resource.script" {
            return;
        }
        // Absent attribute means an older SDK that only instrumented
        // blocking scripts in the first place.
        match span.data_str(RENDER_BLOCKING_STATUS) {
            Some("blocking") | None => {}
            Some(_) => return,
        }
        let Some(size) = span.data_f64(RESPONSE_CONTENT_LENGTH) else {
            return;
        };
        if size < self.settings.minimum_size_bytes {
            return;
        }
        if span.duration_ms() < self.settings.fcp_ratio_threshold * self.fcp_ms {
            return;
        }
        let description = span.description();
        if description.is_empty() {
            return;
        }

        let template = http::parameterize_url_path(description);
        let fp = fingerprint(ProblemType::RenderBlockingAsset, &[&template]);
        let mut evidence_data = HashMap::new();
        evidence_data.insert("op".to_string(), serde_json::json!("resource.script"));
        evidence_data.insert("fcp_ms".to_string(), serde_json::json!(self.fcp_ms));

        store_problem(
            &mut self.problems,
            PerformanceProblem {
                fingerprint: fp,
                op: "resource.script".to_string(),
                desc: description.to_string(),
                problem_type: ProblemType::RenderBlockingAsset,
                parent_span_ids: vec![],
                cause_span_ids: vec![],
                offender_span_ids: vec![span.span_id.clone()],
                evidence_data,
                evidence_display: vec![EvidenceEntry::new(
                    "Blocking script",
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
    use crate::test_utils::{event_with_spans, make_span};

    fn script_span(id: &str, start_ms: f64, end_ms: f64, size: u64) -> Span {
        let mut span = make_span(
            id,
            "resource.script",
            "https://cdn.io/static/app.js",
            "h1",
            start_ms,
            end_ms,
        );
        span.data.insert(
            RESPONSE_CONTENT_LENGTH.to_string(),
            serde_json::json!(size),
        );
        span.data.insert(
            RENDER_BLOCKING_STATUS.to_string(),
            serde_json::json!("blocking"),
        );
        span
    }

    fn run_detector(event: &Event) -> HashMap<String, PerformanceProblem> {
        let mut detector =
            RenderBlockingAssetDetector::new(RenderBlockingAssetSettings::default(), event);
        for span in &event.spans {
            detector.visit_span(span);
        }
        detector.on_complete();
        detector.take_problems()
    }

    fn event_with_fcp(spans: Vec<Span>, fcp_ms: f64) -> Event {
        let mut event = event_with_spans(spans);
        event
            .measurements
            .insert("fcp".to_string(), crate::event::Measurement { value: fcp_ms });
        event
    }

    #[test]
    fn test_detects_blocking_script() {
        // FCP 3s; the script runs 0..1.5s, half of FCP
        let event = event_with_fcp(vec![script_span("s1", 0.0, 1500.0, 2_000_000)], 3000.0);
        let problems = run_detector(&event);
        assert_eq!(problems.len(), 1);
        assert_eq!(
            problems.values().next().unwrap().problem_type,
            ProblemType::RenderBlockingAsset
        );
    }

    #[test]
    fn test_no_fcp_measurement_disables_detector() {
        let event = event_with_spans(vec![script_span("s1", 0.0, 1500.0, 2_000_000)]);
        assert!(run_detector(&event).is_empty());
    }

    #[test]
    fn test_fcp_out_of_range_disables_detector() {
        let event = event_with_fcp(vec![script_span("s1", 0.0, 1500.0, 2_000_000)], 500.0);
        assert!(run_detector(&event).is_empty());
        let event = event_with_fcp(vec![script_span("s1", 0.0, 9000.0, 2_000_000)], 20_000.0);
        assert!(run_detector(&event).is_empty());
    }

    #[test]
    fn test_cutoff_after_fcp() {
        // One span past the deadline disables detection for good, even
        // for later spans that would otherwise qualify.
        let event = event_with_fcp(
            vec![
                make_span("x1", "cache.get", "key", "hx", 3500.0, 3600.0),
                script_span("s1", 3700.0, 5500.0, 2_000_000),
            ],
            3000.0,
        );
        assert!(run_detector(&event).is_empty());
    }

    #[test]
    fn test_short_script_not_flagged() {
        // 200ms of a 3s FCP: under the ratio threshold
        let event = event_with_fcp(vec![script_span("s1", 0.0, 200.0, 2_000_000)], 3000.0);
        assert!(run_detector(&event).is_empty());
    }

    #[test]
    fn test_non_blocking_status_ignored() {
        let mut span = script_span("s1", 0.0, 1500.0, 2_000_000);
        span.data.insert(
            RENDER_BLOCKING_STATUS.to_string(),
            serde_json::json!("non-blocking"),
        );
        let event = event_with_fcp(vec![span], 3000.0);
        assert!(run_detector(&event).is_empty());
    }
}

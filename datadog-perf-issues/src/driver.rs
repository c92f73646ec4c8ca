// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! One detection pass over an event: build every enabled detector,
//! stream the spans through all of them, then gate and merge what they
//! found. Detectors never see each other's state; a pathological span
//! stream can at worst starve one detector of findings.

use crate::detectors::consecutive_db::ConsecutiveDbDetector;
use crate::detectors::consecutive_http::ConsecutiveHttpDetector;
use crate::detectors::http_overhead::HttpOverheadDetector;
use crate::detectors::io_main_thread::{MainThreadIoDetector, MainThreadIoKind};
use crate::detectors::large_payload::LargeHttpPayloadDetector;
use crate::detectors::mn_plus_one_db::MNPlusOneDbDetector;
use crate::detectors::n_plus_one_api_calls::NPlusOneApiCallsDetector;
use crate::detectors::n_plus_one_db::{NPlusOneDbDetector, NPlusOneDbExtendedDetector};
use crate::detectors::render_blocking_asset::RenderBlockingAssetDetector;
use crate::detectors::slow_db_query::SlowDbQueryDetector;
use crate::detectors::uncompressed_asset::UncompressedAssetDetector;
use crate::detectors::PerformanceDetector;
use crate::eligibility::EligibilityGates;
use crate::event::Event;
use crate::problem::PerformanceProblem;
use crate::settings::DetectionSettings;
use crate::symbols::{SymbolMapper, SymbolSource};

/// Resolve a mapper from the event's debug images, first hit wins. Used
/// only by the main-thread detectors for call-stack fingerprints.
fn resolve_mapper(event: &Event, source: &dyn SymbolSource) -> Option<Box<dyn SymbolMapper>> {
    event
        .debug_images
        .iter()
        .find_map(|image| source.mapper_for(&image.debug_id))
}

fn build_detectors(
    event: &Event,
    settings: &DetectionSettings,
    symbol_source: &dyn SymbolSource,
) -> Vec<Box<dyn PerformanceDetector>> {
    let mut detectors: Vec<Box<dyn PerformanceDetector>> = Vec::new();

    if settings.consecutive_db.detection_enabled {
        detectors.push(Box::new(ConsecutiveDbDetector::new(
            settings.consecutive_db.clone(),
        )));
    }
    if settings.consecutive_http.detection_enabled {
        detectors.push(Box::new(ConsecutiveHttpDetector::new(
            settings.consecutive_http.clone(),
        )));
    }
    if settings.n_plus_one_db.detection_enabled {
        detectors.push(Box::new(NPlusOneDbDetector::new(
            settings.n_plus_one_db.clone(),
            event,
        )));
    }
    if settings.n_plus_one_db_extended.detection_enabled {
        detectors.push(Box::new(NPlusOneDbExtendedDetector::new(
            settings.n_plus_one_db_extended.clone(),
            event,
        )));
    }
    if settings.mn_plus_one_db.detection_enabled {
        detectors.push(Box::new(MNPlusOneDbDetector::new(
            settings.mn_plus_one_db.clone(),
            event,
        )));
    }
    if settings.n_plus_one_api_calls.detection_enabled {
        detectors.push(Box::new(NPlusOneApiCallsDetector::new(
            settings.n_plus_one_api_calls.clone(),
        )));
    }
    if settings.slow_db_query.detection_enabled {
        detectors.push(Box::new(SlowDbQueryDetector::new(
            settings.slow_db_query.clone(),
        )));
    }
    if settings.large_http_payload.detection_enabled {
        detectors.push(Box::new(LargeHttpPayloadDetector::new(
            settings.large_http_payload.clone(),
        )));
    }
    if settings.uncompressed_asset.detection_enabled {
        detectors.push(Box::new(UncompressedAssetDetector::new(
            settings.uncompressed_asset.clone(),
        )));
    }
    if settings.render_blocking_asset.detection_enabled {
        detectors.push(Box::new(RenderBlockingAssetDetector::new(
            settings.render_blocking_asset.clone(),
            event,
        )));
    }
    if settings.file_io_main_thread.detection_enabled {
        detectors.push(Box::new(MainThreadIoDetector::new(
            settings.file_io_main_thread.clone(),
            MainThreadIoKind::File,
            resolve_mapper(event, symbol_source),
        )));
    }
    if settings.db_main_thread.detection_enabled {
        detectors.push(Box::new(MainThreadIoDetector::new(
            settings.db_main_thread.clone(),
            MainThreadIoKind::Db,
            resolve_mapper(event, symbol_source),
        )));
    }
    if settings.http_overhead.detection_enabled {
        detectors.push(Box::new(HttpOverheadDetector::new(
            settings.http_overhead.clone(),
        )));
    }

    detectors
}

/// Run every enabled detector over `event` and return the surfaced
/// problems, sorted by fingerprint. Detectors whose gates deny creation
/// still run (their metrics side effects are the caller's concern) but
/// contribute nothing to the result.
pub fn detect_performance_problems(
    event: &Event,
    settings: &DetectionSettings,
    gates: &dyn EligibilityGates,
    symbol_source: &dyn SymbolSource,
) -> Vec<PerformanceProblem> {
    let mut detectors = build_detectors(event, settings, symbol_source);
    tracing::debug!(
        transaction = %event.transaction,
        spans = event.spans.len(),
        detectors = detectors.len(),
        "starting detection pass"
    );

    for span in &event.spans {
        for detector in detectors.iter_mut() {
            detector.visit_span(span);
        }
    }
    for detector in detectors.iter_mut() {
        detector.on_complete();
    }

    let mut problems: Vec<PerformanceProblem> = Vec::new();
    for detector in detectors.iter_mut() {
        let kind = detector.kind();
        let found = detector.take_problems();
        if found.is_empty() {
            continue;
        }
        if !detector.surfaces_to_users() {
            tracing::debug!(detector = kind.as_str(), found = found.len(), "metrics only");
            continue;
        }
        if !gates.creation_allowed_for_system(kind)
            || !gates.creation_allowed_for_organization(kind)
            || !gates.creation_allowed_for_project(kind)
        {
            tracing::debug!(detector = kind.as_str(), "gated off");
            continue;
        }
        tracing::debug!(detector = kind.as_str(), found = found.len(), "problems found");
        problems.extend(found.into_values());
    }

    // Fingerprints collide across detectors only when two detectors
    // report the same underlying issue; keep the first.
    problems.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
    problems.dedup_by(|a, b| a.fingerprint == b.fingerprint);
    problems
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::DetectorKind;
    use crate::eligibility::PermissiveGates;
    use crate::symbols::NoopSymbolSource;
    use crate::test_utils::{db_span_with_parent, event_with_spans};

    struct DenyProject;

    impl EligibilityGates for DenyProject {
        fn creation_allowed_for_system(&self, _kind: DetectorKind) -> bool {
            true
        }

        fn creation_allowed_for_organization(&self, _kind: DetectorKind) -> bool {
            true
        }

        fn creation_allowed_for_project(&self, kind: DetectorKind) -> bool {
            kind != DetectorKind::NPlusOneDb
        }
    }

    fn n_plus_one_event() -> Event {
        let mut spans = vec![db_span_with_parent(
            "source",
            Some("root"),
            "SELECT * FROM users WHERE id = ?",
            "hsource",
            0.0,
            10.0,
        )];
        for i in 0..6 {
            spans.push(db_span_with_parent(
                &format!("rep{i}"),
                Some("root"),
                "SELECT * FROM orders WHERE user_id = ?",
                "hrepeat",
                10.0 + 20.0 * i as f64,
                30.0 + 20.0 * i as f64,
            ));
        }
        event_with_spans(spans)
    }

    #[test]
    fn test_detects_and_sorts() {
        let event = n_plus_one_event();
        let problems = detect_performance_problems(
            &event,
            &DetectionSettings::default(),
            &PermissiveGates,
            &NoopSymbolSource,
        );
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].offender_span_ids.len(), 6);
    }

    #[test]
    fn test_project_gate_suppresses() {
        let event = n_plus_one_event();
        let problems = detect_performance_problems(
            &event,
            &DetectionSettings::default(),
            &DenyProject,
            &NoopSymbolSource,
        );
        assert!(problems.is_empty());
    }

    #[test]
    fn test_disabled_detector_not_built() {
        let event = n_plus_one_event();
        let mut settings = DetectionSettings::default();
        settings.n_plus_one_db.detection_enabled = false;
        settings.n_plus_one_db_extended.detection_enabled = false;
        let problems = detect_performance_problems(
            &event,
            &settings,
            &PermissiveGates,
            &NoopSymbolSource,
        );
        assert!(problems.is_empty());
    }
}

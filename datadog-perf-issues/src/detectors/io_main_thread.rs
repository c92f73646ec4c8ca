// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Main-thread I/O: file or database work flagged by the mobile SDK as
//! having run on the UI thread. Spans are grouped per parent and the
//! group's summed duration is compared to one frame budget; the
//! fingerprint comes from the reporting call stack, deobfuscated when a
//! symbol mapper is available and raw otherwise.

use crate::detectors::{store_problem, DetectorKind, PerformanceDetector};
use crate::fingerprint::fingerprint;
use crate::problem::{EvidenceEntry, PerformanceProblem, ProblemType};
use crate::settings::MainThreadIoSettings;
use crate::span::Span;
use crate::symbols::SymbolMapper;
use std::collections::HashMap;

const BLOCKED_MAIN_THREAD: &str = "blocked_main_thread";
const CALL_STACK: &str = "call_stack";

/// The two flavors share everything but the op filter and problem type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainThreadIoKind {
    File,
    Db,
}

impl MainThreadIoKind {
    fn accepts_op(self, op: &str) -> bool {
        match self {
            MainThreadIoKind::File => op == "file.read" || op == "file.write",
            MainThreadIoKind::Db => op == "db" || op.starts_with("db."),
        }
    }

    fn detector_kind(self) -> DetectorKind {
        match self {
            MainThreadIoKind::File => DetectorKind::FileIoMainThread,
            MainThreadIoKind::Db => DetectorKind::DbMainThread,
        }
    }

    fn problem_type(self) -> ProblemType {
        match self {
            MainThreadIoKind::File => ProblemType::FileIoMainThread,
            MainThreadIoKind::Db => ProblemType::DbMainThread,
        }
    }
}

pub struct MainThreadIoDetector {
    settings: MainThreadIoSettings,
    io_kind: MainThreadIoKind,
    mapper: Option<Box<dyn SymbolMapper>>,
    /// Offending spans grouped by parent span id.
    groups: HashMap<String, Vec<Span>>,
    /// Parent ids in first-seen order, for deterministic emission.
    group_order: Vec<String>,
    problems: HashMap<String, PerformanceProblem>,
}

impl MainThreadIoDetector {
    pub fn new(
        settings: MainThreadIoSettings,
        io_kind: MainThreadIoKind,
        mapper: Option<Box<dyn SymbolMapper>>,
    ) -> Self {
        Self {
            settings,
            io_kind,
            mapper,
            groups: HashMap::new(),
            group_order: Vec::new(),
            problems: HashMap::new(),
        }
    }

    /// `"module.function"` frames, remapped best-effort. A frame the
    /// mapper does not know keeps its raw names.
    fn stack_frames(&self, span: &Span) -> Vec<String> {
        let Some(frames) = span.data.get(CALL_STACK).and_then(|v| v.as_array()) else {
            return vec![];
        };
        frames
            .iter()
            .filter_map(|frame| {
                let module = frame.get("module").and_then(|m| m.as_str()).unwrap_or("");
                let function = frame
                    .get("function")
                    .and_then(|f| f.as_str())
                    .unwrap_or("");
                if module.is_empty() && function.is_empty() {
                    return None;
                }
                let (module, function) = match &self.mapper {
                    Some(mapper) => mapper
                        .remap(module, function)
                        .unwrap_or_else(|| (module.to_string(), function.to_string())),
                    None => (module.to_string(), function.to_string()),
                };
                Some(format!("{module}.{function}"))
            })
            .collect()
    }
}

impl PerformanceDetector for MainThreadIoDetector {
    fn kind(&self) -> DetectorKind {
        self.io_kind.detector_kind()
    }

    fn visit_span(&mut self, span: &Span) {
        if !self.io_kind.accepts_op(&span.op) {
            return;
        }
        if span.data_bool(BLOCKED_MAIN_THREAD) != Some(true) {
            return;
        }
        let Some(parent_id) = span.parent_span_id.clone() else {
            return;
        };
        let group = self.groups.entry(parent_id.clone()).or_default();
        if group.is_empty() {
            self.group_order.push(parent_id);
        }
        group.push(span.clone());
    }

    fn on_complete(&mut self) {
        for parent_id in std::mem::take(&mut self.group_order) {
            let Some(spans) = self.groups.remove(&parent_id) else {
                continue;
            };
            let total_ms: f64 = spans.iter().map(Span::duration_ms).sum();
            if total_ms < self.settings.duration_threshold_ms {
                continue;
            }

            let frames = self.stack_frames(&spans[0]);
            let frame_refs: Vec<&str> = frames.iter().map(String::as_str).collect();
            let fp = if frame_refs.is_empty() {
                // No call stack: fall back to the span description so
                // the problem still groups stably.
                fingerprint(self.io_kind.problem_type(), &[spans[0].description()])
            } else {
                fingerprint(self.io_kind.problem_type(), &frame_refs)
            };

            let offender_span_ids: Vec<String> =
                spans.iter().map(|s| s.span_id.clone()).collect();
            let desc = spans[0].description().to_string();
            let op = spans[0].op.clone();

            let mut evidence_data = HashMap::new();
            evidence_data.insert("op".to_string(), serde_json::json!(op.clone()));
            evidence_data.insert(
                "total_duration_ms".to_string(),
                serde_json::json!(total_ms.round()),
            );

            store_problem(
                &mut self.problems,
                PerformanceProblem {
                    fingerprint: fp,
                    op,
                    desc: desc.clone(),
                    problem_type: self.io_kind.problem_type(),
                    parent_span_ids: vec![parent_id],
                    cause_span_ids: vec![],
                    offender_span_ids,
                    evidence_data,
                    evidence_display: vec![EvidenceEntry::new("Main thread I/O", desc, true)],
                },
            );
        }
    }

    fn stored_problems(&self) -> &HashMap<String, PerformanceProblem> {
        &self.problems
    }

    fn take_problems(&mut self) -> HashMap<String, PerformanceProblem> {
        std::mem::take(&mut self.problems)
    }
}

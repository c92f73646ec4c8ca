// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! MN+1 DB queries: an interleaved repeating pattern of M spans (at
//! least one of them a database query) executed N times in a row, e.g.
//! `SELECT a; SELECT b; cache.get` repeated once per item. A plain N+1
//! shows one repeated query; MN+1 shows a repeated *group*.
//!
//! The detector is an explicit two-state machine with a pure transition
//! function, which keeps every state change in one place and lets the
//! match/mismatch handling be checked exhaustively.

use crate::detectors::{store_problem, DetectorKind, PerformanceDetector};
use crate::event::Event;
use crate::fingerprint::fingerprint;
use crate::problem::{EvidenceEntry, PerformanceProblem, ProblemType};
use crate::settings::MNPlusOneDbSettings;
use crate::span::Span;
use datadog_span_obfuscation::sql;
use std::collections::HashMap;

#[derive(Debug, Clone)]
enum MNPlusOneState {
    /// No pattern locked in; holds a bounded window of recent spans.
    Searching { recent_spans: Vec<Span> },
    /// Pattern locked in; `accumulated` holds every span matched so far
    /// (the first pattern occurrence included) and `pattern_index`
    /// points at the next expected pattern element, circularly.
    Continuing {
        pattern: Vec<Span>,
        accumulated: Vec<Span>,
        pattern_index: usize,
    },
}

impl Default for MNPlusOneState {
    fn default() -> Self {
        MNPlusOneState::Searching {
            recent_spans: Vec::new(),
        }
    }
}

/// Two spans are pattern-equivalent when they share an op; DB spans
/// additionally require an equal description hash.
fn equivalent(a: &Span, b: &Span) -> bool {
    a.op == b.op && (!a.op.starts_with("db") || a.hash == b.hash)
}

/// A candidate pattern must contain a usable DB query and must not be a
/// plain repetition of one span (that is N+1 territory, handled by its
/// own detector).
fn is_valid_pattern(pattern: &[Span]) -> bool {
    let has_db = pattern.iter().any(|s| {
        s.op.starts_with("db")
            && s.op != "db.redis"
            && sql::is_complete_query(s.description())
    });
    if !has_db {
        return false;
    }
    let Some(first) = pattern.first() else {
        return false;
    };
    !pattern.iter().all(|s| equivalent(s, first))
}

#[derive(Debug, Clone)]
struct SpanInfo {
    op: String,
    hash: String,
}

/// Pure transition: feed one span into the current state, producing the
/// next state and at most one emitted problem.
fn step(
    state: MNPlusOneState,
    span: &Span,
    settings: &MNPlusOneDbSettings,
    span_index: &HashMap<String, SpanInfo>,
) -> (MNPlusOneState, Option<PerformanceProblem>) {
    match state {
        MNPlusOneState::Searching { mut recent_spans } => {
            let window_len = recent_spans.len();
            let found = recent_spans[..window_len.saturating_sub(1)]
                .iter()
                .position(|s| equivalent(s, span));
            if let Some(i) = found {
                let pattern: Vec<Span> = recent_spans[i..].to_vec();
                if is_valid_pattern(&pattern) {
                    let mut accumulated = pattern.clone();
                    accumulated.push(span.clone());
                    return (
                        MNPlusOneState::Continuing {
                            pattern,
                            accumulated,
                            pattern_index: 1,
                        },
                        None,
                    );
                }
            }
            recent_spans.push(span.clone());
            if recent_spans.len() > settings.max_sequence_length {
                recent_spans.remove(0);
            }
            (MNPlusOneState::Searching { recent_spans }, None)
        }
        MNPlusOneState::Continuing {
            pattern,
            mut accumulated,
            pattern_index,
        } => {
            if equivalent(span, &pattern[pattern_index]) {
                accumulated.push(span.clone());
                let pattern_index = (pattern_index + 1) % pattern.len();
                return (
                    MNPlusOneState::Continuing {
                        pattern,
                        accumulated,
                        pattern_index,
                    },
                    None,
                );
            }
            // Pattern broke: emit or discard, then resume searching
            // seeded with whatever the pattern did not consume.
            let (problem, tail) = finish(&pattern, &accumulated, settings, span_index);
            let mut recent_spans = tail;
            recent_spans.push(span.clone());
            let excess = recent_spans.len().saturating_sub(settings.max_sequence_length);
            recent_spans.drain(..excess);
            (MNPlusOneState::Searching { recent_spans }, problem)
        }
    }
}

/// Emit-or-discard rule applied when a locked-in pattern ends (mismatch
/// or end of stream). Returns the problem, if any, and the unconsumed
/// tail of accumulated spans.
fn finish(
    pattern: &[Span],
    accumulated: &[Span],
    settings: &MNPlusOneDbSettings,
    span_index: &HashMap<String, SpanInfo>,
) -> (Option<PerformanceProblem>, Vec<Span>) {
    let times_occurred = accumulated.len() / pattern.len();
    let offender_count = times_occurred * pattern.len();
    let offenders = &accumulated[..offender_count];
    let tail = accumulated[offender_count..].to_vec();

    if times_occurred < settings.minimum_occurrences_of_pattern {
        return (None, tail);
    }

    let db_duration_ms: f64 = offenders
        .iter()
        .filter(|s| s.op.starts_with("db"))
        .map(Span::duration_ms)
        .sum();
    if db_duration_ms < settings.total_duration_threshold_ms {
        return (None, tail);
    }

    // Every offender must hang off one common, known parent.
    let Some(parent_id) = offenders
        .first()
        .and_then(|s| s.parent_span_id.clone())
    else {
        return (None, tail);
    };
    if !offenders
        .iter()
        .all(|s| s.parent_span_id.as_deref() == Some(parent_id.as_str()))
    {
        return (None, tail);
    }
    let Some(parent) = span_index.get(&parent_id) else {
        return (None, tail);
    };

    let Some(first_db) = pattern
        .iter()
        .find(|s| s.op.starts_with("db") && s.op != "db.redis")
    else {
        return (None, tail);
    };
    let first_db_hash = first_db.hash.clone().unwrap_or_default();

    let fp = fingerprint(
        ProblemType::MNPlusOneDbQueries,
        &[&parent.op, &parent.hash, &first_db_hash],
    );
    let offender_span_ids: Vec<String> = offenders.iter().map(|s| s.span_id.clone()).collect();
    let desc = first_db.description().to_string();

    let mut evidence_data = HashMap::new();
    evidence_data.insert("op".to_string(), serde_json::json!("db"));
    evidence_data.insert(
        "pattern_size".to_string(),
        serde_json::json!(pattern.len()),
    );
    evidence_data.insert(
        "times_occurred".to_string(),
        serde_json::json!(times_occurred),
    );

    let problem = PerformanceProblem {
        fingerprint: fp,
        op: "db".to_string(),
        desc: desc.clone(),
        problem_type: ProblemType::MNPlusOneDbQueries,
        parent_span_ids: vec![parent_id],
        cause_span_ids: vec![],
        offender_span_ids,
        evidence_data,
        evidence_display: vec![EvidenceEntry::new("Repeating pattern", desc, true)],
    };
    (Some(problem), tail)
}

pub struct MNPlusOneDbDetector {
    settings: MNPlusOneDbSettings,
    state: MNPlusOneState,
    /// Every span seen this event (plus the trace root), for parent
    /// resolution at emit time.
    span_index: HashMap<String, SpanInfo>,
    problems: HashMap<String, PerformanceProblem>,
}

impl MNPlusOneDbDetector {
    pub fn new(settings: MNPlusOneDbSettings, event: &Event) -> Self {
        let mut span_index = HashMap::new();
        if let Some(trace) = &event.trace_context {
            if !trace.span_id.is_empty() {
                span_index.insert(
                    trace.span_id.clone(),
                    SpanInfo {
                        op: trace.op.clone(),
                        hash: trace.hash.clone().unwrap_or_default(),
                    },
                );
            }
        }
        Self {
            settings,
            state: MNPlusOneState::default(),
            span_index,
            problems: HashMap::new(),
        }
    }
}

impl PerformanceDetector for MNPlusOneDbDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::MNPlusOneDb
    }

    fn visit_span(&mut self, span: &Span) {
        if !span.span_id.is_empty() {
            self.span_index.insert(
                span.span_id.clone(),
                SpanInfo {
                    op: span.op.clone(),
                    hash: span.hash.clone().unwrap_or_default(),
                },
            );
        }
        let state = std::mem::take(&mut self.state);
        let (state, problem) = step(state, span, &self.settings, &self.span_index);
        self.state = state;
        if let Some(problem) = problem {
            store_problem(&mut self.problems, problem);
        }
    }

    fn on_complete(&mut self) {
        // End of stream is a valid pattern break.
        if let MNPlusOneState::Continuing {
            pattern,
            accumulated,
            ..
        } = std::mem::take(&mut self.state)
        {
            let (problem, _) = finish(&pattern, &accumulated, &self.settings, &self.span_index);
            if let Some(problem) = problem {
                store_problem(&mut self.problems, problem);
            }
        }
    }

    fn stored_problems(&self) -> &HashMap<String, PerformanceProblem> {
        &self.problems
    }

    fn take_problems(&mut self) -> HashMap<String, PerformanceProblem> {
        std::mem::take(&mut self.problems)
    }
}

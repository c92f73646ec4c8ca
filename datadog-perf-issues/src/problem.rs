// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde_json::Value;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Discriminator for the class of detected issue. The numeric id is
/// stable across releases: it is baked into fingerprints and used by
/// downstream grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProblemType {
    SlowDbQuery,
    RenderBlockingAsset,
    NPlusOneDbQueries,
    /// Metrics-only shadow of [`ProblemType::NPlusOneDbQueries`].
    NPlusOneDbQueriesExtended,
    ConsecutiveDbQueries,
    FileIoMainThread,
    ConsecutiveHttp,
    NPlusOneApiCalls,
    MNPlusOneDbQueries,
    UncompressedAsset,
    DbMainThread,
    LargeHttpPayload,
    HttpOverhead,
}

impl ProblemType {
    pub fn type_id(self) -> u32 {
        match self {
            ProblemType::SlowDbQuery => 1001,
            ProblemType::RenderBlockingAsset => 1004,
            ProblemType::NPlusOneDbQueries => 1006,
            ProblemType::ConsecutiveDbQueries => 1007,
            ProblemType::FileIoMainThread => 1008,
            ProblemType::ConsecutiveHttp => 1009,
            ProblemType::NPlusOneApiCalls => 1010,
            ProblemType::MNPlusOneDbQueries => 1011,
            ProblemType::UncompressedAsset => 1012,
            ProblemType::DbMainThread => 1013,
            ProblemType::LargeHttpPayload => 1015,
            ProblemType::HttpOverhead => 1016,
            // Shares the N+1 id: the extended detector measures how the
            // same issue class would group, it is not a new class.
            ProblemType::NPlusOneDbQueriesExtended => 1006,
        }
    }
}

/// One name/value row of user-facing evidence.
#[derive(Debug, Clone, PartialEq)]
pub struct EvidenceEntry {
    pub name: String,
    pub value: String,
    pub important: bool,
}

impl EvidenceEntry {
    pub fn new(name: &str, value: impl Into<String>, important: bool) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
            important,
        }
    }
}

/// The immutable output record of a detector.
///
/// Equality and hashing cover `(fingerprint, offender_span_ids,
/// problem_type)` only; evidence never participates. That triple is the
/// deduplication contract for merged results.
#[derive(Debug, Clone)]
pub struct PerformanceProblem {
    pub fingerprint: String,
    pub op: String,
    pub desc: String,
    pub problem_type: ProblemType,
    pub parent_span_ids: Vec<String>,
    pub cause_span_ids: Vec<String>,
    pub offender_span_ids: Vec<String>,
    /// Primitive values for downstream grouping and analytics.
    pub evidence_data: HashMap<String, Value>,
    /// Ordered rows for user display.
    pub evidence_display: Vec<EvidenceEntry>,
}

impl PartialEq for PerformanceProblem {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint
            && self.offender_span_ids == other.offender_span_ids
            && self.problem_type == other.problem_type
    }
}

impl Eq for PerformanceProblem {}

impl Hash for PerformanceProblem {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fingerprint.hash(state);
        self.offender_span_ids.hash(state);
        self.problem_type.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn problem(fingerprint: &str, offenders: &[&str]) -> PerformanceProblem {
        PerformanceProblem {
            fingerprint: fingerprint.to_string(),
            op: "db".to_string(),
            desc: "SELECT 1".to_string(),
            problem_type: ProblemType::NPlusOneDbQueries,
            parent_span_ids: vec![],
            cause_span_ids: vec![],
            offender_span_ids: offenders.iter().map(|s| s.to_string()).collect(),
            evidence_data: HashMap::new(),
            evidence_display: vec![],
        }
    }

    #[test]
    fn test_equality_ignores_evidence() {
        let mut a = problem("1-1006-abc", &["s1", "s2"]);
        let b = problem("1-1006-abc", &["s1", "s2"]);
        a.evidence_data
            .insert("extra".into(), serde_json::json!(42));
        a.desc = "something else".to_string();
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_inequality_on_offenders_and_type() {
        let a = problem("1-1006-abc", &["s1"]);
        let b = problem("1-1006-abc", &["s2"]);
        assert_ne!(a, b);

        let mut c = problem("1-1006-abc", &["s1"]);
        c.problem_type = ProblemType::SlowDbQuery;
        assert_ne!(a, c);
    }
}

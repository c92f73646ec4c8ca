// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The detector implementations. Each file owns one algorithm over the
//! span stream; all of them share the [`PerformanceDetector`] lifecycle:
//! construct per event, `visit_span` in stream order, one `on_complete`,
//! then the caller drains `stored_problems`.

pub mod consecutive_db;
pub mod consecutive_http;
pub mod http_overhead;
pub mod io_main_thread;
pub mod large_payload;
pub mod mn_plus_one_db;
pub mod n_plus_one_api_calls;
pub mod n_plus_one_db;
pub mod render_blocking_asset;
pub mod slow_db_query;
pub mod uncompressed_asset;

use crate::problem::PerformanceProblem;
use crate::span::Span;
use std::collections::HashMap;

/// The detector classes the driver can instantiate. The kind is the
/// unit of settings lookup and eligibility gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectorKind {
    ConsecutiveDb,
    ConsecutiveHttp,
    NPlusOneDb,
    NPlusOneDbExtended,
    MNPlusOneDb,
    NPlusOneApiCalls,
    SlowDbQuery,
    LargeHttpPayload,
    UncompressedAsset,
    RenderBlockingAsset,
    FileIoMainThread,
    DbMainThread,
    HttpOverhead,
}

impl DetectorKind {
    pub const ALL: [DetectorKind; 13] = [
        DetectorKind::ConsecutiveDb,
        DetectorKind::ConsecutiveHttp,
        DetectorKind::NPlusOneDb,
        DetectorKind::NPlusOneDbExtended,
        DetectorKind::MNPlusOneDb,
        DetectorKind::NPlusOneApiCalls,
        DetectorKind::SlowDbQuery,
        DetectorKind::LargeHttpPayload,
        DetectorKind::UncompressedAsset,
        DetectorKind::RenderBlockingAsset,
        DetectorKind::FileIoMainThread,
        DetectorKind::DbMainThread,
        DetectorKind::HttpOverhead,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DetectorKind::ConsecutiveDb => "consecutive_db",
            DetectorKind::ConsecutiveHttp => "consecutive_http",
            DetectorKind::NPlusOneDb => "n_plus_one_db",
            DetectorKind::NPlusOneDbExtended => "n_plus_one_db_extended",
            DetectorKind::MNPlusOneDb => "mn_plus_one_db",
            DetectorKind::NPlusOneApiCalls => "n_plus_one_api_calls",
            DetectorKind::SlowDbQuery => "slow_db_query",
            DetectorKind::LargeHttpPayload => "large_http_payload",
            DetectorKind::UncompressedAsset => "uncompressed_asset",
            DetectorKind::RenderBlockingAsset => "render_blocking_asset",
            DetectorKind::FileIoMainThread => "file_io_main_thread",
            DetectorKind::DbMainThread => "db_main_thread",
            DetectorKind::HttpOverhead => "http_overhead",
        }
    }
}

/// Uniform lifecycle shared by every detector. Instances are created
/// fresh per event, receive every span in original order, get exactly
/// one `on_complete`, and are then drained and discarded.
pub trait PerformanceDetector {
    fn kind(&self) -> DetectorKind;

    fn visit_span(&mut self, span: &Span);

    /// End-of-stream hook; detectors that accumulate runs finalize the
    /// in-flight run here.
    fn on_complete(&mut self) {}

    /// Problems found so far, keyed by fingerprint.
    fn stored_problems(&self) -> &HashMap<String, PerformanceProblem>;

    fn take_problems(&mut self) -> HashMap<String, PerformanceProblem>;

    /// False for metrics-only detectors whose findings the driver must
    /// never merge into the user-facing result.
    fn surfaces_to_users(&self) -> bool {
        true
    }
}

/// Insert keeping the first problem stored under a fingerprint; repeats
/// within one event collapse.
pub(crate) fn store_problem(
    problems: &mut HashMap<String, PerformanceProblem>,
    problem: PerformanceProblem,
) {
    problems
        .entry(problem.fingerprint.clone())
        .or_insert(problem);
}

pub(crate) fn is_db_op(op: &str) -> bool {
    op == "db" || op.starts_with("db.")
}

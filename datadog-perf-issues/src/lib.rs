// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Performance-issue detection engine.
//!
//! A collection of independent detectors that stream once over the
//! ordered spans of a single trace event and flag well-known latency
//! anti-patterns: N+1 queries, interleaved MN+1 repeats, consecutive
//! blocking calls, main-thread I/O, oversized or uncompressed payloads,
//! render-blocking assets and HTTP/1.1 connection queueing.
//!
//! The engine is deterministic and side-effect free: it consumes a
//! read-only [`event::Event`] and emits a set of
//! [`problem::PerformanceProblem`] records keyed by a stable
//! fingerprint. Persistence, issue creation and configuration storage
//! are the caller's concern.

pub mod detectors;
pub mod driver;
pub mod eligibility;
pub mod event;
pub mod fingerprint;
pub mod problem;
pub mod settings;
pub mod span;
pub mod symbols;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use driver::detect_performance_problems;
pub use event::Event;
pub use problem::{PerformanceProblem, ProblemType};
pub use settings::DetectionSettings;
pub use span::Span;

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Description-normalization helpers shared by the performance-issue
//! detectors. Span descriptions are free text (SQL queries, `VERB url`
//! pairs, asset paths); before two descriptions can be compared or
//! folded into a stable fingerprint, literals and identifiers have to be
//! stripped out. This crate owns those heuristics so every detector
//! groups equivalent spans the same way.

pub mod http;
pub mod sql;

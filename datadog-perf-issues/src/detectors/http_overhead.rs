// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP/1.1 overhead: requests to one host queueing behind the browser's
//! per-host connection limit. The tell is a monotonically growing gap
//! between span start and the moment the request actually left, across a
//! chain of concurrent requests to the same host.

use crate::detectors::{store_problem, DetectorKind, PerformanceDetector};
use crate::fingerprint::fingerprint;
use crate::problem::{EvidenceEntry, PerformanceProblem, ProblemType};
use crate::settings::HttpOverheadSettings;
use crate::span::Span;
use datadog_span_obfuscation::http;
use std::collections::HashMap;

const PROTOCOL_VERSION: &str = "network.protocol.version";
const REQUEST_START: &str = "http.request.request_start";

/// Below six queued requests the pattern is indistinguishable from
/// ordinary request fan-out.
const MIN_CHAIN_LEN: usize = 6;

/// Delays under this are connection-setup noise, not queueing.
const DELAY_NOISE_FLOOR_MS: f64 = 100.0;

struct ChainLink {
    span_id: String,
    delay_ms: f64,
    start_timestamp: f64,
    end_timestamp: f64,
}

pub struct HttpOverheadDetector {
    settings: HttpOverheadSettings,
    /// Current candidate chain per host, plus the longest qualifying
    /// chain sealed so far.
    chains: HashMap<String, Vec<ChainLink>>,
    best_chains: HashMap<String, Vec<ChainLink>>,
    problems: HashMap<String, PerformanceProblem>,
}

impl HttpOverheadDetector {
    pub fn new(settings: HttpOverheadSettings) -> Self {
        Self {
            settings,
            chains: HashMap::new(),
            best_chains: HashMap::new(),
            problems: HashMap::new(),
        }
    }

    /// HTTP/2 and later multiplex; only 1.x (or an SDK that did not
    /// record the version) can queue per host.
    fn protocol_eligible(span: &Span) -> bool {
        match span.data_str(PROTOCOL_VERSION) {
            None => true,
            Some(version) => version
                .split('.')
                .next()
                .and_then(|major| major.parse::<u32>().ok())
                .is_none_or(|major| major < 2),
        }
    }

    /// Length and final-delay conditions a chain must meet to emit.
    /// Chains that fail either are discarded at seal time so a long
    /// never-queued chain cannot mask a shorter queued one.
    fn qualifies(&self, chain: &[ChainLink]) -> bool {
        chain.len() >= MIN_CHAIN_LEN
            && chain
                .last()
                .is_some_and(|link| link.delay_ms > self.settings.http_request_delay_threshold_ms)
    }

    fn seal_chain(&mut self, host: &str) {
        let Some(chain) = self.chains.remove(host) else {
            return;
        };
        if !self.qualifies(&chain) {
            return;
        }
        let best_len = self.best_chains.get(host).map_or(0, Vec::len);
        if chain.len() > best_len {
            self.best_chains.insert(host.to_string(), chain);
        }
    }
}

impl PerformanceDetector for HttpOverheadDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::HttpOverhead
    }

    fn visit_span(&mut self, span: &Span) {
        if span.op != "http.client" || !Self::protocol_eligible(span) {
            return;
        }
        // No request_start means an SDK that never measured queueing;
        // such spans are transparent, not chain-breaking.
        let Some(request_start) = span.data_f64(REQUEST_START) else {
            return;
        };
        let host = match http::parse_verb_and_url(span.description())
            .and_then(|(_, url)| http::url_host(url))
        {
            Some(host) => host,
            // Unparseable URLs still queue on some connection; bucket
            // them together so the chain is not broken artificially.
            None => "/".to_string(),
        };
        let delay_ms = ((request_start - span.start_timestamp) * 1000.0).max(0.0);

        let link = ChainLink {
            span_id: span.span_id.clone(),
            delay_ms,
            start_timestamp: span.start_timestamp,
            end_timestamp: span.timestamp,
        };

        let extends = self.chains.get(&host).is_some_and(|chain| {
            let last = chain.last().unwrap();
            let first = chain.first().unwrap();
            // Still waiting behind the same connections: the delay keeps
            // growing and the request started before the head finished.
            delay_ms >= last.delay_ms && span.start_timestamp < first.end_timestamp
        });
        if extends {
            self.chains.get_mut(&host).unwrap().push(link);
        } else {
            self.seal_chain(&host);
            self.chains.insert(host, vec![link]);
        }
    }

    fn on_complete(&mut self) {
        let open_hosts: Vec<String> = self.chains.keys().cloned().collect();
        for host in open_hosts {
            self.seal_chain(&host);
        }

        // Sealed chains already satisfy the length and delay criteria.
        for (host, chain) in std::mem::take(&mut self.best_chains) {
            let max_delay = chain.last().map_or(0.0, |link| link.delay_ms);
            let offender_span_ids: Vec<String> = chain
                .iter()
                .filter(|link| link.delay_ms > DELAY_NOISE_FLOOR_MS)
                .map(|link| link.span_id.clone())
                .collect();
            let queue_ms = chain
                .last()
                .map(|link| link.start_timestamp)
                .zip(chain.first().map(|link| link.start_timestamp))
                .map_or(0.0, |(last, first)| (last - first) * 1000.0);

            let fp = fingerprint(ProblemType::HttpOverhead, &[&host]);
            let mut evidence_data = HashMap::new();
            evidence_data.insert("op".to_string(), serde_json::json!("http.client"));
            evidence_data.insert("max_delay_ms".to_string(), serde_json::json!(max_delay));
            evidence_data.insert("queue_span_ms".to_string(), serde_json::json!(queue_ms));

            store_problem(
                &mut self.problems,
                PerformanceProblem {
                    fingerprint: fp,
                    op: "http.client".to_string(),
                    desc: host.clone(),
                    problem_type: ProblemType::HttpOverhead,
                    parent_span_ids: vec![],
                    cause_span_ids: vec![],
                    offender_span_ids,
                    evidence_data,
                    evidence_display: vec![EvidenceEntry::new("Queued host", host, true)],
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

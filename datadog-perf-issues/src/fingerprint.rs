// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::problem::ProblemType;
use sha2::{Digest, Sha256};

/// Build the stable `"1-{type_id}-{digest}"` fingerprint for a problem.
///
/// Parts are length-delimited before hashing so that `["ab", "c"]` and
/// `["a", "bc"]` cannot collide. Identical inputs produce byte-identical
/// fingerprints across runs and processes.
pub fn fingerprint(problem_type: ProblemType, parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part.as_bytes());
    }
    format!("1-{}-{}", problem_type.type_id(), hex(&hasher.finalize()))
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let a = fingerprint(
            ProblemType::NPlusOneDbQueries,
            &["http.server", "parent-hash", "source-hash", "repeat-hash"],
        );
        let b = fingerprint(
            ProblemType::NPlusOneDbQueries,
            &["http.server", "parent-hash", "source-hash", "repeat-hash"],
        );
        assert_eq!(a, b);
        assert!(a.starts_with("1-1006-"));
    }

    #[test]
    fn test_part_boundaries_matter() {
        let a = fingerprint(ProblemType::SlowDbQuery, &["ab", "c"]);
        let b = fingerprint(ProblemType::SlowDbQuery, &["a", "bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_type_id_in_prefix() {
        let fp = fingerprint(ProblemType::HttpOverhead, &["service.io"]);
        assert!(fp.starts_with("1-1016-"));
    }
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! SQL description heuristics. These do not attempt rigorous SQL
//! parsing: the queries observed in span descriptions come from many
//! ORMs and drivers, are frequently truncated by the SDK, and only need
//! to be classified (parameterized or not, safe to parallelize or not)
//! and reduced to a stable template.

use regex::Regex;
use std::sync::LazyLock;

/// Single-quoted strings, including escaped quotes inside them.
static STRING_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'(?:\\.|''|[^'\\])*'").unwrap());

/// Bare numeric literals. Word boundaries keep identifiers like
/// `col_2` intact.
static NUMERIC_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\b\d+(?:\.\d+)?\b").unwrap());

/// Bound-parameter placeholders across the common drivers:
/// `?`, `%s`, `$1`, `:name`.
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\?|%s|\$\d+|(?:^|[\s,(=])(:\w+)").unwrap());

/// Line and block comments.
static COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"--[^\n]*|/\*.*?\*/").unwrap());

static WHERE_CLAUSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bWHERE\b").unwrap());

static SAVEPOINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*SAVEPOINT\b").unwrap());

/// Reduce a query to a literal-free template: comments dropped, string
/// and numeric literals collapsed to `?`, whitespace folded. Two queries
/// that differ only in bound values produce the same template.
pub fn parameterize_query(query: &str) -> String {
    let no_comments = COMMENT.replace_all(query, "");
    let no_strings = STRING_LITERAL.replace_all(&no_comments, "?");
    let no_numbers = NUMERIC_LITERAL.replace_all(&no_strings, "?");
    no_numbers.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// True when the query carries bound-parameter placeholders or inline
/// literals, i.e. its result depends on per-call values.
pub fn contains_parameters(query: &str) -> bool {
    PLACEHOLDER.is_match(query)
        || STRING_LITERAL.is_match(query)
        || NUMERIC_LITERAL.is_match(query)
}

pub fn has_where_clause(query: &str) -> bool {
    WHERE_CLAUSE.is_match(query)
}

/// A query with no `WHERE` clause and no literals/placeholders does not
/// depend on the result of a neighboring query, so consecutive execution
/// is presumed unnecessary.
pub fn is_independent_query(query: &str) -> bool {
    !has_where_clause(query) && !contains_parameters(query)
}

/// SDKs truncate long descriptions with a trailing ellipsis. Truncated
/// queries cannot be fingerprinted stably: the cut point moves with the
/// bound values.
pub fn is_complete_query(query: &str) -> bool {
    let trimmed = query.trim_end();
    !trimmed.is_empty()
        && !trimmed.ends_with("...")
        && !trimmed.ends_with('\u{2026}')
        && !SAVEPOINT.is_match(trimmed)
}

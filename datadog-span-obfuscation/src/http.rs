// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! URL heuristics for HTTP-client spans. Descriptions follow the
//! `"<VERB> <url>"` convention; the url may be absolute or relative.

use regex::Regex;
use std::sync::LazyLock;
use url::Url;

/// Path segments that are per-request identifiers rather than routes:
/// integers, uuids (with or without dashes), and long hex digests.
static IDENTIFIER_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:\d+|[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}|[0-9a-f]{16,})$",
    )
    .unwrap()
});

/// Next.js data routes embed a build id: `/_next/data/<buildid>/page.json`.
static NEXTJS_DATA_ROUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/_next/data/[^/]+/").unwrap());

const ASSET_EXTENSIONS: &[&str] = &[
    "js", "mjs", "css", "map", "png", "jpg", "jpeg", "gif", "svg", "webp", "ico", "woff", "woff2",
    "ttf", "otf", "mp4", "webm", "html",
];

/// Split an HTTP span description into verb and url. Returns `None` when
/// the description does not follow the `"<VERB> <url>"` convention.
pub fn parse_verb_and_url(description: &str) -> Option<(&str, &str)> {
    let (verb, rest) = description.split_once(' ')?;
    if verb.is_empty() || !verb.chars().all(|c| c.is_ascii_uppercase()) {
        return None;
    }
    let url = rest.trim();
    if url.is_empty() {
        return None;
    }
    Some((verb, url))
}

/// Host component of an absolute url, `None` for relative urls.
pub fn url_host(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed.host_str().map(str::to_owned)
}

/// Path component of a url; relative urls are returned as-is without
/// their query string.
pub fn url_path(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => parsed.path().to_owned(),
        Err(_) => url.split(['?', '#']).next().unwrap_or("").to_owned(),
    }
}

/// Collapse per-request identifier segments of the path to `*`, dropping
/// the query string. `/api/users/123/posts?page=4` becomes
/// `/api/users/*/posts`. When the url has no identifier segments the
/// result equals the literal path, which callers treat as
/// "not parameterizable".
pub fn parameterize_url_path(url: &str) -> String {
    let path = url_path(url);
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        if !segment.is_empty() && IDENTIFIER_SEGMENT.is_match(segment) {
            segments.push("*");
        } else {
            segments.push(segment);
        }
    }
    segments.join("/")
}

pub fn is_graphql_url(url: &str) -> bool {
    url_path(url).contains("graphql")
}

/// Static-asset and build-manifest requests are fetched in bursts by
/// design; repeated calls to them are not an anti-pattern.
pub fn is_asset_url(url: &str) -> bool {
    let path = url_path(url);
    if NEXTJS_DATA_ROUTE.is_match(&path) {
        return true;
    }
    match path.rsplit_once('.') {
        Some((_, ext)) => ASSET_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => false,
    }
}

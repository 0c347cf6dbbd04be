//! Helpers for sanitizing data before it enters tracing span attributes
//! or local file names.

use std::path::Path;

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Strips userinfo and query strings from a remote key.
///
/// - `s3://AKIA:secret@bucket/a.tar.gz` → `s3://****@bucket/a.tar.gz`
/// - `https://host/a.tar.gz?X-Amz-Signature=...` → `https://host/a.tar.gz?****`
/// - `backups/course-12.tar.gz` → unchanged
pub fn redact_key(key: &str) -> String {
    let (base, had_query) = match key.split_once('?') {
        Some((base, _)) => (base, true),
        None => (key, false),
    };

    let mut redacted = match base.find("://") {
        Some(scheme_end) => {
            let after_scheme = &base[scheme_end + 3..];
            let authority_end = after_scheme.find('/').unwrap_or(after_scheme.len());
            match after_scheme[..authority_end].rfind('@') {
                Some(at_pos) => format!(
                    "{}****@{}",
                    &base[..scheme_end + 3],
                    &after_scheme[at_pos + 1..]
                ),
                None => base.to_string(),
            }
        }
        None => base.to_string(),
    };

    if had_query {
        redacted.push_str("?****");
    }
    redacted
}

/// Derives a safe local file name from a remote key.
///
/// Takes the last path segment and replaces anything outside
/// `[A-Za-z0-9._-]` with `_`. Never returns an empty name or a
/// dot-only name.
pub fn file_name_for_key(key: &str) -> String {
    let base = key.split_once('?').map(|(b, _)| b).unwrap_or(key);
    let segment = base
        .rsplit(['/', '\\'])
        .find(|s| !s.is_empty())
        .unwrap_or("");

    let cleaned: String = segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.chars().all(|c| c == '.') {
        "archive".to_string()
    } else {
        cleaned
    }
}

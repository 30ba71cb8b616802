//! Effective locale resolution.
//!
//! Precedence: explicit query parameter, then locale cookie, then the user's
//! stored preference, then the Accept-Language header, then the configured
//! default. Tags match the supported list exactly first, then by primary
//! subtag ("en-US" satisfies "en").

use crate::config::LocaleConfig;

/// Resolve the effective locale for a request.
pub fn resolve_locale(
    query: Option<&str>,
    cookie: Option<&str>,
    user_preference: Option<&str>,
    accept_language: Option<&str>,
    config: &LocaleConfig,
) -> String {
    for candidate in [query, cookie, user_preference].into_iter().flatten() {
        if let Some(supported) = match_supported(candidate, &config.supported) {
            return supported;
        }
    }

    if let Some(header) = accept_language {
        for tag in parse_accept_language(header) {
            if let Some(supported) = match_supported(&tag, &config.supported) {
                return supported;
            }
        }
    }

    config.default.clone()
}

/// Match a candidate tag against the supported list, exact then primary
/// subtag.
fn match_supported(candidate: &str, supported: &[String]) -> Option<String> {
    let candidate = candidate.trim().to_ascii_lowercase();
    if candidate.is_empty() {
        return None;
    }
    if let Some(exact) = supported
        .iter()
        .find(|s| s.eq_ignore_ascii_case(&candidate))
    {
        return Some(exact.clone());
    }
    let primary = candidate.split('-').next().unwrap_or(&candidate);
    supported
        .iter()
        .find(|s| s.eq_ignore_ascii_case(primary))
        .cloned()
}

/// Parse an Accept-Language header into tags ordered by descending quality.
fn parse_accept_language(header: &str) -> Vec<String> {
    let mut tags: Vec<(String, f32)> = header
        .split(',')
        .filter_map(|part| {
            let mut pieces = part.trim().split(';');
            let tag = pieces.next()?.trim();
            if tag.is_empty() || tag == "*" {
                return None;
            }
            let quality = pieces
                .find_map(|p| p.trim().strip_prefix("q=").map(str::trim).map(str::parse::<f32>))
                .transpose()
                .ok()
                .flatten()
                .unwrap_or(1.0);
            Some((tag.to_string(), quality))
        })
        .collect();
    tags.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    tags.into_iter().map(|(tag, _)| tag).collect()
}

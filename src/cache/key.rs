//! Cache key normalization.
//!
//! Two semantically identical URLs must map to the same cache entry:
//! scheme and host compare case-insensitively, default ports are elided,
//! query parameters are order-independent, and fragments never reach the
//! upstream at all.

use url::Url;

/// Produce the canonical cache key for a URL.
///
/// `Url::parse` already lowercases scheme and host and drops default ports;
/// this adds sorted query pairs and strips the fragment.
pub fn normalize_key(url: &Url) -> String {
    let mut normalized = url.clone();
    normalized.set_fragment(None);

    let mut pairs: Vec<(String, String)> = normalized
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if pairs.is_empty() {
        normalized.set_query(None);
    } else {
        pairs.sort();
        normalized
            .query_pairs_mut()
            .clear()
            .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }

    normalized.to_string()
}

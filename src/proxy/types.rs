//! Request and result value types for the proxy operations.

use axum::body::Bytes;
use hyper::Method;
use std::time::Duration;
use url::Url;

use crate::cache::CachedBody;
use crate::resilience::CircuitState;

/// One logical request through the proxy.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub url: Url,
    pub method: Method,
    /// Extra headers forwarded to the upstream.
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    /// Per-attempt timeout; falls back to the configured default.
    pub timeout_ms: Option<u64>,
    /// Retries after the initial attempt; falls back to the configured default.
    pub max_retries: Option<u32>,
    /// Skip the cache read (a fresh fetch still populates the cache).
    pub no_cache: bool,
}

impl ProxyRequest {
    /// A plain GET with all tunables at their defaults.
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
            headers: Vec::new(),
            body: None,
            timeout_ms: None,
            max_retries: None,
            no_cache: false,
        }
    }
}

/// Outcome of a successful proxy operation, with response metadata that
/// lets callers distinguish a cached answer from a live one and see the
/// retry cost.
#[derive(Debug, Clone)]
pub struct ProxyResult {
    pub success: bool,
    pub status: u16,
    pub status_text: String,
    pub content_type: Option<String>,
    pub body: Bytes,
    pub from_cache: bool,
    /// How long the served entry has been cached; `None` for live fetches.
    pub cache_age: Option<Duration>,
    pub circuit_state: CircuitState,
    /// Upstream attempts made for this caller; 0 for cache hits and
    /// coalesced waiters report the shared fetch's count.
    pub attempts: u32,
    pub duration_ms: u64,
}

impl ProxyResult {
    pub(crate) fn from_body(
        value: &CachedBody,
        from_cache: bool,
        circuit_state: CircuitState,
        attempts: u32,
        duration_ms: u64,
    ) -> Self {
        let status_text = hyper::StatusCode::from_u16(value.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("")
            .to_string();
        Self {
            success: true,
            status: value.status,
            status_text,
            content_type: value.content_type.clone(),
            body: value.body.clone(),
            from_cache,
            cache_age: None,
            circuit_state,
            attempts,
            duration_ms,
        }
    }
}

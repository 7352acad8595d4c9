//! The proxy service: composes cache, circuit breaker, coalescer, and the
//! retrying fetch executor into the two public operations.

use axum::body::{Body, Bytes};
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE};
use hyper::Request;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::cache::{normalize_key, CacheStats, CacheStore, CachedBody};
use crate::config::ProxyConfig;
use crate::observability::metrics;
use crate::proxy::coalesce::InFlightMap;
use crate::proxy::error::ProxyError;
use crate::proxy::types::{ProxyRequest, ProxyResult};
use crate::resilience::{
    origin_of, CircuitBreakerRegistry, CircuitCounts, CircuitDecision, CircuitSnapshot,
    CircuitState, FetchError, RetryExecutor,
};

/// Result of one shared upstream fetch, fanned out to coalesced waiters.
#[derive(Debug, Clone)]
struct FetchOutcome {
    value: CachedBody,
    attempts: u32,
    circuit_state: CircuitState,
}

struct Inner {
    config: ProxyConfig,
    cache: CacheStore,
    circuits: CircuitBreakerRegistry,
    retries: RetryExecutor,
    in_flight: InFlightMap<Result<FetchOutcome, ProxyError>>,
    client: Client<HttpConnector, Body>,
}

/// All proxy state behind one handle, injected into request handlers.
///
/// Cloning is cheap; every clone shares the same cache, circuit registry,
/// and in-flight map. A fresh instance per test gives full isolation.
#[derive(Clone)]
pub struct ProxyService {
    inner: Arc<Inner>,
}

/// Aggregate state for /proxy/health.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub cache: CacheStats,
    pub circuit_breaker: CircuitCounts,
}

/// HealthReport plus per-origin circuit detail, for /proxy/stats.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsReport {
    pub cache: CacheStats,
    pub circuit_breaker: CircuitCounts,
    pub circuits: HashMap<String, CircuitSnapshot>,
}

impl ProxyService {
    pub fn new(config: ProxyConfig) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            inner: Arc::new(Inner {
                cache: CacheStore::new(Duration::from_secs(config.cache.default_ttl_secs)),
                circuits: CircuitBreakerRegistry::new(config.circuit_breaker.clone()),
                retries: RetryExecutor::new(config.retries.clone()),
                in_flight: InFlightMap::new(),
                client,
                config,
            }),
        }
    }

    /// Cached fetch: cache read (unless noCache) → coalesced, circuit- and
    /// retry-guarded upstream fetch → cache write on success.
    pub async fn fetch_cached(&self, request: ProxyRequest) -> Result<ProxyResult, ProxyError> {
        let start = Instant::now();
        self.validate(&request)?;

        let key = normalize_key(&request.url);
        let origin = origin_of(&request.url);

        if !request.no_cache {
            if let Some(value) = self.inner.cache.get(&key) {
                tracing::debug!(key = %key, "Cache hit");
                metrics::record_cache_event("hit");
                let mut result = ProxyResult::from_body(
                    &value,
                    true,
                    self.inner.circuits.state(&origin),
                    0,
                    elapsed_ms(start),
                );
                result.cache_age = self.inner.cache.age(&key);
                return Ok(result);
            }
        }
        metrics::record_cache_event("miss");

        let service = self.clone();
        let fetch_request = request.clone();
        let cache_key = key.clone();
        let shared = self.inner.in_flight.join(&key, async move {
            let outcome = service.guarded_fetch(&fetch_request).await?;
            // A fresh fetch populates the cache even for noCache callers.
            service
                .inner
                .cache
                .set(&cache_key, outcome.value.clone(), None);
            Ok(outcome)
        });

        let outcome = shared.await?;
        Ok(ProxyResult::from_body(
            &outcome.value,
            false,
            outcome.circuit_state,
            outcome.attempts,
            elapsed_ms(start),
        ))
    }

    /// One-off pass-through: same circuit + retry path, never touches the
    /// cache. For calls where caching is meaningless (e.g. POSTs).
    pub async fn execute(&self, request: ProxyRequest) -> Result<ProxyResult, ProxyError> {
        let start = Instant::now();
        self.validate(&request)?;

        let outcome = self.guarded_fetch(&request).await?;
        Ok(ProxyResult::from_body(
            &outcome.value,
            false,
            outcome.circuit_state,
            outcome.attempts,
            elapsed_ms(start),
        ))
    }

    /// Circuit check, then the retry-executed fetch, then outcome recording.
    async fn guarded_fetch(&self, request: &ProxyRequest) -> Result<FetchOutcome, ProxyError> {
        let origin = origin_of(&request.url);

        // The guard releases the probe slot if this future is dropped
        // before an outcome is recorded (caller gone, request cancelled).
        let probe_guard = match self.inner.circuits.check(&origin) {
            CircuitDecision::Allow => None,
            CircuitDecision::Probe(guard) => Some(guard),
            CircuitDecision::Reject { state, retry_in } => {
                tracing::debug!(origin = %origin, state = state.as_str(), "Failing fast, circuit not closed");
                return Err(ProxyError::circuit_open(
                    &origin,
                    state,
                    retry_in.as_millis() as u64,
                ));
            }
        };

        // A half-open circuit admits exactly one trial request; retrying a
        // probe would turn it into several.
        let max_retries = if probe_guard.is_some() {
            0
        } else {
            request
                .max_retries
                .unwrap_or(self.inner.config.retries.max_retries)
        };
        let attempt_timeout = Duration::from_millis(
            request
                .timeout_ms
                .unwrap_or(self.inner.config.timeouts.attempt_ms),
        );

        let started = Instant::now();
        let (result, attempts) = self
            .inner
            .retries
            .run(max_retries, attempt_timeout, || self.attempt(request))
            .await;

        match result {
            Ok(value) => {
                self.inner.circuits.record_success(&origin);
                metrics::record_request(
                    request.method.as_str(),
                    value.status,
                    &origin,
                    started.elapsed(),
                );
                Ok(FetchOutcome {
                    circuit_state: self.inner.circuits.state(&origin),
                    value,
                    attempts,
                })
            }
            Err(error) => {
                self.inner.circuits.record_failure(&origin);
                tracing::warn!(origin = %origin, attempts, error = %error, "Upstream fetch failed");
                metrics::record_request(request.method.as_str(), 0, &origin, started.elapsed());
                Err(ProxyError::from_fetch(
                    error,
                    attempts,
                    self.inner.circuits.state(&origin),
                ))
            }
        }
    }

    /// One network attempt: build the request, await the response, read and
    /// classify the body.
    async fn attempt(&self, request: &ProxyRequest) -> Result<CachedBody, FetchError> {
        let mut builder = Request::builder()
            .method(request.method.clone())
            .uri(request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        let body = request
            .body
            .clone()
            .map(Body::from)
            .unwrap_or_else(Body::empty);
        let upstream_request = builder
            .body(body)
            .map_err(|e| FetchError::Network(format!("failed to build upstream request: {e}")))?;

        let response = self
            .inner
            .client
            .request(upstream_request)
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let limit = self.inner.config.listener.max_body_bytes;
        let declared_len = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared_len.is_some_and(|len| len > limit) {
            return Err(FetchError::TooLarge { limit });
        }

        let bytes: Bytes = axum::body::to_bytes(Body::new(response.into_body()), limit)
            .await
            .map_err(|e| FetchError::Network(format!("failed to read upstream body: {e}")))?;

        if !status.is_success() {
            let excerpt: String = String::from_utf8_lossy(&bytes).chars().take(512).collect();
            return Err(FetchError::Http {
                status: status.as_u16(),
                body: excerpt,
            });
        }

        if content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("application/json"))
        {
            serde_json::from_slice::<serde::de::IgnoredAny>(&bytes)
                .map_err(|e| FetchError::Parse(format!("invalid JSON from upstream: {e}")))?;
        }

        Ok(CachedBody {
            status: status.as_u16(),
            content_type,
            body: bytes,
        })
    }

    fn validate(&self, request: &ProxyRequest) -> Result<(), ProxyError> {
        match request.url.scheme() {
            "http" => Ok(()),
            other => Err(ProxyError::validation(format!(
                "unsupported upstream scheme {other:?}; only http upstreams are proxied"
            ))),
        }
    }

    /// Aggregate cache + breaker state for /proxy/health.
    pub fn health(&self) -> HealthReport {
        HealthReport {
            cache: self.inner.cache.stats(),
            circuit_breaker: self.inner.circuits.counts(),
        }
    }

    /// Health plus per-origin circuit detail for /proxy/stats.
    pub fn stats(&self) -> StatsReport {
        StatsReport {
            cache: self.inner.cache.stats(),
            circuit_breaker: self.inner.circuits.counts(),
            circuits: self.inner.circuits.snapshot(),
        }
    }

    /// Invalidate one normalized URL, or the whole cache.
    /// Returns the number of entries removed.
    pub fn invalidate(&self, url: Option<&url::Url>) -> usize {
        match url {
            Some(url) => self.inner.cache.invalidate(Some(&normalize_key(url))),
            None => self.inner.cache.invalidate(None),
        }
    }

    /// Operator override: force one origin (or all) back to Closed.
    pub fn reset_circuit(&self, origin: Option<&str>) {
        self.inner.circuits.reset(origin);
    }

    /// Background loop evicting expired cache entries. Runs until the
    /// shutdown signal; disabled when the interval is zero.
    pub async fn run_sweeper(&self, mut shutdown: broadcast::Receiver<()>) {
        let interval_secs = self.inner.config.cache.sweep_interval_secs;
        if interval_secs == 0 {
            tracing::info!("Cache sweeper disabled");
            return;
        }

        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.inner.cache.sweep();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Cache sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn cache(&self) -> &CacheStore {
        &self.inner.cache
    }

    #[cfg(test)]
    pub(crate) fn circuits(&self) -> &CircuitBreakerRegistry {
        &self.inner.circuits
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

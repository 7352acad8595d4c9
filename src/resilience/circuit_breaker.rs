//! Circuit breaker registry for upstream origin protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: origin assumed down, requests fail fast
//! - Half-Open: testing if the origin recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_threshold consecutive failures within the window
//! Open → Half-Open: after the cooldown elapses (clock-driven, on check)
//! Half-Open → Closed: probe request succeeds
//! Half-Open → Open: probe request fails, cooldown doubles (capped)
//! ```
//!
//! # Design Decisions
//! - One record per origin (scheme+host+port), created lazily
//! - Exactly one probe in flight per origin; concurrent callers fail fast
//! - The probe slot is held through a [`ProbeGuard`]; dropping it without a
//!   recorded outcome frees the slot for the next caller
//! - All transitions happen under the map entry lock (atomic check-and-set)

use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;

/// Circuit state for one origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Wire representation, used in headers and JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

/// The unit of circuit isolation: scheme + host (+ non-default port).
pub fn origin_of(url: &Url) -> String {
    url.origin().ascii_serialization()
}

/// Per-origin breaker record. All fields mutate under the map entry lock.
#[derive(Debug)]
struct CircuitRecord {
    state: CircuitState,
    consecutive_failures: u32,
    /// Consecutive Open transitions without an intervening recovery;
    /// drives the cooldown doubling.
    reopen_count: u32,
    last_failure_at: Option<Instant>,
    opened_at: Option<Instant>,
    next_probe_at: Option<Instant>,
    probe_in_flight: bool,
}

impl Default for CircuitRecord {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            reopen_count: 0,
            last_failure_at: None,
            opened_at: None,
            next_probe_at: None,
            probe_in_flight: false,
        }
    }
}

/// Outcome of an admission check for one request.
#[derive(Debug)]
pub enum CircuitDecision {
    /// Circuit closed; the request proceeds normally.
    Allow,
    /// Circuit half-open and this caller holds the single probe slot.
    Probe(ProbeGuard),
    /// Fail fast without a network attempt; `retry_in` is the time until
    /// the next probe is admitted.
    Reject {
        state: CircuitState,
        retry_in: Duration,
    },
}

/// Exclusive hold on an origin's half-open probe slot.
///
/// Dropping the guard without a recorded outcome (caller disconnected,
/// future cancelled) releases the slot, so the next request becomes the
/// probe instead of the origin being rejected indefinitely.
#[derive(Debug)]
pub struct ProbeGuard {
    records: Arc<DashMap<String, CircuitRecord>>,
    origin: String,
}

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        if let Some(mut record) = self.records.get_mut(&self.origin) {
            // A recorded outcome already moved the state on; only an
            // abandoned probe leaves HalfOpen with the flag still set.
            if record.state == CircuitState::HalfOpen && record.probe_in_flight {
                record.probe_in_flight = false;
                tracing::debug!(origin = %self.origin, "Probe abandoned, releasing slot");
            }
        }
    }
}

/// Per-origin detail for /proxy/stats.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failures: u32,
    /// Milliseconds since the last recorded failure, if any.
    #[serde(rename = "lastFailure")]
    pub last_failure_ms_ago: Option<u64>,
}

/// Aggregate state counts for /proxy/health.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CircuitCounts {
    pub open: usize,
    pub closed: usize,
    pub half_open: usize,
}

/// Registry of circuit breaker records, one per origin.
pub struct CircuitBreakerRegistry {
    records: Arc<DashMap<String, CircuitRecord>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            config,
        }
    }

    fn probe_guard(&self, origin: &str) -> ProbeGuard {
        ProbeGuard {
            records: self.records.clone(),
            origin: origin.to_string(),
        }
    }

    /// Admission check for one request to `origin`.
    ///
    /// Side-effect-free except the clock-driven Open → Half-Open transition
    /// and the probe admission flag; both happen under the entry lock so at
    /// most one concurrent caller holds the [`ProbeGuard`]. The guard frees
    /// the slot on drop when no outcome was recorded.
    pub fn check(&self, origin: &str) -> CircuitDecision {
        let mut record = self.records.entry(origin.to_string()).or_default();
        let now = Instant::now();

        match record.state {
            CircuitState::Closed => CircuitDecision::Allow,
            CircuitState::Open => {
                // Open always carries a deadline; a missing one admits the probe.
                let next_probe_at = record.next_probe_at.unwrap_or(now);
                if now >= next_probe_at {
                    record.state = CircuitState::HalfOpen;
                    record.probe_in_flight = true;
                    tracing::info!(origin, "Circuit half-open, admitting probe");
                    metrics::record_circuit_transition(origin, CircuitState::HalfOpen.as_str());
                    CircuitDecision::Probe(self.probe_guard(origin))
                } else {
                    CircuitDecision::Reject {
                        state: CircuitState::Open,
                        retry_in: next_probe_at - now,
                    }
                }
            }
            CircuitState::HalfOpen => {
                if record.probe_in_flight {
                    let retry_in = record
                        .next_probe_at
                        .map(|t| t.saturating_duration_since(now))
                        .unwrap_or(Duration::ZERO);
                    CircuitDecision::Reject {
                        state: CircuitState::HalfOpen,
                        retry_in,
                    }
                } else {
                    record.probe_in_flight = true;
                    CircuitDecision::Probe(self.probe_guard(origin))
                }
            }
        }
    }

    /// Current state for `origin` without creating a record.
    pub fn state(&self, origin: &str) -> CircuitState {
        self.records
            .get(origin)
            .map(|r| r.state)
            .unwrap_or(CircuitState::Closed)
    }

    /// Record a successful request. A half-open probe success closes the
    /// circuit and resets all failure bookkeeping.
    pub fn record_success(&self, origin: &str) {
        let mut record = self.records.entry(origin.to_string()).or_default();
        if record.state != CircuitState::Closed {
            tracing::info!(origin, "Circuit closed after successful probe");
            metrics::record_circuit_transition(origin, CircuitState::Closed.as_str());
        }
        *record = CircuitRecord::default();
    }

    /// Record a failed request. Counts toward the threshold in Closed;
    /// re-opens immediately (with a doubled cooldown) in Half-Open.
    pub fn record_failure(&self, origin: &str) {
        let mut record = self.records.entry(origin.to_string()).or_default();
        let now = Instant::now();
        let window = Duration::from_secs(self.config.failure_window_secs);

        match record.state {
            CircuitState::Closed => {
                let within_window = record
                    .last_failure_at
                    .is_some_and(|t| now.saturating_duration_since(t) <= window);
                record.consecutive_failures = if within_window {
                    record.consecutive_failures + 1
                } else {
                    1
                };
                record.last_failure_at = Some(now);

                if record.consecutive_failures >= self.config.failure_threshold {
                    self.open(origin, &mut record, now);
                }
            }
            CircuitState::HalfOpen => {
                record.last_failure_at = Some(now);
                record.reopen_count += 1;
                self.open(origin, &mut record, now);
            }
            CircuitState::Open => {
                // Late failure from a request admitted before the circuit
                // opened; nothing to transition.
                record.last_failure_at = Some(now);
            }
        }
    }

    fn open(&self, origin: &str, record: &mut CircuitRecord, now: Instant) {
        let cooldown = self.cooldown_for(record.reopen_count);
        record.state = CircuitState::Open;
        record.probe_in_flight = false;
        record.opened_at = Some(now);
        record.next_probe_at = Some(now + cooldown);
        tracing::warn!(
            origin,
            failures = record.consecutive_failures,
            cooldown_secs = cooldown.as_secs(),
            "Circuit opened"
        );
        metrics::record_circuit_transition(origin, CircuitState::Open.as_str());
    }

    /// Cooldown doubles per consecutive re-open, bounded by the cap.
    fn cooldown_for(&self, reopen_count: u32) -> Duration {
        let base = self.config.cooldown_secs;
        let cap = self.config.cooldown_max_secs;
        let secs = base
            .saturating_mul(2u64.saturating_pow(reopen_count.min(32)))
            .min(cap);
        Duration::from_secs(secs)
    }

    /// Operator override: force one origin (or all) back to Closed.
    pub fn reset(&self, origin: Option<&str>) {
        match origin {
            Some(origin) => {
                if let Some(mut record) = self.records.get_mut(origin) {
                    *record = CircuitRecord::default();
                    tracing::info!(origin, "Circuit manually reset");
                }
            }
            None => {
                for mut record in self.records.iter_mut() {
                    *record.value_mut() = CircuitRecord::default();
                }
                tracing::info!("All circuits manually reset");
            }
        }
    }

    /// Per-origin detail map for /proxy/stats.
    pub fn snapshot(&self) -> HashMap<String, CircuitSnapshot> {
        let now = Instant::now();
        self.records
            .iter()
            .map(|entry| {
                let record = entry.value();
                (
                    entry.key().clone(),
                    CircuitSnapshot {
                        state: record.state,
                        failures: record.consecutive_failures,
                        last_failure_ms_ago: record
                            .last_failure_at
                            .map(|t| now.saturating_duration_since(t).as_millis() as u64),
                    },
                )
            })
            .collect()
    }

    /// Aggregate counts for /proxy/health.
    pub fn counts(&self) -> CircuitCounts {
        let mut counts = CircuitCounts { open: 0, closed: 0, half_open: 0 };
        for record in self.records.iter() {
            match record.state {
                CircuitState::Open => counts.open += 1,
                CircuitState::Closed => counts.closed += 1,
                CircuitState::HalfOpen => counts.half_open += 1,
            }
        }
        counts
    }
}

//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to upstream:
//!     → circuit_breaker.rs (fail fast if the origin is open)
//!     → retries.rs (attempt loop with per-attempt timeout)
//!     → backoff.rs (delay between attempts)
//!     → circuit_breaker.rs (record final outcome)
//! ```
//!
//! # Design Decisions
//! - Circuit isolation is per origin (scheme+host+port), not per URL
//! - Fail fast in Open state, no network attempt
//! - Single probe in Half-Open prevents hammering a recovering origin
//! - Every attempt has a deadline; exceeding it counts as a failure

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;

pub use backoff::calculate_backoff;
pub use circuit_breaker::{
    origin_of, CircuitBreakerRegistry, CircuitCounts, CircuitDecision, CircuitSnapshot,
    CircuitState, ProbeGuard,
};
pub use retries::{FetchError, RetryExecutor};

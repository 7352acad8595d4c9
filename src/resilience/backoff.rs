//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

/// Calculate the delay before retry number `attempt` (1-based).
///
/// `base * 2^(attempt-1)`, inflated by a random 0–25% jitter, capped at
/// `max_ms`. Jitter is multiplicative so concurrent retries spread out
/// without ever undershooting the exponential floor.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    // Exponent capped so 2^n cannot overflow u64.
    let exponent = (attempt - 1).min(32);
    let delay_ms = base_ms.saturating_mul(2u64.saturating_pow(exponent));

    let jitter = rand::thread_rng().gen_range(0.0..0.25);
    let jittered_ms = (delay_ms as f64 * (1.0 + jitter)) as u64;

    Duration::from_millis(jittered_ms.min(max_ms))
}

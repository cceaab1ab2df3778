// src/orchestrator/retry.rs
//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

/// `min(max, base * 2^attempt)`, before jitter.
pub fn base_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let factor = 2u32.saturating_pow(attempt.min(20));
    base.saturating_mul(factor).min(max)
}

/// Delay before retry number `attempt` (0-based): the base delay plus uniform
/// jitter in `[0, delay/2]`. A larger server-supplied `retry_after` wins.
pub fn backoff_delay(
    attempt: u32,
    base: Duration,
    max: Duration,
    retry_after: Option<Duration>,
) -> Duration {
    let d = base_delay(attempt, base, max);
    let delay = d + jitter_upto(d / 2);
    match retry_after {
        Some(r) if r > delay => r,
        _ => delay,
    }
}

fn jitter_upto(max: Duration) -> Duration {
    let ms = max.as_millis().min(u64::MAX as u128) as u64;
    if ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=ms))
}

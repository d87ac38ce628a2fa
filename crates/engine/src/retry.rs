//! Exponential backoff and the bounded retry helper.

use std::time::Duration;

use tracing::debug;

use crate::clock::Clock;
use crate::ids::IdSource;

/// Fraction of the computed delay added as random jitter.
pub const DEFAULT_JITTER: f64 = 0.10;

/// Computes `base * 2^attempt` plus up to `jitter` of itself.
///
/// `unit` is the caller's random draw in `[0, 1)`; passing it in keeps the
/// function pure and lets tests pin the jitter.
#[must_use]
pub fn backoff_delay(base: Duration, attempt: u32, jitter: f64, unit: f64) -> Duration {
    let exponential = base.as_secs_f64() * 2f64.powi(attempt.min(24) as i32);
    Duration::from_secs_f64(exponential + unit * jitter * exponential)
}

/// Calls `operation` up to `max_retries + 1` times.
///
/// Returns the first `Some` result. Sleeps by [`backoff_delay`] between
/// attempts and never after the final one. The helper does not look at why
/// an attempt failed; an attempt that must abort the transfer outright
/// should return its error through other means.
pub fn retry_call<T>(
    clock: &dyn Clock,
    ids: &mut dyn IdSource,
    max_retries: u32,
    base: Duration,
    mut operation: impl FnMut() -> Option<T>,
) -> Option<T> {
    for attempt in 0..=max_retries {
        if let Some(value) = operation() {
            return Some(value);
        }
        if attempt == max_retries {
            break;
        }
        let delay = backoff_delay(base, attempt, DEFAULT_JITTER, ids.unit());
        debug!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "retrying after backoff");
        clock.sleep(delay);
    }
    None
}

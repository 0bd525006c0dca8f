//! TTL rate math.
//!
//! A fleet of `n` nodes each heartbeating every `n / rate` seconds produces
//! `rate` heartbeats per second at the leader. The TTL never drops below the
//! configured minimum, and a random stagger spreads clients that were reset
//! at the same moment.

use std::time::Duration;

use rand::Rng;

/// Interval that keeps `n` clients at or below `rate` heartbeats per second,
/// floored at `min`. A non-positive rate disables scaling.
pub fn rate_scaled_interval(rate: f64, min: Duration, n: usize) -> Duration {
    if !rate.is_finite() || rate <= 0.0 {
        return min;
    }
    let interval = Duration::try_from_secs_f64(n as f64 / rate).unwrap_or(min);
    interval.max(min)
}

/// Uniform random duration in `[0, interval)`.
pub fn random_stagger(interval: Duration) -> Duration {
    let nanos = u64::try_from(interval.as_nanos()).unwrap_or(u64::MAX);
    if nanos == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(rand::thread_rng().gen_range(0..nanos))
}

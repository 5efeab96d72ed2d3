use std::time::Duration;

use rand::Rng;

/// `min(base * 2^attempt, max) + jitter`, where `jitter` is drawn uniformly
/// from `[0, 100)` ms. The result may therefore exceed `max` by up to the
/// jitter ceiling; callers that need a hard cap should account for that.
pub fn backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exponential = base.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
    let capped = exponential.min(max);
    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..100));
    capped + jitter
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_millis(1000);
    const MAX: Duration = Duration::from_millis(30_000);

    #[test]
    fn first_attempt_is_at_least_base() {
        let delay = backoff(0, BASE, MAX);
        assert!(delay >= BASE, "{delay:?} should be >= {BASE:?}");
    }

    #[test]
    fn large_attempt_is_bounded_by_max_plus_jitter_ceiling() {
        let delay = backoff(1000, BASE, MAX);
        assert!(
            delay <= MAX + Duration::from_millis(100),
            "{delay:?} should be <= max + jitter ceiling"
        );
    }

    #[test]
    fn monotonic_in_expectation_over_attempt() {
        // Compare the floor (delay minus the jitter ceiling) across
        // attempts, since jitter alone makes any single sample noisy.
        let floor = |attempt| backoff(attempt, BASE, MAX) - Duration::from_millis(100);
        assert!(floor(0) <= floor(1));
        assert!(floor(1) <= floor(2));
        assert!(floor(2) <= floor(3));
    }
}

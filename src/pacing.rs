//! Randomized human-like delays
//!
//! Used for the settle pause between the landing page and the artifact URL,
//! and for the gap between consecutive attempts.

use rand::Rng;
use std::time::Duration;

/// Uniform random duration in `[min, max]`, at millisecond resolution.
///
/// An inverted range collapses to `min`.
pub fn random_delay(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let mut rng = rand::thread_rng();
    let low = min.as_millis() as u64;
    let high = max.as_millis() as u64;
    Duration::from_millis(rng.gen_range(low..=high))
}

/// Sleep for a random duration in `[min, max]`
pub async fn sleep_random(min: Duration, max: Duration) {
    let delay = random_delay(min, max);
    tracing::debug!(delay_ms = delay.as_millis() as u64, "Pausing");
    tokio::time::sleep(delay).await;
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_stays_within_bounds() {
        let min = Duration::from_secs(3);
        let max = Duration::from_secs(6);
        for _ in 0..1000 {
            let delay = random_delay(min, max);
            assert!(delay >= min && delay <= max, "{delay:?}");
        }
    }

    #[test]
    fn equal_bounds_are_exact() {
        let d = Duration::from_secs(4);
        assert_eq!(random_delay(d, d), d);
    }

    #[test]
    fn inverted_bounds_collapse_to_min() {
        assert_eq!(
            random_delay(Duration::from_secs(5), Duration::from_secs(1)),
            Duration::from_secs(5)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_random_advances_clock_within_bounds() {
        let started = tokio::time::Instant::now();
        sleep_random(Duration::from_secs(3), Duration::from_secs(5)).await;
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed <= Duration::from_secs(5));
    }
}

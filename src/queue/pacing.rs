use std::time::Duration;

/// Randomized inter-action delay.
///
/// Every action is followed by a pause uniformly sampled in
/// `[min_delay, max_delay)`. The jitter is the point: evenly spaced
/// actions are what the target site's automation detection looks for, so
/// the sampling must stay random even when the bounds are tightened.
#[derive(Debug, Clone)]
pub struct PacingPolicy {
    /// Lower bound for the pause after an action.
    pub min_delay: Duration,
    /// Upper bound (exclusive) for the pause after an action.
    pub max_delay: Duration,
}

impl Default for PacingPolicy {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl PacingPolicy {
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay: max_delay.max(min_delay),
        }
    }

    /// Sample the pause before the next action.
    pub fn next_delay(&self) -> Duration {
        let low = self.min_delay.as_millis() as f64;
        let high = self.max_delay.as_millis() as f64;
        if high <= low {
            return self.min_delay;
        }
        let sampled = rand::random::<f64>() * (high - low) + low;
        Duration::from_millis(sampled as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_stays_within_bounds() {
        let policy = PacingPolicy::new(Duration::from_millis(30), Duration::from_millis(60));
        for _ in 0..200 {
            let delay = policy.next_delay();
            assert!(delay >= Duration::from_millis(30));
            assert!(delay < Duration::from_millis(60));
        }
    }

    #[test]
    fn degenerate_bounds_collapse_to_min() {
        let policy = PacingPolicy::new(Duration::from_millis(10), Duration::from_millis(10));
        assert_eq!(policy.next_delay(), Duration::from_millis(10));
    }

    #[test]
    fn max_below_min_is_clamped() {
        let policy = PacingPolicy::new(Duration::from_millis(50), Duration::from_millis(10));
        assert_eq!(policy.max_delay, Duration::from_millis(50));
    }
}

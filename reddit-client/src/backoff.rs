use std::time::Duration;

/// Delay between listing polls that come back empty.
///
/// Starts at `base`, doubles after every empty poll up to `max`, and is reset as soon as a poll
/// finds something new. Each delay carries up to 1/32 jitter either way.
#[derive(Debug, Clone)]
pub struct PollBackoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl PollBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            current: base,
        }
    }

    /// Reddit listings update within seconds; 16s keeps a quiet subreddit cheap to watch.
    pub fn reddit() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(16))
    }

    pub fn next_delay(&mut self) -> Duration {
        let current_ms = self.current.as_millis() as f64;
        let max_jitter = current_ms / 16.0;
        let jittered = current_ms + fastrand::f64() * max_jitter - max_jitter / 2.0;

        self.current = (self.current * 2).min(self.max);
        Duration::from_millis(jittered.max(0.0) as u64)
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn within_jitter(actual: Duration, expected_ms: u64) -> bool {
        let slack = expected_ms / 32 + 1;
        let actual = actual.as_millis() as u64;
        actual + slack >= expected_ms && actual <= expected_ms + slack
    }

    #[test]
    fn test_doubles_up_to_max() {
        let mut backoff = PollBackoff::reddit();
        for expected in [1000, 2000, 4000, 8000, 16000, 16000] {
            let delay = backoff.next_delay();
            assert!(within_jitter(delay, expected), "{delay:?} vs {expected}ms");
        }
    }

    #[test]
    fn test_reset_returns_to_base() {
        let mut backoff = PollBackoff::new(Duration::from_millis(100), Duration::from_secs(1));
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert!(within_jitter(backoff.next_delay(), 100));
    }
}

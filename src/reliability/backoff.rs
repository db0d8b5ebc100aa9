use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Retry rate-limited and transient failures. When off those batches
    /// are dropped.
    pub enabled: bool,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// Per-worker exponential backoff. Private to one worker, so unsynchronized.
#[derive(Debug, Clone)]
pub struct BackoffState {
    config: BackoffConfig,
    delay: Duration,
    consecutive_failures: u32,
}

impl BackoffState {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            delay: Duration::ZERO,
            consecutive_failures: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Delay that preceded the most recent retry; zero after a success.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Register a retryable failure and return how long to wait before the
    /// next attempt, or `None` when backoff is disabled.
    pub fn on_failure(&mut self) -> Option<Duration> {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if !self.config.enabled {
            return None;
        }
        self.delay = self.calculate_delay(self.consecutive_failures);
        Some(self.delay)
    }

    pub fn on_success(&mut self) {
        self.delay = Duration::ZERO;
        self.consecutive_failures = 0;
    }

    /// `base * 2^(failures - 1)`, capped at `max_delay`.
    pub fn calculate_delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        let multiplier = 2_u32.pow(exponent);
        self.config
            .base_delay
            .checked_mul(multiplier)
            .map_or(self.config.max_delay, |d| d.min(self.config.max_delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled() -> BackoffState {
        BackoffState::new(BackoffConfig {
            enabled: true,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        })
    }

    #[test]
    fn test_delays_grow_and_cap() {
        let mut state = enabled();
        let delays: Vec<Duration> = (0..10).filter_map(|_| state.on_failure()).collect();

        assert_eq!(delays[0], Duration::from_millis(100));
        assert_eq!(delays[1], Duration::from_millis(200));
        assert_eq!(delays[2], Duration::from_millis(400));
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert!(delays.iter().all(|d| *d <= Duration::from_secs(2)));
        assert_eq!(*delays.last().unwrap(), Duration::from_secs(2));
        assert_eq!(state.consecutive_failures(), 10);
    }

    #[test]
    fn test_success_resets() {
        let mut state = enabled();
        state.on_failure();
        state.on_failure();
        state.on_success();
        assert_eq!(state.delay(), Duration::ZERO);
        assert_eq!(state.consecutive_failures(), 0);
        assert_eq!(state.on_failure(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn test_disabled_never_waits() {
        let mut state = BackoffState::new(BackoffConfig::default());
        assert_eq!(state.on_failure(), None);
        assert_eq!(state.consecutive_failures(), 1);
    }

    #[test]
    fn test_huge_failure_count_saturates() {
        let state = enabled();
        assert_eq!(state.calculate_delay(u32::MAX), Duration::from_secs(2));
    }
}

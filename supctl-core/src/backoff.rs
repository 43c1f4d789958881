use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff parameters as they appear in the registry file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 100,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            // Zero keeps successive delays non-decreasing.
            jitter: 0.0,
        }
    }
}

/// Geometric backoff: `min(base * multiplier^attempt, max)`, with optional
/// jitter. The delay is a pure function of the attempt number, so a restart
/// loop can recompute it from the monotonic restart count at any time.
#[derive(Debug, Clone)]
pub struct BackoffStrategy {
    base_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter_factor: f64,
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::from_config(&BackoffConfig::default())
    }
}

impl BackoffStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &BackoffConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: config.multiplier.max(1.0),
            jitter_factor: config.jitter.clamp(0.0, 1.0),
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    pub fn with_jitter(mut self, factor: f64) -> Self {
        self.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }

    /// Delay before restart attempt number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let delay_ms = base_ms * self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let delay_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        if self.jitter_factor > 0.0 {
            let jitter_range = delay_ms * self.jitter_factor;
            use rand::Rng;
            let mut rng = rand::rng();
            let jitter = rng.random_range(-jitter_range..=jitter_range);
            Duration::from_millis((delay_ms + jitter).max(0.0) as u64)
        } else {
            Duration::from_millis(delay_ms as u64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometric_progression() {
        let backoff = BackoffStrategy::new()
            .with_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(10))
            .with_multiplier(2.0)
            .with_jitter(0.0);

        assert_eq!(backoff.delay_for(0), Duration::from_millis(100));
        assert_eq!(backoff.delay_for(1), Duration::from_millis(200));
        assert_eq!(backoff.delay_for(2), Duration::from_millis(400));
        assert_eq!(backoff.delay_for(3), Duration::from_millis(800));
    }

    #[test]
    fn capped_at_max_delay() {
        let backoff = BackoffStrategy::new()
            .with_base_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_multiplier(10.0)
            .with_jitter(0.0);

        assert_eq!(backoff.delay_for(0), Duration::from_secs(1));
        assert_eq!(backoff.delay_for(1), Duration::from_secs(5));
        assert_eq!(backoff.delay_for(7), Duration::from_secs(5));
    }

    #[test]
    fn delays_never_decrease_without_jitter() {
        let backoff = BackoffStrategy::from_config(&BackoffConfig::default());
        let mut prev = Duration::ZERO;
        for attempt in 0..12 {
            let delay = backoff.delay_for(attempt);
            assert!(delay >= prev, "delay shrank at attempt {attempt}");
            prev = delay;
        }
    }

    #[test]
    fn jitter_stays_in_range() {
        let backoff = BackoffStrategy::new()
            .with_base_delay(Duration::from_millis(1000))
            .with_multiplier(1.0)
            .with_jitter(0.5);

        for _ in 0..20 {
            let delay = backoff.delay_for(0);
            assert!(delay >= Duration::from_millis(500));
            assert!(delay <= Duration::from_millis(1500));
        }
    }

    #[test]
    fn multiplier_below_one_is_clamped() {
        let backoff = BackoffStrategy::new()
            .with_base_delay(Duration::from_millis(50))
            .with_multiplier(0.1)
            .with_jitter(0.0);

        assert_eq!(backoff.delay_for(3), Duration::from_millis(50));
    }
}

//! Exponential backoff between reconnect attempts.
//!
//! ```text
//! delay[n] = min(initial * multiplier^(n-1), max_delay)
//! ```
//!
//! The attempt counter is reset once the broker acknowledges a connection.

use std::time::Duration;

use thiserror::Error;

use crate::config::Config;

/// Growth factor used when the backoff is built from configuration.
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BackoffError {
    /// The configured number of attempts was used up.
    #[error("Maximum number of attempts exceeded: {0}")]
    MaxAttemptLimitError(u32),
}

/// Exponential backoff controller for connection retry logic.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial_delay: Duration,
    current_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    attempt: u32,
    /// `None` retries forever.
    max_attempts: Option<u32>,
}

impl Backoff {
    /// Creates an unlimited backoff starting at `initial` and capped at `max`.
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        Self {
            initial_delay: initial,
            current_delay: initial,
            max_delay: max.max(initial),
            multiplier: multiplier.max(1.0),
            attempt: 0,
            max_attempts: None,
        }
    }

    /// Builds the backoff described by the reconnect settings of `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.reconnect_delay(),
            config.max_reconnect_delay(),
            DEFAULT_MULTIPLIER,
        )
        .with_max_attempts(config.max_reconnect_attempts())
    }

    pub fn with_max_attempts(mut self, max: Option<u32>) -> Self {
        self.max_attempts = max;
        self
    }

    /// Resets the backoff after a successful connection.
    pub fn reset(&mut self) {
        self.current_delay = self.initial_delay;
        self.attempt = 0;
    }

    /// Returns the next sleep duration and advances the backoff timer.
    ///
    /// # Errors
    ///
    /// `MaxAttemptLimitError` once the attempt limit is exceeded.
    pub fn next_sleep(&mut self) -> Result<Duration, BackoffError> {
        self.attempt = self.attempt.saturating_add(1);

        if let Some(max) = self.max_attempts {
            if self.attempt > max {
                return Err(BackoffError::MaxAttemptLimitError(max));
            }
        }

        let sleep = self.current_delay;

        let next_delay_secs = self.current_delay.as_secs_f64() * self.multiplier;
        self.current_delay = Duration::from_secs_f64(next_delay_secs).min(self.max_delay);

        Ok(sleep)
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_default_creation() {
        let backoff = Backoff::default();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.current_delay(), Duration::from_secs(1));
        assert_eq!(backoff.max_delay(), Duration::from_secs(60));
        assert_eq!(backoff.max_attempts(), None);
    }

    #[test]
    fn test_backoff_doubles_until_cap() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(5), 2.0);

        let delays: Vec<_> = (0..5).map(|_| backoff.next_sleep().unwrap()).collect();
        assert_eq!(
            delays,
            [1, 2, 4, 5, 5].map(Duration::from_secs).to_vec()
        );
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = Backoff::default();

        backoff.next_sleep().unwrap();
        backoff.next_sleep().unwrap();
        assert_eq!(backoff.attempt(), 2);

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_sleep().unwrap(), Duration::from_secs(1));
    }

    #[test]
    fn test_backoff_max_attempts_exceeded() {
        let mut backoff = Backoff::default().with_max_attempts(Some(2));

        assert!(backoff.next_sleep().is_ok());
        assert!(backoff.next_sleep().is_ok());
        assert_eq!(
            backoff.next_sleep(),
            Err(BackoffError::MaxAttemptLimitError(2))
        );
    }

    #[test]
    fn test_backoff_from_config() {
        let config = Config {
            reconnect_delay: 3,
            max_reconnect_delay: 30,
            max_reconnect_attempts: 7,
            ..Default::default()
        };
        let backoff = Backoff::from_config(&config);
        assert_eq!(backoff.current_delay(), Duration::from_secs(3));
        assert_eq!(backoff.max_delay(), Duration::from_secs(30));
        assert_eq!(backoff.max_attempts(), Some(7));
    }

    #[test]
    fn test_unlimited_backoff_keeps_going() {
        let mut backoff = Backoff::new(Duration::from_millis(1), Duration::from_millis(4), 2.0);
        for _ in 0..1000 {
            assert!(backoff.next_sleep().is_ok());
        }
        assert_eq!(backoff.current_delay(), Duration::from_millis(4));
    }
}

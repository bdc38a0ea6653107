use std::time::Duration;

use comms::specs::FailFast;
use machine_learning::optimization::Adam;

/// The caller's retry settings for establishing the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Maximum amount of connection attempts towards the ring successor.
    pub attempts: usize,
    /// Time to wait between two failed attempts.
    pub backoff: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            attempts: 60,
            backoff: Duration::from_millis(500),
        }
    }
}

/// How many times to try to reach a peer before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// `None` retries until the peer shows up.
    attempts: Option<usize>,
    backoff: Duration,
}

impl RetryPolicy {
    /// Resolves the effective policy out of the fail fast mode and the caller's options.
    ///
    /// # Arguments
    /// * `fail_fast` - The mode read from the environment.
    /// * `options` - The caller's settings, only honored by `FailFast::UseCaller`.
    ///
    /// # Returns
    /// The retry policy to dial peers with.
    pub fn new(fail_fast: FailFast, options: ConnectOptions) -> Self {
        let attempts = match fail_fast {
            FailFast::Enabled => Some(1),
            FailFast::Disabled => None,
            FailFast::UseCaller => Some(options.attempts.max(1)),
        };

        Self {
            attempts,
            backoff: options.backoff,
        }
    }

    /// Whether another attempt may follow the failed attempt number `attempt` (1 based).
    pub fn should_retry(&self, attempt: usize) -> bool {
        self.attempts.is_none_or(|max| attempt < max)
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }
}

/// Hyperparameters of a training run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainConfig {
    pub epochs: usize,
    pub batch_size_per_replica: usize,
    pub learning_rate: f32,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size_per_replica: 64,
            learning_rate: Adam::DEFAULT_LEARNING_RATE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPTIONS: ConnectOptions = ConnectOptions {
        attempts: 3,
        backoff: Duration::from_millis(10),
    };

    #[test]
    fn fail_fast_allows_a_single_attempt() {
        let policy = RetryPolicy::new(FailFast::Enabled, OPTIONS);
        assert!(!policy.should_retry(1));
    }

    #[test]
    fn disabled_fail_fast_retries_forever() {
        let policy = RetryPolicy::new(FailFast::Disabled, OPTIONS);
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(10_000));
    }

    #[test]
    fn use_caller_honors_the_given_attempts() {
        let policy = RetryPolicy::new(FailFast::UseCaller, OPTIONS);
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert_eq!(policy.backoff(), OPTIONS.backoff);
    }

    #[test]
    fn use_caller_with_zero_attempts_still_tries_once() {
        let options = ConnectOptions {
            attempts: 0,
            ..OPTIONS
        };

        let policy = RetryPolicy::new(FailFast::UseCaller, options);
        assert!(!policy.should_retry(1));
    }
}

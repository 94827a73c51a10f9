//! Backoff policies for failed handler jobs.
//!
//! A job that returns an error is retried inside its worker after a delay
//! computed here. Delays are capped and randomised so a burst of failing
//! jobs does not retry in lockstep.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Retry policy applied to handler jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of runs (including the first).
    pub max_attempts: u32,

    /// Base delay for backoff calculation.
    pub base_delay: Duration,

    /// Maximum delay between runs.
    pub max_delay: Duration,

    /// Jitter percentage (0.0 to 1.0).
    pub jitter_factor: f64,

    /// Strategy for calculating delays.
    pub backoff_strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter_factor: 0.25,
            backoff_strategy: BackoffStrategy::Exponential,
        }
    }
}

impl RetryPolicy {
    /// A policy that runs each job exactly once.
    pub fn no_retry() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }
}

/// Strategy for calculating retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries.
    Fixed,
    /// Delay doubles each attempt.
    Exponential,
    /// Delay grows by the base amount each attempt.
    Linear,
}

/// Context of a failed run.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Run that just failed (1-based).
    pub attempt_number: u32,
    /// When it failed.
    pub failed_at: DateTime<Utc>,
    /// Policy to apply.
    pub policy: RetryPolicy,
}

/// What to do after a failed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Run again after `delay`.
    Retry {
        /// Wait before the next run
        delay: Duration,
        /// Wall-clock time of the next run
        next_attempt_at: DateTime<Utc>,
    },
    /// Stop retrying.
    GiveUp {
        /// Why the job will not run again
        reason: String,
    },
}

impl RetryContext {
    /// Creates a new retry context.
    pub fn new(attempt_number: u32, failed_at: DateTime<Utc>, policy: RetryPolicy) -> Self {
        Self { attempt_number, failed_at, policy }
    }

    /// Decides whether and when to run again.
    pub fn decide_retry(&self) -> RetryDecision {
        if self.attempt_number >= self.policy.max_attempts {
            return RetryDecision::GiveUp {
                reason: format!("maximum attempts ({}) exceeded", self.policy.max_attempts),
            };
        }

        let delay = self.calculate_delay();
        let Ok(chrono_delay) = chrono::Duration::from_std(delay) else {
            return RetryDecision::GiveUp {
                reason: "retry delay duration out of range".to_string(),
            };
        };

        RetryDecision::Retry { delay, next_attempt_at: self.failed_at + chrono_delay }
    }

    fn calculate_delay(&self) -> Duration {
        let base_delay = match self.policy.backoff_strategy {
            BackoffStrategy::Fixed => self.policy.base_delay,
            BackoffStrategy::Linear => self.policy.base_delay * self.attempt_number,
            BackoffStrategy::Exponential => {
                let exponent = self.attempt_number.saturating_sub(1).min(20);
                self.policy.base_delay * 2_u32.saturating_pow(exponent)
            },
        };

        let capped_delay = std::cmp::min(base_delay, self.policy.max_delay);

        std::cmp::min(apply_jitter(capped_delay, self.policy.jitter_factor), self.policy.max_delay)
    }
}

/// Randomises a delay by ±`jitter_factor`.
fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 {
        return duration;
    }

    let clamped_jitter = jitter_factor.clamp(0.0, 1.0);

    let mut rng = rand::rng();
    let jitter_range = duration.as_secs_f64() * clamped_jitter;
    let jitter_offset = rng.random_range(-jitter_range..=jitter_range);

    Duration::from_secs_f64((duration.as_secs_f64() + jitter_offset).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter(strategy: BackoffStrategy) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter_factor: 0.0,
            backoff_strategy: strategy,
        }
    }

    fn delays(policy: &RetryPolicy) -> Vec<Duration> {
        (1..=4)
            .map(|attempt| RetryContext::new(attempt, Utc::now(), policy.clone()).calculate_delay())
            .collect()
    }

    #[test]
    fn exponential_backoff_doubles() {
        let delays = delays(&no_jitter(BackoffStrategy::Exponential));

        assert_eq!(delays, vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4),
            Duration::from_secs(8),
        ]);
    }

    #[test]
    fn linear_backoff_grows_by_base() {
        let delays = delays(&no_jitter(BackoffStrategy::Linear));

        assert_eq!(delays, vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(3),
            Duration::from_secs(4),
        ]);
    }

    #[test]
    fn delay_is_capped_at_max() {
        let policy = RetryPolicy {
            max_delay: Duration::from_secs(5),
            ..no_jitter(BackoffStrategy::Exponential)
        };
        let context = RetryContext::new(9, Utc::now(), policy);

        assert_eq!(context.calculate_delay(), Duration::from_secs(5));
    }

    #[test]
    fn gives_up_at_max_attempts() {
        let context = RetryContext::new(3, Utc::now(), RetryPolicy::default());

        match context.decide_retry() {
            RetryDecision::GiveUp { reason } => assert!(reason.contains("maximum attempts")),
            RetryDecision::Retry { .. } => unreachable!("should not retry at max attempts"),
        }
    }

    #[test]
    fn no_retry_policy_gives_up_after_first_run() {
        let context = RetryContext::new(1, Utc::now(), RetryPolicy::no_retry());

        assert!(matches!(context.decide_retry(), RetryDecision::GiveUp { .. }));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let base = Duration::from_secs(10);

        for _ in 0..100 {
            let jittered = apply_jitter(base, 0.25);
            assert!(jittered >= Duration::from_secs_f64(7.5));
            assert!(jittered <= Duration::from_secs_f64(12.5));
        }
    }
}

//! Decision model: what a worker does after a blocked submission.
//!
//! Deciders are pure: given how many blocked attempts a run has seen, they
//! return the next action. Executing it (sleeping, deferring) is the worker's job.

use std::time::Duration;

use super::retry::RetryPolicy;

/// The next action after a blocked submission attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Try the submission phase again after a delay.
    Retry { delay: Duration, reason: String },

    /// Give up on this run and defer the posting.
    Defer { reason: String },
}

pub trait Decider: Send + Sync {
    /// `blocked_attempts` counts the blocked attempts so far, including the latest.
    fn decide(&self, blocked_attempts: u32, reason: &str) -> Decision;
}

/// Bounded retry with exponential backoff, then defer.
#[derive(Debug, Clone)]
pub struct DefaultDecider {
    retry_policy: RetryPolicy,
    max_block_retries: u32,
}

impl DefaultDecider {
    pub fn new(retry_policy: RetryPolicy, max_block_retries: u32) -> Self {
        Self {
            retry_policy,
            max_block_retries,
        }
    }
}

impl Decider for DefaultDecider {
    fn decide(&self, blocked_attempts: u32, reason: &str) -> Decision {
        if blocked_attempts > self.max_block_retries {
            Decision::Defer {
                reason: format!(
                    "blocked after {} retries: {reason}",
                    self.max_block_retries
                ),
            }
        } else {
            let delay = self.retry_policy.next_delay(blocked_attempts);
            Decision::Retry {
                delay,
                reason: format!(
                    "retry {}/{} after {:?}: {reason}",
                    blocked_attempts, self.max_block_retries, delay
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn decider(max: u32) -> DefaultDecider {
        DefaultDecider::new(RetryPolicy::default(), max)
    }

    #[rstest]
    #[case::first(1, Duration::from_secs(2))]
    #[case::second(2, Duration::from_secs(4))]
    fn retries_within_budget(#[case] attempts: u32, #[case] delay: Duration) {
        let d = decider(2).decide(attempts, "rate limited");
        assert!(matches!(d, Decision::Retry { delay: got, .. } if got == delay));
    }

    #[test]
    fn defers_when_budget_exhausted() {
        let d = decider(2).decide(3, "rate limited");
        assert!(matches!(d, Decision::Defer { reason } if reason.contains("rate limited")));
    }

    #[test]
    fn zero_retries_defers_immediately() {
        assert!(matches!(decider(0).decide(1, "x"), Decision::Defer { .. }));
    }
}

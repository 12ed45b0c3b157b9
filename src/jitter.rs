//! Randomized delays that keep many mirrors on the same schedule from
//! hitting the bucket at once.

use crate::types::{FetchAttempt, RetryPolicy};
use rand::Rng as _;
use std::time::Duration;

/// Uniform sample in `[0, upper)`; zero when `upper` is zero.
pub fn uniform_below(upper: Duration) -> Duration {
    let upper_nanos = u64::try_from(upper.as_nanos()).unwrap_or(u64::MAX);
    if upper_nanos == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(rand::thread_rng().gen_range(0..upper_nanos))
}

/// Delay before archive-mode attempt `attempt_index`:
/// uniform in `[0, attempt_index * jitter_step)`. Attempt 0 never waits.
pub fn archive_delay(policy: &RetryPolicy, attempt_index: u32) -> Duration {
    uniform_below(policy.jitter_step.saturating_mul(attempt_index))
}

/// The single allow-list delay: uniform in `[0, upper)`.
pub fn allow_list_delay(upper: Duration) -> Duration {
    uniform_below(upper)
}

/// Attempts after the first one, each with its sampled delay.
///
/// Delays are sampled lazily, when the retry loop asks for the next one.
pub fn retry_schedule(policy: &RetryPolicy) -> impl Iterator<Item = FetchAttempt> {
    let policy = policy.clone();
    (1..policy.max_attempts.max(1)).map(move |attempt_index| FetchAttempt {
        attempt_index,
        delay: archive_delay(&policy, attempt_index),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_attempt_has_no_delay() {
        let policy = RetryPolicy::default();
        for _ in 0..100 {
            assert_eq!(archive_delay(&policy, 0), Duration::ZERO);
        }
    }

    #[test]
    fn test_archive_delay_within_bound() {
        let policy = RetryPolicy::default();
        for attempt in 1..5u32 {
            let bound = Duration::from_secs(10 * attempt as u64);
            for _ in 0..1000 {
                assert!(archive_delay(&policy, attempt) < bound);
            }
        }
    }

    #[test]
    fn test_allow_list_delay_within_bound() {
        for _ in 0..1000 {
            assert!(allow_list_delay(Duration::from_secs(5)) < Duration::from_secs(5));
        }
        assert_eq!(allow_list_delay(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_retry_schedule_covers_remaining_attempts() {
        let policy = RetryPolicy::default();
        let schedule: Vec<_> = retry_schedule(&policy).collect();
        let indices: Vec<_> = schedule.iter().map(|a| a.attempt_index).collect();
        assert_eq!(indices, vec![1, 2, 3, 4]);
        for attempt in schedule {
            assert!(attempt.delay < policy.jitter_step * attempt.attempt_index);
        }

        let single = RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        };
        assert_eq!(retry_schedule(&single).count(), 0);
    }
}

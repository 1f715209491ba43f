//! Bounded exponential backoff schedule.

use std::time::Duration;

/// Delays between retry attempts: `initial`, `2 * initial`, `4 * initial`, ...
/// capped at `max`, for at most `max_attempts` attempts in total.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    max_attempts: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            initial,
            max: max.max(initial),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Total number of attempts, including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after failed attempt number `attempt` (1-based), or
    /// `None` when no attempts remain.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt >= self.max_attempts {
            return None;
        }
        let shift = (attempt - 1).min(31);
        let delay = self.initial.saturating_mul(1u32 << shift);
        Some(delay.min(self.max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_cap() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(350), 5);
        assert_eq!(backoff.delay_after(1), Some(Duration::from_millis(100)));
        assert_eq!(backoff.delay_after(2), Some(Duration::from_millis(200)));
        assert_eq!(backoff.delay_after(3), Some(Duration::from_millis(350)));
        assert_eq!(backoff.delay_after(4), Some(Duration::from_millis(350)));
        assert_eq!(backoff.delay_after(5), None);
    }

    #[test]
    fn single_attempt_never_retries() {
        let backoff = Backoff::new(Duration::from_millis(10), Duration::from_millis(10), 1);
        assert_eq!(backoff.delay_after(1), None);
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        let backoff = Backoff::new(Duration::ZERO, Duration::ZERO, 0);
        assert_eq!(backoff.max_attempts(), 1);
    }

    #[test]
    fn large_attempt_numbers_do_not_overflow() {
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(60), u32::MAX);
        assert_eq!(backoff.delay_after(100), Some(Duration::from_secs(60)));
    }
}

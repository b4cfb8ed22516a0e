//! Overflow-safe instant arithmetic for polling loops.
//!
//! Timeouts and intervals come from user input and may be far larger than
//! an [`Instant`] can represent. Such values behave as "never".

use std::time::Duration;
use tokio::time::Instant;

/// Stand-in for an unreachable instant, matching tokio's own horizon.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// The instant `limit` after `now`, or `None` when it is out of range.
pub(crate) fn deadline_after(now: Instant, limit: Duration) -> Option<Instant> {
    now.checked_add(limit)
}

/// When to wake after waiting `wait`, never later than `deadline`.
pub(crate) fn wake_at(now: Instant, wait: Duration, deadline: Option<Instant>) -> Instant {
    let next = now
        .checked_add(wait)
        .unwrap_or_else(|| now + FAR_FUTURE);
    deadline.map_or(next, |d| next.min(d))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_huge_limit_has_no_deadline() {
        let now = Instant::now();
        assert!(deadline_after(now, Duration::MAX).is_none());
        assert_eq!(
            deadline_after(now, Duration::from_secs(5)),
            Some(now + Duration::from_secs(5))
        );
    }

    #[test]
    fn test_wake_is_capped_by_deadline() {
        let now = Instant::now();
        let deadline = now + Duration::from_secs(3);
        assert_eq!(wake_at(now, Duration::from_secs(5), Some(deadline)), deadline);
        assert_eq!(
            wake_at(now, Duration::from_secs(1), Some(deadline)),
            now + Duration::from_secs(1)
        );
    }

    #[test]
    fn test_huge_wait_does_not_overflow() {
        let now = Instant::now();
        assert!(wake_at(now, Duration::MAX, None) > now);

        let deadline = now + Duration::from_secs(60);
        assert_eq!(wake_at(now, Duration::MAX, Some(deadline)), deadline);
    }
}

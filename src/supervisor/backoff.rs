use std::time::Duration;

/// Wait before the next reconnect after `failures` consecutive failed
/// attempts.
///
/// - Multiplier: 2^(failures - 1), so the first retry waits `base`
/// - Capped at `max`
///
/// ```
/// use std::time::Duration;
/// use phomemo::supervisor::backoff::retry_delay;
///
/// let base = Duration::from_secs(2);
/// let max = Duration::from_secs(30);
/// assert_eq!(retry_delay(1, base, max), Duration::from_secs(2));
/// assert_eq!(retry_delay(3, base, max), Duration::from_secs(8));
/// assert_eq!(retry_delay(9, base, max), max);
/// ```
pub fn retry_delay(failures: u32, base: Duration, max: Duration) -> Duration {
    let shift = failures.saturating_sub(1).min(30);
    base.saturating_mul(1 << shift).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_secs(2);
    const MAX: Duration = Duration::from_secs(30);

    #[test]
    fn test_backoff_sequence() {
        let delays: Vec<u64> = (0..=6)
            .map(|k| retry_delay(k, BASE, MAX).as_secs())
            .collect();
        assert_eq!(delays, vec![2, 2, 4, 8, 16, 30, 30]);
    }

    #[test]
    fn test_no_overflow() {
        assert_eq!(retry_delay(u32::MAX, BASE, MAX), MAX);
        assert_eq!(
            retry_delay(64, Duration::from_secs(u64::MAX / 2), Duration::MAX),
            Duration::MAX
        );
    }

    #[test]
    fn test_lower_bound_holds_for_every_attempt() {
        for k in 1..20u32 {
            let floor = BASE
                .saturating_mul(2u32.saturating_pow(k - 1))
                .min(MAX);
            assert!(retry_delay(k, BASE, MAX) >= floor);
        }
    }
}

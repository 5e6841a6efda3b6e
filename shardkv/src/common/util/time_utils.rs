use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Wall-clock milliseconds since the Unix epoch. Expiry deadlines use this
/// scale so they stay meaningful in saved images.
#[inline]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as u64)
}

/// Deadline `ttl` from `now`, saturating instead of overflowing.
#[inline]
pub fn deadline_after(now: u64, ttl: Duration) -> u64 {
    let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
    now.saturating_add(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_after() {
        assert_eq!(deadline_after(1_000, Duration::from_secs(4)), 5_000);
        assert_eq!(deadline_after(1_000, Duration::ZERO), 1_000);
        assert_eq!(deadline_after(u64::MAX - 1, Duration::from_secs(1)), u64::MAX);
        assert!(now_millis() > 1_600_000_000_000);
    }
}

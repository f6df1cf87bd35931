//! Host wait timeouts.

use std::time::Duration;

/// How long a host wait may block.
///
/// Drivers only treat the exact value `u64::MAX` nanoseconds as "no timeout".
/// Other huge values, such as `i64::MAX`, have been observed to return
/// immediately. `Infinite` is therefore a distinct variant that maps to
/// exactly `u64::MAX`, and finite durations never reach that value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Timeout {
    /// Block until the wait completes.
    #[default]
    Infinite,
    /// Block for at most this long.
    After(Duration),
}

impl Timeout {
    /// Do not block at all; only poll.
    pub const IMMEDIATE: Self = Self::After(Duration::ZERO);

    /// The timeout in nanoseconds as expected by the device API.
    pub fn as_nanos(self) -> u64 {
        match self {
            Self::Infinite => u64::MAX,
            Self::After(duration) => {
                u64::try_from(duration.as_nanos()).map_or(u64::MAX - 1, |ns| ns.min(u64::MAX - 1))
            }
        }
    }

    /// Returns `true` if this timeout never expires.
    pub fn is_infinite(self) -> bool {
        matches!(self, Self::Infinite)
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        Self::After(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infinite_is_exact_max() {
        assert_eq!(Timeout::Infinite.as_nanos(), u64::MAX);
        assert!(Timeout::Infinite.is_infinite());
    }

    #[test]
    fn test_finite_never_reaches_max() {
        assert_eq!(Timeout::After(Duration::MAX).as_nanos(), u64::MAX - 1);
        assert_eq!(
            Timeout::After(Duration::from_nanos(u64::MAX)).as_nanos(),
            u64::MAX - 1
        );
        assert_eq!(Timeout::After(Duration::from_millis(5)).as_nanos(), 5_000_000);
        assert_eq!(Timeout::IMMEDIATE.as_nanos(), 0);
    }
}

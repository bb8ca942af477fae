//! Time sources for lock evaluation

use stakeledger_common::{utils::current_timestamp, Timestamp};
use std::sync::atomic::{AtomicI64, Ordering};

/// Source of the current logical time. Readings never decrease.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock in unix seconds, clamped so a backwards system clock step is
/// never observed
#[derive(Debug, Default)]
pub struct SystemClock {
    last: AtomicI64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let wall = current_timestamp();
        let previous = self.last.fetch_max(wall, Ordering::AcqRel);
        previous.max(wall)
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    pub fn advance(&self, secs: u64) {
        let secs = Timestamp::try_from(secs).unwrap_or(Timestamp::MAX);
        // the update closure never declines, so this cannot fail
        self.now
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |now| {
                Some(now.saturating_add(secs))
            })
            .ok();
    }

    /// Moves the clock to `timestamp`; earlier values are ignored
    pub fn set(&self, timestamp: Timestamp) {
        self.now.fetch_max(timestamp, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_never_goes_back() {
        let clock = ManualClock::new(1_000);
        clock.advance(50);
        assert_eq!(clock.now(), 1_050);

        clock.set(10);
        assert_eq!(clock.now(), 1_050);

        clock.set(2_000);
        assert_eq!(clock.now(), 2_000);

        clock.advance(u64::MAX);
        assert_eq!(clock.now(), Timestamp::MAX);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let first = clock.now();
        let second = clock.now();
        assert!(first > 0);
        assert!(second >= first);
    }
}

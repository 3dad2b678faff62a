use std::time::Instant;

use chrono::{DateTime, Duration, Utc};

/// Simulated time: wall-clock start instant plus real elapsed time plus a
/// signed, adjustable offset.
///
/// Consumers read an immutable snapshot (`now()`) once per tick and pass it
/// along; changing the offset only affects snapshots taken afterwards.
#[derive(Debug, Clone)]
pub struct VirtualClock {
    epoch: DateTime<Utc>,
    started: Instant,
    offset: Duration,
}

/// A scheduled shift of the simulation clock: after `at` of real running
/// time, the offset changes by `offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockJump {
    pub at: Duration,
    pub offset: Duration,
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::starting_at(Utc::now())
    }
}

impl VirtualClock {
    pub fn starting_at(epoch: DateTime<Utc>) -> Self {
        Self {
            epoch,
            started: Instant::now(),
            offset: Duration::zero(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.at_elapsed(self.started.elapsed())
    }

    /// Simulated time after `elapsed` of real time since construction.
    pub fn at_elapsed(&self, elapsed: std::time::Duration) -> DateTime<Utc> {
        let elapsed = Duration::from_std(elapsed).unwrap_or(Duration::MAX);
        self.epoch
            .checked_add_signed(elapsed)
            .and_then(|t| t.checked_add_signed(self.offset))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.started.elapsed()
    }

    pub fn epoch(&self) -> DateTime<Utc> {
        self.epoch
    }

    pub fn offset(&self) -> Duration {
        self.offset
    }

    pub fn set_offset(&mut self, offset: Duration) {
        log::debug!("clock offset {} -> {}", self.offset, offset);
        self.offset = offset;
    }

    pub fn adjust_offset(&mut self, delta: Duration) {
        self.set_offset(self.offset + delta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epoch() -> DateTime<Utc> {
        "2023-11-10T06:00:00Z".parse().unwrap()
    }

    #[test]
    fn advances_with_real_time() {
        let clock = VirtualClock::starting_at(epoch());
        assert_eq!(clock.at_elapsed(std::time::Duration::ZERO), epoch());
        assert_eq!(
            clock.at_elapsed(std::time::Duration::from_millis(1500)),
            epoch() + Duration::milliseconds(1500)
        );
        assert!(clock.now() >= epoch());
    }

    #[test]
    fn offset_shifts_snapshots() {
        let mut clock = VirtualClock::starting_at(epoch());
        let before = clock.at_elapsed(std::time::Duration::from_secs(10));

        clock.set_offset(Duration::minutes(-90));
        assert_eq!(
            clock.at_elapsed(std::time::Duration::from_secs(10)),
            epoch() + Duration::seconds(10) - Duration::minutes(90)
        );

        clock.adjust_offset(Duration::minutes(100));
        assert_eq!(clock.offset(), Duration::minutes(10));
        assert_eq!(
            clock.at_elapsed(std::time::Duration::from_secs(10)),
            before + Duration::minutes(10)
        );
    }

    #[test]
    fn snapshot_is_unaffected_by_later_changes() {
        let mut clock = VirtualClock::starting_at(epoch());
        let snapshot = clock.at_elapsed(std::time::Duration::from_secs(1));
        clock.set_offset(Duration::hours(1));
        assert_eq!(snapshot, epoch() + Duration::seconds(1));
    }
}

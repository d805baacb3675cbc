/// Session Clock - countdown budget for one contest attempt
///
/// The clock is decremented once per elapsed second by its own timer task and
/// never moves back once it hits zero. Readers only ever perform atomic loads,
/// so the runner can consult `is_expired()` from any task without locking.
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockState {
    pub total_secs: u64,
    pub remaining_secs: u64,
    pub expired: bool,
}

#[derive(Debug)]
pub struct SessionClock {
    total_secs: u64,
    remaining_secs: AtomicU64,
    expired: AtomicBool,
}

impl SessionClock {
    /// A clock that only moves when `tick` is called.
    pub fn new(budget: Duration) -> Self {
        let total_secs = budget.as_secs();
        Self {
            total_secs,
            remaining_secs: AtomicU64::new(total_secs),
            expired: AtomicBool::new(total_secs == 0),
        }
    }

    /// Create a clock and spawn its one-second timer on the current tokio runtime.
    ///
    /// The timer holds only a weak reference, so dropping every handle stops it.
    pub fn start(budget: Duration) -> Arc<Self> {
        let clock = Arc::new(Self::new(budget));
        if !clock.is_expired() {
            tokio::spawn(drive(Arc::downgrade(&clock)));
        }
        clock
    }

    /// Consume one second of budget. Returns true when this call expired the clock.
    pub fn tick(&self) -> bool {
        let previous = self
            .remaining_secs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| Some(r.saturating_sub(1)))
            .unwrap_or(0);

        if previous <= 1 {
            !self.expired.swap(true, Ordering::AcqRel)
        } else {
            false
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expired.load(Ordering::Acquire)
    }

    pub fn remaining(&self) -> Duration {
        Duration::from_secs(self.remaining_secs.load(Ordering::Acquire))
    }

    pub fn state(&self) -> ClockState {
        ClockState {
            total_secs: self.total_secs,
            remaining_secs: self.remaining_secs.load(Ordering::Acquire),
            expired: self.is_expired(),
        }
    }
}

async fn drive(clock: Weak<SessionClock>) {
    let period = Duration::from_secs(1);
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

    loop {
        ticker.tick().await;
        let Some(clock) = clock.upgrade() else {
            return;
        };
        if clock.tick() {
            debug!(total_secs = clock.total_secs, "Session clock expired");
            return;
        }
        if clock.is_expired() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_ticks_clamp_at_zero() {
        let clock = SessionClock::new(Duration::from_secs(2));
        assert!(!clock.is_expired());

        assert!(!clock.tick());
        assert_eq!(clock.remaining(), Duration::from_secs(1));

        assert!(clock.tick());
        assert!(clock.is_expired());

        // Further ticks keep it at zero and do not report a second expiry
        assert!(!clock.tick());
        assert_eq!(clock.state().remaining_secs, 0);
        assert!(clock.state().expired);
    }

    #[test]
    fn test_zero_budget_starts_expired() {
        let clock = SessionClock::new(Duration::ZERO);
        assert!(clock.is_expired());
        assert_eq!(
            clock.state(),
            ClockState {
                total_secs: 0,
                remaining_secs: 0,
                expired: true
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_counts_down_in_real_seconds() {
        let clock = SessionClock::start(Duration::from_secs(3));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(clock.remaining(), Duration::from_secs(2));
        assert!(!clock.is_expired());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(clock.remaining(), Duration::ZERO);
        assert!(clock.is_expired());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(clock.is_expired());
        assert_eq!(clock.state().total_secs, 3);
    }
}

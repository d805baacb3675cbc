// Timed contest attempts held by the API.
// Expired attempts stay readable for a retention window so late submissions
// get a clear "session expired" answer, then they are swept.

use arbiter_common::clock::SessionClock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// How long an expired attempt is kept around before eviction
pub const ATTEMPT_RETENTION: Duration = Duration::from_secs(15 * 60);

pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct AttemptEntry {
    clock: Arc<SessionClock>,
    /// `None` when the budget is too large to ever be evicted
    evict_after: Option<Instant>,
}

pub struct AttemptRegistry {
    entries: RwLock<HashMap<Uuid, AttemptEntry>>,
    retention: Duration,
}

impl AttemptRegistry {
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            retention,
        }
    }

    /// Start the clock for a new attempt
    pub async fn start(&self, budget: Duration) -> (Uuid, Arc<SessionClock>) {
        let attempt_id = Uuid::new_v4();
        let clock = SessionClock::start(budget);
        let evict_after = budget
            .checked_add(self.retention)
            .and_then(|keep| Instant::now().checked_add(keep));

        self.entries.write().await.insert(
            attempt_id,
            AttemptEntry {
                clock: clock.clone(),
                evict_after,
            },
        );
        (attempt_id, clock)
    }

    pub async fn get(&self, attempt_id: &Uuid) -> Option<Arc<SessionClock>> {
        self.entries
            .read()
            .await
            .get(attempt_id)
            .map(|entry| entry.clock.clone())
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Drop attempts whose retention window has passed. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.evict_after.map_or(true, |at| now < at));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, remaining = entries.len(), "Evicted expired attempts");
        }
        removed
    }
}

/// Periodic eviction loop; runs for the life of the server
pub async fn sweep_forever(registry: Arc<AttemptRegistry>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        let removed = registry.sweep().await;
        if removed > 0 {
            let live = registry.len().await;
            info!(removed, live, "Attempt sweep finished");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_expired_attempt_is_evicted_after_retention() {
        let registry = AttemptRegistry::new(Duration::from_secs(30));
        let (short, _) = registry.start(Duration::from_secs(5)).await;
        let (long, _) = registry.start(Duration::from_secs(3600)).await;

        // Expired but still inside the retention window
        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(registry.sweep().await, 0);
        assert!(registry.get(&short).await.is_some());

        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(registry.sweep().await, 1);
        assert!(registry.get(&short).await.is_none());
        assert!(registry.get(&long).await.is_some());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_loop_evicts_in_background() {
        let registry = Arc::new(AttemptRegistry::new(Duration::from_secs(10)));
        let (attempt_id, _) = registry.start(Duration::from_secs(1)).await;
        let sweeper = tokio::spawn(sweep_forever(registry.clone(), Duration::from_secs(5)));

        tokio::time::sleep(Duration::from_secs(16)).await;
        assert!(registry.get(&attempt_id).await.is_none());
        sweeper.abort();
    }

    #[tokio::test]
    async fn test_huge_budget_is_never_evicted() {
        let registry = AttemptRegistry::new(ATTEMPT_RETENTION);
        let (attempt_id, clock) = registry.start(Duration::from_secs(u64::MAX)).await;
        assert!(!clock.is_expired());
        assert_eq!(registry.sweep().await, 0);
        assert!(registry.get(&attempt_id).await.is_some());
    }
}

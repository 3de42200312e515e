//! Shared per-workspace redeployment status.

use nusoma_core::WorkerId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

struct Entry {
    needs_redeployment: bool,
    updated_at: Instant,
}

/// A shared map of worker id to redeployment status.
///
/// Entries expire after the injected TTL, so a worker nobody has looked
/// at recently falls back to "unknown" rather than serving a stale
/// verdict indefinitely.
#[derive(Clone)]
pub struct DeploymentStatusRegistry {
    ttl: Duration,
    entries: Arc<Mutex<HashMap<WorkerId, Entry>>>,
}

impl DeploymentStatusRegistry {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn set(&self, worker_id: WorkerId, needs_redeployment: bool) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                worker_id,
                Entry {
                    needs_redeployment,
                    updated_at: Instant::now(),
                },
            );
        }
    }

    /// Current status, or `None` when unknown or expired.
    #[must_use]
    pub fn get(&self, worker_id: WorkerId) -> Option<bool> {
        let entries = self.entries.lock().ok()?;
        let entry = entries.get(&worker_id)?;
        if entry.updated_at.elapsed() > self.ttl {
            return None;
        }
        Some(entry.needs_redeployment)
    }

    /// Drops every expired entry.
    pub fn purge_expired(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            let ttl = self.ttl;
            entries.retain(|_, entry| entry.updated_at.elapsed() <= ttl);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let registry = DeploymentStatusRegistry::new(Duration::from_secs(60));
        let worker_id = WorkerId::new();

        registry.set(worker_id, true);
        assert_eq!(registry.get(worker_id), Some(true));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(registry.get(worker_id), None);
    }

    #[tokio::test(start_paused = true)]
    async fn set_refreshes_the_clock() {
        let registry = DeploymentStatusRegistry::new(Duration::from_secs(60));
        let worker_id = WorkerId::new();

        registry.set(worker_id, true);
        tokio::time::advance(Duration::from_secs(40)).await;
        registry.set(worker_id, false);
        tokio::time::advance(Duration::from_secs(40)).await;

        assert_eq!(registry.get(worker_id), Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_only_expired_entries() {
        let registry = DeploymentStatusRegistry::new(Duration::from_secs(60));
        let old = WorkerId::new();
        let fresh = WorkerId::new();

        registry.set(old, true);
        tokio::time::advance(Duration::from_secs(61)).await;
        registry.set(fresh, false);
        registry.purge_expired();

        assert_eq!(registry.get(old), None);
        assert_eq!(registry.get(fresh), Some(false));
    }
}

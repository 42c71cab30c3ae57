//! Per-user state cache.
//!
//! Every read and write refreshes an entry's expiry to `now + unload_after`. An entry past its
//! expiry is treated as absent on the request path and physically dropped by the next sweep.
//! Sweeps first drop expired entries, then, while the cache still holds more than `max_size`
//! entries, evict the ones that expire soonest (not the least recently used).
//!
//! The cache lock is never held across a persistence call, and the sweeper takes the same lock
//! as the request path.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dbot_core::{Result, UserId};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::persistence::{NoopPersistence, StatePersistence, StateValue};

#[derive(Debug, Clone)]
pub struct StateConfig {
    /// Idle time after which a cached entry is unloaded.
    pub unload_after: Duration,
    /// Cache capacity enforced at the end of each sweep.
    pub max_size: usize,
    pub sweep_interval: Duration,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            unload_after: Duration::from_secs(60),
            max_size: 100,
            sweep_interval: Duration::from_millis(1000),
        }
    }
}

/// What one sweep removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    pub expired: usize,
    pub evicted: usize,
}

#[derive(Debug, Clone)]
struct Entry {
    value: StateValue,
    expires_at: DateTime<Utc>,
}

struct Inner {
    config: StateConfig,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
    persistence: Arc<dyn StatePersistence>,
    cache: RwLock<HashMap<UserId, Entry>>,
    user_locks: DashMap<UserId, Arc<AsyncMutex<()>>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().ok().and_then(Option::take) {
            handle.abort();
        }
    }
}

/// Cheap to clone; clones share one cache.
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<Inner>,
}

impl StateStore {
    pub fn new(config: StateConfig) -> Self {
        Self::with_parts(config, Arc::new(NoopPersistence), Arc::new(SystemClock))
    }

    pub fn with_persistence(config: StateConfig, persistence: Arc<dyn StatePersistence>) -> Self {
        Self::with_parts(config, persistence, Arc::new(SystemClock))
    }

    pub fn with_parts(
        config: StateConfig,
        persistence: Arc<dyn StatePersistence>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ttl = chrono::Duration::from_std(config.unload_after)
            .unwrap_or_else(|_| chrono::Duration::days(365));
        Self {
            inner: Arc::new(Inner {
                config,
                ttl,
                clock,
                persistence,
                cache: RwLock::new(HashMap::new()),
                user_locks: DashMap::new(),
                sweeper: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &StateConfig {
        &self.inner.config
    }

    fn expiry_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.inner.ttl
    }

    /// Cached value if live (refreshing its expiry), else whatever persistence loads.
    pub async fn get(&self, user_id: UserId) -> Result<StateValue> {
        if let Some(value) = self.touch(user_id).await {
            return Ok(value);
        }

        debug!(user_id = user_id, "state cache miss, loading");
        let loaded = self.inner.persistence.load(user_id).await?;

        // A concurrent set may have landed while loading; it wins over the loaded value.
        let now = self.inner.clock.now();
        let expires_at = self.expiry_from(now);
        let mut cache = self.inner.cache.write().await;
        match cache.get_mut(&user_id) {
            Some(entry) if entry.expires_at > now => {
                entry.expires_at = expires_at;
                Ok(entry.value.clone())
            }
            _ => {
                cache.insert(
                    user_id,
                    Entry {
                        value: loaded.clone(),
                        expires_at,
                    },
                );
                Ok(loaded)
            }
        }
    }

    async fn touch(&self, user_id: UserId) -> Option<StateValue> {
        let now = self.inner.clock.now();
        let expires_at = self.expiry_from(now);
        let mut cache = self.inner.cache.write().await;
        let entry = cache.get_mut(&user_id).filter(|e| e.expires_at > now)?;
        entry.expires_at = expires_at;
        Some(entry.value.clone())
    }

    /// Overwrites the cached value, then awaits persistence and returns its outcome.
    pub async fn set(&self, user_id: UserId, value: StateValue) -> Result<()> {
        let expires_at = self.expiry_from(self.inner.clock.now());
        {
            let mut cache = self.inner.cache.write().await;
            cache.insert(
                user_id,
                Entry {
                    value: value.clone(),
                    expires_at,
                },
            );
        }
        self.inner.persistence.save(user_id, &value).await
    }

    /// Sets the user's state to the empty object.
    pub async fn reset(&self, user_id: UserId) -> Result<()> {
        self.set(user_id, StateValue::new()).await
    }

    /// Drops the cached entry without touching persistence.
    pub async fn remove(&self, user_id: UserId) -> bool {
        self.inner.cache.write().await.remove(&user_id).is_some()
    }

    /// Physically present entries, including expired ones not yet swept.
    pub async fn len(&self) -> usize {
        self.inner.cache.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn expires_at(&self, user_id: UserId) -> Option<DateTime<Utc>> {
        self.inner
            .cache
            .read()
            .await
            .get(&user_id)
            .map(|e| e.expires_at)
    }

    pub async fn contains(&self, user_id: UserId) -> bool {
        self.inner.cache.read().await.contains_key(&user_id)
    }

    /// One sweep cycle: drop expired entries, then evict soonest-expiring entries down to
    /// `max_size`. Also forgets idle per-user locks.
    pub async fn sweep(&self) -> SweepReport {
        let now = self.inner.clock.now();
        let max_size = self.inner.config.max_size;
        let mut report = SweepReport::default();

        {
            let mut cache = self.inner.cache.write().await;
            let before = cache.len();
            cache.retain(|_, e| e.expires_at > now);
            report.expired = before - cache.len();

            if cache.len() > max_size {
                let mut by_expiry: Vec<(DateTime<Utc>, UserId)> =
                    cache.iter().map(|(id, e)| (e.expires_at, *id)).collect();
                by_expiry.sort_unstable();
                let overflow = cache.len() - max_size;
                for (_, user_id) in by_expiry.into_iter().take(overflow) {
                    cache.remove(&user_id);
                }
                report.evicted = overflow;
            }
        }

        self.inner
            .user_locks
            .retain(|_, lock| Arc::strong_count(lock) > 1);

        if report.expired > 0 || report.evicted > 0 {
            debug!(
                expired = report.expired,
                evicted = report.evicted,
                "state sweep"
            );
        }
        report
    }

    /// Starts the periodic sweeper if it is not already running. The task holds only a weak
    /// reference and ends once every handle to the store is dropped.
    pub fn start_sweeper(&self) {
        let mut slot = self.sweeper_slot();
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let period = self.inner.config.sweep_interval;
        info!(interval_ms = period.as_millis() as u64, "step: state sweeper started");

        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                StateStore { inner }.sweep().await;
            }
        }));
    }

    pub fn stop_sweeper(&self) {
        if let Some(handle) = self.sweeper_slot().take() {
            handle.abort();
            info!("step: state sweeper stopped");
        }
    }

    pub fn sweeper_running(&self) -> bool {
        self.sweeper_slot()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    fn sweeper_slot(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.inner
            .sweeper
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Serializes work for one user. Different users never contend.
    pub async fn lock_user(&self, user_id: UserId) -> OwnedMutexGuard<()> {
        let lock = self
            .inner
            .user_locks
            .entry(user_id)
            .or_default()
            .clone();
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::persistence::InMemoryPersistence;
    use serde_json::json;

    fn value(v: serde_json::Value) -> StateValue {
        v.as_object().cloned().unwrap()
    }

    fn store_with_clock(config: StateConfig) -> (StateStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let store = StateStore::with_parts(config, Arc::new(NoopPersistence), clock.clone());
        (store, clock)
    }

    #[tokio::test]
    async fn test_get_unknown_user_is_empty() {
        let (store, _) = store_with_clock(StateConfig::default());
        assert!(store.get(1).await.unwrap().is_empty());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_read_refreshes_expiry() {
        let (store, clock) = store_with_clock(StateConfig::default());
        store.set(1, value(json!({ "n": 1 }))).await.unwrap();
        clock.advance(Duration::from_secs(30));
        store.get(1).await.unwrap();
        assert_eq!(
            store.expires_at(1).await.unwrap(),
            clock.now() + chrono::Duration::seconds(60)
        );
    }

    #[tokio::test]
    async fn test_expired_entry_is_reloaded() {
        let clock = Arc::new(ManualClock::default());
        let persistence = Arc::new(InMemoryPersistence::new());
        let store =
            StateStore::with_parts(StateConfig::default(), persistence.clone(), clock.clone());

        store.set(1, value(json!({ "from": "cache" }))).await.unwrap();
        // set wrote through; make the persisted copy differ.
        persistence.insert(1, value(json!({ "from": "disk" }))).await;

        assert_eq!(store.get(1).await.unwrap()["from"], "cache");
        clock.advance(Duration::from_secs(61));
        assert_eq!(store.get(1).await.unwrap()["from"], "disk");
    }

    #[tokio::test]
    async fn test_sweep_drops_expired_then_evicts() {
        let (store, clock) = store_with_clock(StateConfig {
            max_size: 2,
            ..StateConfig::default()
        });
        for user in 1..=4 {
            store.set(user, StateValue::new()).await.unwrap();
            clock.advance(Duration::from_secs(20));
        }
        // Expiries: u1 = 60s, u2 = 80s, u3 = 100s, u4 = 120s; now = 80s.
        let report = store.sweep().await;
        assert_eq!(report, SweepReport { expired: 2, evicted: 0 });

        store.set(5, StateValue::new()).await.unwrap();
        let report = store.sweep().await;
        assert_eq!(report, SweepReport { expired: 0, evicted: 1 });
        assert!(!store.contains(3).await);
        assert!(store.contains(4).await);
        assert!(store.contains(5).await);
    }

    #[tokio::test]
    async fn test_user_locks_are_per_user() {
        let (store, _) = store_with_clock(StateConfig::default());
        let guard = store.lock_user(1).await;
        let other = tokio::time::timeout(Duration::from_millis(50), store.lock_user(2)).await;
        assert!(other.is_ok());
        let same = tokio::time::timeout(Duration::from_millis(50), store.lock_user(1)).await;
        assert!(same.is_err());
        drop(guard);
        drop(other);
        store.sweep().await;
        assert!(store.inner.user_locks.is_empty());
    }
}

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;
use std::time::Instant;

const SHARDS: usize = 16;

enum Slot<V> {
    Live {
        value: Arc<tokio::sync::Mutex<V>>,
        created: Instant,
    },
    /// Terminal: the key is never re-created until deleted.
    Completed,
}

/// Concurrent map of per-round state with get-or-create-unless-complete semantics.
///
/// Values are reachable only through the scoped accessors [`RoundStore::with`] and
/// [`RoundStore::with_existing`]; the shard lock is released before awaiting the entry lock.
pub struct RoundStore<K, V> {
    shards: Vec<Mutex<HashMap<K, Slot<V>>>>,
}

impl<K: Hash + Eq + Clone, V> Default for RoundStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq + Clone, V> RoundStore<K, V> {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARDS).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, key: &K) -> MutexGuard<'_, HashMap<K, Slot<V>>> {
        let mut h = DefaultHasher::new();
        key.hash(&mut h);
        let idx = h.finish() as usize % SHARDS;

        self.shards[idx]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn get_or_create(
        &self,
        key: &K,
        init: impl FnOnce() -> V,
    ) -> Option<Arc<tokio::sync::Mutex<V>>> {
        let mut shard = self.shard(key);
        match shard.get(key) {
            Some(Slot::Completed) => None,
            Some(Slot::Live { value, .. }) => Some(Arc::clone(value)),
            None => {
                let value = Arc::new(tokio::sync::Mutex::new(init()));
                shard.insert(
                    key.clone(),
                    Slot::Live {
                        value: Arc::clone(&value),
                        created: Instant::now(),
                    },
                );
                Some(value)
            }
        }
    }

    fn get(&self, key: &K) -> Option<Arc<tokio::sync::Mutex<V>>> {
        match self.shard(key).get(key) {
            Some(Slot::Live { value, .. }) => Some(Arc::clone(value)),
            _ => None,
        }
    }

    /// Runs `f` on the entry, creating it with `init` if absent.
    /// Returns `None` if the entry is complete.
    pub async fn with<R>(
        &self,
        key: &K,
        init: impl FnOnce() -> V,
        f: impl FnOnce(&mut V) -> R,
    ) -> Option<R> {
        let entry = self.get_or_create(key, init)?;
        let mut value = entry.lock().await;

        Some(f(&mut value))
    }

    /// Runs `f` on the entry if it exists and is not complete.
    pub async fn with_existing<R>(&self, key: &K, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        let entry = self.get(key)?;
        let mut value = entry.lock().await;

        Some(f(&mut value))
    }

    /// Marks the key terminal, dropping its value.
    pub fn complete(&self, key: &K) {
        self.shard(key).insert(key.clone(), Slot::Completed);
    }

    pub fn is_complete(&self, key: &K) -> bool {
        matches!(self.shard(key).get(key), Some(Slot::Completed))
    }

    pub fn delete(&self, key: &K) {
        self.shard(key).remove(key);
    }

    /// Marks every present key matching `pred` as complete.
    pub fn complete_where(&self, pred: impl Fn(&K) -> bool) {
        for shard in &self.shards {
            let mut shard = shard.lock().unwrap_or_else(PoisonError::into_inner);
            for (k, slot) in shard.iter_mut() {
                if pred(k) {
                    *slot = Slot::Completed;
                }
            }
        }
    }

    /// Removes every key matching `pred`, tombstones included.
    pub fn delete_where(&self, pred: impl Fn(&K) -> bool) {
        for shard in &self.shards {
            let mut shard = shard.lock().unwrap_or_else(PoisonError::into_inner);
            shard.retain(|k, _| !pred(k));
        }
    }

    /// Drops live entries older than `ttl`. Returns the number of evicted entries.
    pub fn evict(&self, ttl: Duration) -> usize {
        let mut evicted = 0;
        for shard in &self.shards {
            let mut shard = shard.lock().unwrap_or_else(PoisonError::into_inner);
            let before = shard.len();
            shard.retain(|_, slot| match slot {
                Slot::Live { created, .. } => created.elapsed() < ttl,
                Slot::Completed => true,
            });
            evicted += before - shard.len();
        }

        evicted
    }

    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Start times of the sessions this node takes part in.
pub struct SessionTracker<K> {
    started: Mutex<HashMap<K, Instant>>,
}

impl<K: Hash + Eq + Clone> SessionTracker<K> {
    pub fn new() -> Self {
        Self {
            started: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `false` if the session is already tracked.
    pub fn add(&self, session: K) -> bool {
        let mut started = self.started.lock().unwrap_or_else(PoisonError::into_inner);
        if started.contains_key(&session) {
            return false;
        }
        started.insert(session, Instant::now());

        true
    }

    pub fn forget(&self, session: &K) {
        self.started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session);
    }

    /// Removes and returns the sessions started more than `ttl` ago.
    pub fn expired(&self, ttl: Duration) -> Vec<K> {
        let mut started = self.started.lock().unwrap_or_else(PoisonError::into_inner);
        let expired: Vec<K> = started
            .iter()
            .filter(|(_, at)| at.elapsed() >= ttl)
            .map(|(k, _)| k.clone())
            .collect();
        for k in &expired {
            started.remove(k);
        }

        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_or_create_unless_complete() {
        let store = RoundStore::<u32, Vec<u32>>::new();

        assert_eq!(store.with(&1, Vec::new, |v| v.push(7)).await, Some(()));
        assert_eq!(store.with(&1, || vec![0], |v| v.clone()).await, Some(vec![7]));
        assert_eq!(store.with_existing(&2, |v| v.len()).await, None);

        store.complete(&1);
        assert!(store.is_complete(&1));
        // completion is monotone: creation attempts observe it
        assert_eq!(store.with(&1, || vec![1], |v| v.len()).await, None);
        assert_eq!(store.with_existing(&1, |v| v.len()).await, None);
        assert!(store.is_complete(&1));

        store.delete(&1);
        assert!(!store.is_complete(&1));
        assert_eq!(store.with(&1, || vec![1], |v| v.len()).await, Some(1));
    }

    #[tokio::test]
    async fn concurrent_updates_serialize() {
        let store = Arc::new(RoundStore::<u32, u64>::new());
        let mut tasks = vec![];
        for _ in 0..32 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                for _ in 0..100 {
                    store.with(&9, || 0, |v| *v += 1).await;
                }
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }

        assert_eq!(store.with_existing(&9, |v| *v).await, Some(3200));
    }

    #[tokio::test]
    async fn bulk_operations() {
        let store = RoundStore::<(u32, u32), ()>::new();
        for session in 0..3 {
            for dealer in 0..4 {
                store.with(&(session, dealer), || (), |_| ()).await;
            }
        }
        assert_eq!(store.len(), 12);

        store.complete_where(|(session, _)| *session == 0);
        assert!(store.is_complete(&(0, 3)));
        assert_eq!(store.with(&(0, 3), || (), |_| ()).await, None);

        store.delete_where(|(session, _)| *session == 1);
        assert_eq!(store.len(), 8);

        assert_eq!(store.evict(Duration::ZERO), 4);
        assert_eq!(store.evict(Duration::from_secs(60)), 0);
        // tombstones survive eviction
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn tracker_expiry() {
        let tracker = SessionTracker::new();
        assert!(tracker.add("a"));
        assert!(!tracker.add("a"));
        assert!(tracker.expired(Duration::from_secs(60)).is_empty());
        assert_eq!(tracker.expired(Duration::ZERO), vec!["a"]);
        assert!(tracker.expired(Duration::ZERO).is_empty());
    }
}

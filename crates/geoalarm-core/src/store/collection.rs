// ── Ordered reactive collection ──
//
// Concurrent keyed storage with O(1) lookups, insertion-order snapshots
// and push-based change notification via `watch` channels.

use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;

/// Keyed collection whose snapshots keep first-insertion order.
///
/// Every entity carries the sequence number it was first inserted with;
/// replacing an entity keeps its position. Every mutation bumps a version
/// counter and rebuilds the snapshot that subscribers receive.
pub(crate) struct EntityCollection<K, T>
where
    K: Eq + Hash + Clone,
    T: Send + Sync + 'static,
{
    /// Primary storage: key -> (insertion sequence, entity).
    by_key: DashMap<K, (u64, Arc<T>)>,

    next_seq: AtomicU64,

    /// Version counter, bumped on every mutation.
    version: watch::Sender<u64>,

    /// Full snapshot in insertion order, rebuilt on mutation.
    snapshot: watch::Sender<Arc<Vec<Arc<T>>>>,
}

impl<K, T> EntityCollection<K, T>
where
    K: Eq + Hash + Clone,
    T: Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            by_key: DashMap::new(),
            next_seq: AtomicU64::new(0),
            version,
            snapshot,
        }
    }

    /// Insert or replace an entity. Returns `true` if the key was new.
    pub(crate) fn upsert(&self, key: K, entity: T) -> bool {
        // The entry guard holds a shard lock; release it before rebuilding.
        let is_new = match self.by_key.entry(key) {
            Entry::Occupied(mut e) => {
                let seq = e.get().0;
                e.insert((seq, Arc::new(entity)));
                false
            }
            Entry::Vacant(e) => {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                e.insert((seq, Arc::new(entity)));
                true
            }
        };

        self.rebuild_snapshot();
        self.bump_version();

        is_new
    }

    /// Remove an entity. Returns it if it existed.
    pub(crate) fn remove(&self, key: &K) -> Option<Arc<T>> {
        let removed = self.by_key.remove(key).map(|(_, (_, v))| v);
        if removed.is_some() {
            self.rebuild_snapshot();
            self.bump_version();
        }
        removed
    }

    pub(crate) fn get(&self, key: &K) -> Option<Arc<T>> {
        self.by_key.get(key).map(|r| Arc::clone(&r.value().1))
    }

    pub(crate) fn contains(&self, key: &K) -> bool {
        self.by_key.contains_key(key)
    }

    /// Replace the whole contents, in the given order, with a single
    /// notification.
    pub(crate) fn replace_all(&self, entries: impl IntoIterator<Item = (K, T)>) {
        self.by_key.clear();
        for (key, entity) in entries {
            let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
            self.by_key.insert(key, (seq, Arc::new(entity)));
        }
        self.rebuild_snapshot();
        self.bump_version();
    }

    /// Get the current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot changes via a `watch::Receiver`.
    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<T>>>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    // ── Private helpers ──────────────────────────────────────────────

    /// Collect all values in insertion order and broadcast to subscribers.
    fn rebuild_snapshot(&self) {
        let mut entries: Vec<(u64, Arc<T>)> = self
            .by_key
            .iter()
            .map(|r| (r.value().0, Arc::clone(&r.value().1)))
            .collect();
        entries.sort_unstable_by_key(|(seq, _)| *seq);
        let values: Vec<Arc<T>> = entries.into_iter().map(|(_, v)| v).collect();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }

    fn bump_version(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn upsert_returns_true_for_new_key() {
        let col: EntityCollection<u32, String> = EntityCollection::new();
        assert!(col.upsert(1, "hello".into()));
    }

    #[test]
    fn upsert_returns_false_for_existing_key() {
        let col: EntityCollection<u32, String> = EntityCollection::new();
        col.upsert(1, "hello".into());
        assert!(!col.upsert(1, "world".into()));
        assert_eq!(*col.get(&1).unwrap(), "world");
    }

    #[test]
    fn snapshot_keeps_insertion_order_across_replacement() {
        let col: EntityCollection<u32, &'static str> = EntityCollection::new();
        col.upsert(30, "c");
        col.upsert(10, "a");
        col.upsert(20, "b");
        col.upsert(30, "c2");

        let snap: Vec<_> = col.snapshot().iter().map(|v| **v).collect();
        assert_eq!(snap, ["c2", "a", "b"]);
    }

    #[test]
    fn remove_returns_entity_and_updates_snapshot() {
        let col: EntityCollection<u32, String> = EntityCollection::new();
        col.upsert(1, "hello".into());

        let removed = col.remove(&1);
        assert_eq!(*removed.unwrap(), "hello");
        assert!(col.get(&1).is_none());
        assert!(col.is_empty());
        assert!(col.snapshot().is_empty());
        assert!(col.remove(&1).is_none());
    }

    #[test]
    fn replace_all_swaps_contents() {
        let col: EntityCollection<u32, &'static str> = EntityCollection::new();
        col.upsert(1, "old");
        col.replace_all([(2, "x"), (3, "y")]);
        assert!(!col.contains(&1));
        assert_eq!(col.len(), 2);
        let snap: Vec<_> = col.snapshot().iter().map(|v| **v).collect();
        assert_eq!(snap, ["x", "y"]);
    }

    #[test]
    fn every_mutation_bumps_version() {
        let col: EntityCollection<u32, u32> = EntityCollection::new();
        col.upsert(1, 1);
        col.upsert(1, 2);
        col.remove(&1);
        col.remove(&1);
        assert_eq!(col.version(), 3);
    }

    #[tokio::test]
    async fn subscribers_see_changes() {
        let col: EntityCollection<u32, u32> = EntityCollection::new();
        let mut rx = col.subscribe();
        col.upsert(1, 42);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update()[0], 42);
    }
}

//! Published snapshots shared between a poller and its HTTP readers.
//!
//! A `SnapshotCell` owns one immutable value behind a mutex. Writers swap
//! the whole value, readers clone the `Arc` and render outside the lock, so
//! the lock is only ever held for a pointer copy.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Shared handle to the latest published value. Clones share the same cell.
pub struct SnapshotCell<T> {
    inner: Arc<Mutex<Arc<T>>>,
}

impl<T> SnapshotCell<T> {
    /// Create a new cell holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Arc::new(value))),
        }
    }

    /// Current snapshot. Never observes a partially written value.
    pub fn load(&self) -> Arc<T> {
        Arc::clone(&self.lock())
    }

    /// Replace the snapshot wholesale.
    pub fn store(&self, value: T) {
        let next = Arc::new(value);
        let previous = {
            let mut guard = self.lock();
            std::mem::replace(&mut *guard, next)
        };
        // The old value may be large; free it after the lock is released.
        drop(previous);
    }

    fn lock(&self) -> MutexGuard<'_, Arc<T>> {
        // The guarded value is a single Arc, so a poisoned lock still holds
        // a complete snapshot.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Clone for SnapshotCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Default> Default for SnapshotCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_replaces_value() {
        let cell = SnapshotCell::new(vec![1, 2, 3]);
        cell.store(vec![4]);
        assert_eq!(*cell.load(), vec![4]);
    }

    #[test]
    fn readers_keep_previous_snapshot() {
        let cell = SnapshotCell::new(vec!["old"]);
        let held = cell.load();

        cell.store(vec!["new", "values"]);

        assert_eq!(*held, vec!["old"]);
        assert_eq!(*cell.load(), vec!["new", "values"]);
    }

    #[test]
    fn clones_share_the_same_slot() {
        let writer: SnapshotCell<Vec<u32>> = SnapshotCell::default();
        let reader = writer.clone();

        writer.store(vec![7]);
        assert_eq!(*reader.load(), vec![7]);
    }

    #[test]
    fn concurrent_readers_see_whole_snapshots() {
        let cell = SnapshotCell::new(vec![0u32; 64]);
        let reader = cell.clone();

        let handle = std::thread::spawn(move || {
            for _ in 0..1_000 {
                let snapshot = reader.load();
                let first = snapshot[0];
                assert!(snapshot.iter().all(|v| *v == first));
            }
        });

        for round in 1..=1_000u32 {
            cell.store(vec![round; 64]);
        }
        handle.join().unwrap();
    }
}

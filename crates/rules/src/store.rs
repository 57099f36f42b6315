//! [`RuleStore`]: the single owner of the current rule snapshot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Holds the current snapshot behind an `Arc` and swaps it wholesale.
///
/// The lock only guards the pointer swap. Readers clone the `Arc` and
/// evaluate against it for as long as they like; a concurrent
/// [`replace`](RuleStore::replace) installs a new pointer without touching
/// the snapshot a reader already holds, so a reader never sees a mix of two
/// snapshots.
#[derive(Debug)]
pub struct RuleStore<T> {
    current: RwLock<Arc<T>>,
    version: AtomicU64,
}

impl<T> RuleStore<T> {
    pub fn new(initial: T) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
            version: AtomicU64::new(0),
        }
    }

    /// The latest fully-installed snapshot.
    pub fn get(&self) -> Arc<T> {
        Arc::clone(&self.read_slot())
    }

    /// Replace the snapshot. Returns the new version number.
    pub fn replace(&self, next: T) -> u64 {
        let next = Arc::new(next);
        let previous = std::mem::replace(&mut *self.write_slot(), next);
        // Drop the old snapshot outside the lock.
        drop(previous);
        self.version.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Number of replacements installed so far (0 = initial snapshot).
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    // A panic while holding the lock cannot leave a torn value: the slot
    // only ever holds a complete `Arc`.
    fn read_slot(&self) -> RwLockReadGuard<'_, Arc<T>> {
        self.current.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_slot(&self) -> RwLockWriteGuard<'_, Arc<T>> {
        self.current.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Default> Default for RuleStore<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

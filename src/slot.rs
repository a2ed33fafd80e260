//! Single-value hand-off cell shared between control loops.
//!
//! A [`LatestValueSlot`] holds at most one value. Publishing replaces it,
//! reading hands out a shared snapshot. Both sides hold the lock only long
//! enough to swap or clone an `Arc`, so a slow reader never stalls a
//! producer and the producer never waits for a consumer.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Most-recent-value cell; newest publish wins
pub struct LatestValueSlot<T> {
    inner: Mutex<Option<Stamped<T>>>,
}

struct Stamped<T> {
    value: Arc<T>,
    published_at: Instant,
    sequence: u64,
}

impl<T> LatestValueSlot<T> {
    /// Create an empty slot
    #[must_use]
    pub const fn new() -> Self {
        Self { inner: Mutex::new(None) }
    }

    /// Replace the stored value
    pub fn publish(&self, value: T) {
        self.publish_arc(Arc::new(value));
    }

    /// Replace the stored value with an already shared one
    pub fn publish_arc(&self, value: Arc<T>) {
        let published_at = Instant::now();
        // Drop the previous value outside the lock
        let _previous = {
            let mut guard = self.lock();
            let sequence = guard.as_ref().map_or(1, |s| s.sequence + 1);
            guard.replace(Stamped {
                value,
                published_at,
                sequence,
            })
        };
    }

    /// Snapshot of the latest value, `None` until the first publish
    pub fn read(&self) -> Option<Arc<T>> {
        self.lock().as_ref().map(|s| Arc::clone(&s.value))
    }

    /// Snapshot together with its publish time
    pub fn read_with_age(&self) -> Option<(Arc<T>, Instant)> {
        self.lock()
            .as_ref()
            .map(|s| (Arc::clone(&s.value), s.published_at))
    }

    /// Number of publishes so far; 0 while empty
    pub fn sequence(&self) -> u64 {
        self.lock().as_ref().map_or(0, |s| s.sequence)
    }

    /// Whether nothing has been published yet
    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }

    /// Drop the stored value
    pub fn clear(&self) {
        let _previous = self.lock().take();
    }

    // The guarded section is a single Option swap, a poisoned lock still holds a valid value
    fn lock(&self) -> MutexGuard<'_, Option<Stamped<T>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for LatestValueSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for LatestValueSlot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatestValueSlot")
            .field("sequence", &self.sequence())
            .finish()
    }
}

use std::sync::{Arc, Mutex, MutexGuard};

use crate::models::PhysioSample;

/// Single-slot, last-writer-wins handoff between the frontend and the sampler.
///
/// The lock is held only for the store or the clone; callers never see it.
#[derive(Clone, Default)]
pub struct SnapshotCell {
    inner: Arc<Mutex<Option<PhysioSample>>>,
}

impl SnapshotCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any unconsumed snapshot.
    pub fn publish(&self, snapshot: PhysioSample) {
        *self.lock() = Some(snapshot);
    }

    /// Deep copy of the latest snapshot; `None` until the first publish.
    pub fn take_latest_clone(&self) -> Option<PhysioSample> {
        self.lock().clone()
    }

    pub fn has_snapshot(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<PhysioSample>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::id::TaskId;

/// Arena of exclusive locks, one per parent task.
///
/// Every write that touches the edge sets or order keys of a parent's
/// subtasks runs while holding that parent's lock, so the two writes of an
/// edge change can never interleave with another graph mutation on the
/// same sibling set.
///
/// The arena only keeps weak handles. A slot lives as long as some caller
/// holds it; dead entries are purged whenever a new slot is created.
#[derive(Default)]
pub struct ParentLocks {
    slots: Mutex<HashMap<TaskId, Weak<Mutex<()>>>>,
}

impl ParentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock handle for `parent_id`, shared with every other live handle for
    /// the same parent.
    pub fn slot(&self, parent_id: &TaskId) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = slots.get(parent_id).and_then(Weak::upgrade) {
            return slot;
        }

        slots.retain(|_, weak| weak.strong_count() > 0);
        let slot = Arc::new(Mutex::new(()));
        slots.insert(parent_id.clone(), Arc::downgrade(&slot));
        slot
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Hold a slot for the duration of a closure.
pub fn with_slot<T>(slot: &Mutex<()>, f: impl FnOnce() -> T) -> T {
    let _guard: MutexGuard<'_, ()> = slot.lock().unwrap_or_else(PoisonError::into_inner);
    f()
}

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{ArcMutexGuard, Mutex, RawMutex};

use super::domain::ApplicationId;

type Slot = Arc<Mutex<()>>;

/// Per-application critical sections. Mutations on different applications never
/// contend; mutations on the same application queue for at most `timeout`.
pub(crate) struct ApplicationLocks {
    slots: Mutex<HashMap<ApplicationId, Slot>>,
    timeout: Duration,
}

impl ApplicationLocks {
    pub(crate) fn new(timeout: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// `None` when the lock could not be taken within the timeout.
    pub(crate) fn acquire(&self, id: ApplicationId) -> Option<ApplicationGuard<'_>> {
        let slot = {
            let mut slots = self.slots.lock();
            slots.entry(id).or_default().clone()
        };

        match slot.try_lock_arc_for(self.timeout) {
            Some(guard) => Some(ApplicationGuard {
                locks: self,
                id,
                guard: Some(guard),
            }),
            None => {
                self.release_slot(id, slot);
                None
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked(&self) -> usize {
        self.slots.lock().len()
    }

    fn release_slot(&self, id: ApplicationId, slot: Slot) {
        let mut slots = self.slots.lock();
        drop(slot);
        // Only the map itself still references the slot: nobody is waiting.
        if slots
            .get(&id)
            .is_some_and(|current| Arc::strong_count(current) == 1)
        {
            slots.remove(&id);
        }
    }
}

pub(crate) struct ApplicationGuard<'a> {
    locks: &'a ApplicationLocks,
    id: ApplicationId,
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl Drop for ApplicationGuard<'_> {
    fn drop(&mut self) {
        if let Some(guard) = self.guard.take() {
            let slot = ArcMutexGuard::mutex(&guard).clone();
            drop(guard);
            self.locks.release_slot(self.id, slot);
        }
    }
}

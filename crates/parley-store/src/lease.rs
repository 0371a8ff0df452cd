use parking_lot::Mutex;
use parley_core::{ParleyError, Result, ThreadId};
use std::collections::HashSet;
use std::sync::Arc;

/// Exclusive right to mutate one thread. Released when dropped.
#[derive(Debug)]
pub struct ThreadLease {
    id: ThreadId,
    held: Arc<Mutex<HashSet<ThreadId>>>,
}

impl ThreadLease {
    pub fn thread_id(&self) -> &ThreadId {
        &self.id
    }
}

impl Drop for ThreadLease {
    fn drop(&mut self) {
        self.held.lock().remove(&self.id);
    }
}

/// Ids of the threads currently leased. Acquisition never waits; a held
/// lease is `Busy`. Entries only exist while their lease is alive.
#[derive(Clone, Default)]
pub(crate) struct LeaseTable {
    held: Arc<Mutex<HashSet<ThreadId>>>,
}

impl LeaseTable {
    pub(crate) fn try_acquire(&self, id: &ThreadId) -> Result<ThreadLease> {
        if !self.held.lock().insert(id.clone()) {
            return Err(ParleyError::Busy(id.to_string()));
        }
        Ok(ThreadLease {
            id: id.clone(),
            held: Arc::clone(&self.held),
        })
    }

    pub(crate) fn is_held(&self, id: &ThreadId) -> bool {
        self.held.lock().contains(id)
    }
}

//! Per-path FIFO serialization.
//!
//! Each canonical path gets its own `tokio::sync::Mutex`, whose waiters are
//! served in arrival order. Entries are dropped from the table once nobody
//! holds or waits on them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::core::VirtualPath;

#[derive(Debug)]
struct Slot {
    mutex: Arc<AsyncMutex<()>>,
    // Holders plus pending waiters.
    users: usize,
}

type Slots = Arc<Mutex<HashMap<VirtualPath, Slot>>>;

#[derive(Debug, Default)]
pub(crate) struct PathQueue {
    slots: Slots,
}

/// Registration of one holder or waiter on a path.
struct Ticket {
    path: VirtualPath,
    slots: Slots,
}

/// Keeps the path locked until dropped.
pub(crate) struct PathGuard {
    // Declared first: the mutex is released before the ticket is returned.
    _guard: OwnedMutexGuard<()>,
    ticket: Ticket,
}

impl PathQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for every earlier operation on `path` to finish.
    pub async fn lock(&self, path: &VirtualPath) -> PathGuard {
        let (ticket, mutex) = self.enter(path);
        let guard = mutex.lock_owned().await;
        PathGuard {
            _guard: guard,
            ticket,
        }
    }

    fn enter(&self, path: &VirtualPath) -> (Ticket, Arc<AsyncMutex<()>>) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = slots.entry(path.clone()).or_insert_with(|| Slot {
            mutex: Arc::new(AsyncMutex::new(())),
            users: 0,
        });
        slot.users += 1;
        let ticket = Ticket {
            path: path.clone(),
            slots: Arc::clone(&self.slots),
        };
        (ticket, Arc::clone(&slot.mutex))
    }

    /// Locks two paths in canonical order. Equal paths are locked once.
    pub async fn lock_pair(
        &self,
        a: &VirtualPath,
        b: &VirtualPath,
    ) -> (PathGuard, Option<PathGuard>) {
        if a == b {
            return (self.lock(a).await, None);
        }
        let (first, second) = if a < b { (a, b) } else { (b, a) };
        let first = self.lock(first).await;
        let second = self.lock(second).await;
        (first, Some(second))
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = slots.get_mut(&self.path) {
            slot.users -= 1;
            if slot.users == 0 {
                slots.remove(&self.path);
            }
        }
    }
}

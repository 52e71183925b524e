// ABOUTME: Per-user turn locks so each user has at most one turn in flight.
// ABOUTME: A second message from the same user waits for the first turn to finish.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap = Arc<Mutex<HashMap<u64, Arc<AsyncMutex<()>>>>>;

#[derive(Clone, Default)]
pub struct TurnLocks {
    locks: LockMap,
}

/// Holds a user's turn slot; releasing it forgets the user once nobody waits
pub struct TurnGuard {
    guard: Option<OwnedMutexGuard<()>>,
    locks: LockMap,
    user_id: u64,
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks
            .get(&self.user_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.user_id);
        }
    }
}

impl TurnLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, user_id: u64) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(user_id).or_default())
    }

    /// Wait until `user_id` has no turn running, then hold the slot
    pub async fn acquire(&self, user_id: u64) -> TurnGuard {
        let guard = self.lock_for(user_id).lock_owned().await;
        TurnGuard {
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
            user_id,
        }
    }

    /// True while a turn holds the user's slot
    pub fn is_busy(&self, user_id: u64) -> bool {
        let locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .get(&user_id)
            .is_some_and(|lock| lock.try_lock().is_err())
    }

    /// Users with a turn running or queued
    pub fn tracked_users(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

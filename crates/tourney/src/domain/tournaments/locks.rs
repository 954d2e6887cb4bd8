use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

/// Per-tournament advisory locks. Decisions, transitions and the whole
/// promotion of one tournament run one at a time; different tournaments
/// never wait on each other.
#[derive(Debug, Default, Clone)]
pub struct TournamentLocks {
    locks: Arc<Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>>,
}

/// Holds a tournament's lock. Dropping it releases the lock and removes the
/// entry once no other task holds or waits on it.
#[derive(Debug)]
pub struct TournamentGuard {
    guard: Option<OwnedMutexGuard<()>>,
    locks: TournamentLocks,
    tournament_id: Uuid,
}

impl Drop for TournamentGuard {
    fn drop(&mut self) {
        self.guard.take();
        self.locks.forget(&self.tournament_id);
    }
}

impl TournamentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Released when the returned guard is dropped, including when the
    /// holding future is cancelled.
    pub async fn acquire(&self, tournament_id: Uuid) -> TournamentGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(tournament_id).or_default().clone()
        };
        TournamentGuard {
            guard: Some(lock.lock_owned().await),
            locks: self.clone(),
            tournament_id,
        }
    }

    /// Waiters and holders each own a clone of the mutex, so a count of one
    /// means only the map still refers to it.
    fn forget(&self, tournament_id: &Uuid) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(lock) = locks.get(tournament_id) {
            if Arc::strong_count(lock) == 1 {
                locks.remove(tournament_id);
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

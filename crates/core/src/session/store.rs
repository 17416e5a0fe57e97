use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::chat::ChatKey;
use crate::session::Session;

/// One key's session cell. `occupied` mirrors the cell as of the last released entry,
/// so it can be read while an event holds the lock.
#[derive(Debug, Default)]
struct Slot {
    session: Arc<Mutex<Option<Session>>>,
    occupied: Arc<AtomicBool>,
}

/// Sessions keyed by chat. Each key has its own lock; holding a [`SessionEntry`]
/// serialises every read and write for that key, while other keys proceed in parallel.
#[derive(Debug, Default)]
pub struct SessionStore {
    slots: Mutex<HashMap<ChatKey, Slot>>,
}

/// Exclusive access to one key's session for as long as it is held.
#[derive(Debug)]
pub struct SessionEntry {
    key: ChatKey,
    guard: OwnedMutexGuard<Option<Session>>,
    occupied: Arc<AtomicBool>,
}

impl Drop for SessionEntry {
    fn drop(&mut self) {
        self.occupied.store(self.guard.is_some(), Ordering::Release);
    }
}

impl SessionEntry {
    pub fn key(&self) -> &ChatKey {
        &self.key
    }

    pub fn get(&self) -> Option<&Session> {
        self.guard.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut Session> {
        self.guard.as_mut()
    }

    pub fn take(&mut self) -> Option<Session> {
        self.guard.take()
    }

    /// Full reset: any previous session for the key is returned and dropped from the store.
    pub fn replace(&mut self, session: Session) -> Option<Session> {
        self.guard.replace(session)
    }

    pub fn put(&mut self, session: Option<Session>) {
        *self.guard = session;
    }

    pub fn delete(&mut self) -> bool {
        self.guard.take().is_some()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entry(&self, key: &ChatKey) -> SessionEntry {
        let (cell, occupied) = {
            let mut slots = self.slots.lock().await;
            let slot = slots.entry(key.clone()).or_default();
            (Arc::clone(&slot.session), Arc::clone(&slot.occupied))
        };
        SessionEntry { key: key.clone(), guard: cell.lock_owned().await, occupied }
    }

    pub async fn get(&self, key: &ChatKey) -> Option<Session> {
        self.entry(key).await.get().cloned()
    }

    pub async fn create(&self, session: Session) -> Option<Session> {
        let key = session.chat_key.clone();
        self.entry(&key).await.replace(session)
    }

    pub async fn delete(&self, key: &ChatKey) -> Option<Session> {
        self.entry(key).await.take()
    }

    /// Keys with a live session. A slot locked by a running event is counted
    /// by what it held when its previous event finished.
    pub async fn active_count(&self) -> usize {
        let slots = self.slots.lock().await;
        slots
            .values()
            .filter(|slot| match slot.session.try_lock() {
                Ok(guard) => guard.is_some(),
                Err(_) => slot.occupied.load(Ordering::Acquire),
            })
            .count()
    }

    /// Drops sessions idle for at least `max_idle` and forgets empty slots.
    /// Slots another task holds or waits on are left alone.
    pub async fn sweep_idle(&self, now: DateTime<Utc>, max_idle: Duration) -> usize {
        let mut slots = self.slots.lock().await;
        let mut expired = 0;

        slots.retain(|_, slot| {
            if Arc::strong_count(&slot.session) > 1 {
                return true;
            }
            let Ok(mut guard) = slot.session.try_lock() else {
                return true;
            };
            match guard.as_ref() {
                None => false,
                Some(session) if session.is_idle(now, max_idle) => {
                    *guard = None;
                    slot.occupied.store(false, Ordering::Release);
                    expired += 1;
                    false
                }
                Some(_) => true,
            }
        });

        expired
    }
}

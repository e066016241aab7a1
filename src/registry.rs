//! Identity registry
//!
//! The single source of truth for who is online: nickname → client handle.
//! Every read and write goes through one mutex, and the lock is never held
//! across an `.await`. Callers get cloned handles out and do their I/O
//! after the guard is released.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::client::ClientHandle;
use crate::error::AppError;
use crate::types::{ClientId, Nickname};

/// Shared nickname → connection mapping
#[derive(Debug, Default)]
pub struct Registry {
    clients: Mutex<HashMap<Nickname, ClientHandle>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // No method panics while holding the guard, so a poisoned map is still consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<Nickname, ClientHandle>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert `handle` under `nick` iff the name is free
    pub fn try_register(&self, nick: Nickname, handle: ClientHandle) -> Result<(), AppError> {
        let mut clients = self.lock();
        if clients.contains_key(&nick) {
            return Err(AppError::NicknameInUse);
        }
        debug!("Registered {} for client {}", nick, handle.id());
        clients.insert(nick, handle);
        Ok(())
    }

    /// Give up `nick` on behalf of connection `id`
    ///
    /// Returns true if `id` was the last holder of the name: either its
    /// entry is removed now, or it was already removed and the name is
    /// still free. False if another connection has since taken the name.
    pub fn release(&self, nick: &str, id: ClientId) -> bool {
        let mut clients = self.lock();
        match clients.get(nick) {
            Some(handle) if handle.id() == id => {
                clients.remove(nick);
                debug!("Released {} for client {}", nick, id);
                true
            }
            Some(_) => false,
            None => true,
        }
    }

    /// Remove `nick` only if it still maps to connection `id`
    ///
    /// Returns true if an entry was removed.
    pub fn unregister(&self, nick: &str, id: ClientId) -> bool {
        let mut clients = self.lock();
        match clients.get(nick) {
            Some(handle) if handle.id() == id => {
                clients.remove(nick);
                debug!("Unregistered {} for client {}", nick, id);
                true
            }
            _ => false,
        }
    }

    pub fn lookup(&self, nick: &str) -> Option<ClientHandle> {
        self.lock().get(nick).cloned()
    }

    /// Resolve two names in one critical section
    pub fn lookup_pair(
        &self,
        first: &str,
        second: &str,
    ) -> (Option<ClientHandle>, Option<ClientHandle>) {
        let clients = self.lock();
        (clients.get(first).cloned(), clients.get(second).cloned())
    }

    /// All registered names in lexicographic order
    pub fn list_all(&self) -> Vec<Nickname> {
        let mut names: Vec<Nickname> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Snapshot of every entry whose name is not in `exclude`
    pub fn recipients(&self, exclude: &[&Nickname]) -> Vec<(Nickname, ClientHandle)> {
        self.lock()
            .iter()
            .filter(|(nick, _)| !exclude.contains(nick))
            .map(|(nick, handle)| (nick.clone(), handle.clone()))
            .collect()
    }

    /// Remove every entry, returning the dropped names
    pub fn clear(&self) -> Vec<Nickname> {
        self.lock().drain().map(|(nick, _)| nick).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

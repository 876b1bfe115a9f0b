//! Presence: which identity currently owns which live connection.
//!
//! One entry per identity. A newer connection for the same identity replaces
//! the entry, and a connection may only remove the entry it still owns, so a
//! late close of a superseded socket never evicts its successor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::DeliveryError;

/// Cheap, cloneable handle to one live connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: u64,
    identity: String,
    /// Text frames queued for the connection's writer.
    tx: mpsc::Sender<String>,
}

impl ConnectionHandle {
    pub fn new(identity: impl Into<String>, tx: mpsc::Sender<String>) -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self {
            id: COUNTER.fetch_add(1, Ordering::Relaxed),
            identity: identity.into(),
            tx,
        }
    }

    /// Process-unique connection id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Identity bound at handshake.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Queue a text frame without waiting.
    pub fn send_text(&self, frame: impl Into<String>) -> Result<(), DeliveryError> {
        self.tx
            .try_send(frame.into())
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
                mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
            })
    }

    fn same_connection(&self, other: &ConnectionHandle) -> bool {
        self.id == other.id
    }
}

/// Identity → live connection map. Owned by the server state and shared with
/// the relay; safe to use from any number of connection tasks.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: Mutex<HashMap<String, ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `handle` the canonical connection for its identity. Returns the
    /// connection it superseded, if any.
    pub fn register(&self, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        self.entries
            .lock()
            .insert(handle.identity.clone(), handle)
    }

    pub fn lookup(&self, identity: &str) -> Option<ConnectionHandle> {
        self.entries.lock().get(identity).cloned()
    }

    /// Remove the entry for `identity` only if it is still `handle`.
    /// Returns whether an entry was removed.
    pub fn unregister(&self, identity: &str, handle: &ConnectionHandle) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(identity) {
            Some(current) if current.same_connection(handle) => {
                entries.remove(identity);
                true
            }
            _ => false,
        }
    }

    pub fn is_online(&self, identity: &str) -> bool {
        self.entries.lock().contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn handle(identity: &str) -> (ConnectionHandle, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(8);
        (ConnectionHandle::new(identity, tx), rx)
    }

    #[test]
    fn lookup_returns_registered_connection() {
        let registry = ConnectionRegistry::new();
        let (a, _rx) = handle("u1");
        assert!(registry.register(a.clone()).is_none());
        assert_eq!(registry.lookup("u1").map(|h| h.id()), Some(a.id()));
        assert!(registry.lookup("u2").is_none());
    }

    #[test]
    fn unregister_removes_own_entry() {
        let registry = ConnectionRegistry::new();
        let (a, _rx) = handle("u1");
        registry.register(a.clone());
        assert!(registry.unregister("u1", &a));
        assert!(registry.lookup("u1").is_none());
        assert!(!registry.unregister("u1", &a));
    }

    #[test]
    fn newer_connection_supersedes() {
        let registry = ConnectionRegistry::new();
        let (old, _rx1) = handle("u1");
        let (new, _rx2) = handle("u1");
        registry.register(old.clone());
        let replaced = registry.register(new.clone()).unwrap();
        assert_eq!(replaced.id(), old.id());
        assert_eq!(registry.lookup("u1").unwrap().id(), new.id());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn stale_close_keeps_newer_connection() {
        let registry = ConnectionRegistry::new();
        let (old, _rx1) = handle("u1");
        let (new, _rx2) = handle("u1");
        registry.register(old.clone());
        registry.register(new.clone());

        assert!(!registry.unregister("u1", &old));
        assert_eq!(registry.lookup("u1").unwrap().id(), new.id());

        assert!(registry.unregister("u1", &new));
        assert!(!registry.is_online("u1"));
    }

    #[test]
    fn concurrent_register_and_stale_unregister() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut keep = Vec::new();
        let mut threads = Vec::new();
        for i in 0..16 {
            let identity = format!("user{i}");
            let (stale, rx1) = handle(&identity);
            let (fresh, rx2) = handle(&identity);
            keep.push((rx1, rx2));
            registry.register(stale.clone());
            let registry = Arc::clone(&registry);
            threads.push(std::thread::spawn(move || {
                registry.register(fresh.clone());
                registry.unregister(&identity, &stale);
                (identity, fresh.id())
            }));
        }
        for t in threads {
            let (identity, fresh_id) = t.join().unwrap();
            assert_eq!(registry.lookup(&identity).unwrap().id(), fresh_id);
        }
        assert_eq!(registry.len(), 16);
    }

    #[test]
    fn send_reports_closed_receiver() {
        let (a, rx) = handle("u1");
        drop(rx);
        assert!(!a.is_open());
        assert_eq!(a.send_text("x"), Err(DeliveryError::Closed));
    }

    #[test]
    fn send_reports_full_queue() {
        let (tx, _rx) = mpsc::channel(1);
        let a = ConnectionHandle::new("u1", tx);
        a.send_text("one").unwrap();
        assert_eq!(a.send_text("two"), Err(DeliveryError::Full));
    }
}

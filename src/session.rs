//! Concurrent session table shared by the event stream workers and the dispatcher
//!
//! Each open event stream owns one entry holding the JSON-RPC messages that are
//! waiting to be delivered to it. All access goes through the operations below;
//! the per-entry lock of the underlying map makes `enqueue` and `drain_and_clear`
//! on the same session atomic with respect to one another.

use std::{collections::VecDeque, fmt, sync::Arc};

use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Notify;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Accepts an identifier supplied by a client, e.g. from the `Mcp-Session-Id` header.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session {0} is closed")]
    NotFound(SessionId),
}

struct SessionEntry {
    queue: VecDeque<Value>,
    wakeup: Arc<Notify>,
    opened_at: DateTime<Utc>,
}

impl SessionEntry {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            wakeup: Arc::new(Notify::new()),
            opened_at: Utc::now(),
        }
    }
}

#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<SessionId, SessionEntry>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fresh session with an empty outbound queue.
    pub fn create(&self) -> SessionId {
        loop {
            let id = SessionId::generate();
            if let Entry::Vacant(slot) = self.sessions.entry(id.clone()) {
                slot.insert(SessionEntry::new());
                return id;
            }
        }
    }

    /// Appends a message to the session's queue and wakes its stream worker.
    ///
    /// `NotFound` means the stream is already gone and the message was dropped.
    pub fn enqueue(&self, id: &SessionId, message: Value) -> Result<(), SessionError> {
        let Some(mut entry) = self.sessions.get_mut(id) else {
            return Err(SessionError::NotFound(id.clone()));
        };

        entry.queue.push_back(message);
        entry.wakeup.notify_one();
        Ok(())
    }

    /// Removes and returns every queued message in enqueue order.
    pub fn drain_and_clear(&self, id: &SessionId) -> Vec<Value> {
        self.sessions
            .get_mut(id)
            .map(|mut entry| Vec::from(std::mem::take(&mut entry.queue)))
            .unwrap_or_default()
    }

    /// Handle signalled whenever a message is enqueued for the session.
    pub fn wakeup(&self, id: &SessionId) -> Option<Arc<Notify>> {
        self.sessions
            .get(id)
            .map(|entry| Arc::clone(&entry.wakeup))
    }

    pub fn opened_at(&self, id: &SessionId) -> Option<DateTime<Utc>> {
        self.sessions.get(id).map(|entry| entry.opened_at)
    }

    /// Returns `true` when the session existed.
    pub fn destroy(&self, id: &SessionId) -> bool {
        self.sessions.remove(id).is_some()
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Arc};

    use serde_json::json;

    use super::{SessionError, SessionId, SessionStore};

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creates_yield_distinct_ids() {
        let store = Arc::new(SessionStore::new());
        let handles = (0..200)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.create() })
            })
            .collect::<Vec<_>>();

        let mut ids = HashSet::new();
        for handle in handles {
            ids.insert(handle.await.expect("create task"));
        }

        assert_eq!(ids.len(), 200);
        assert_eq!(store.len(), 200);
    }

    #[test]
    fn drain_returns_messages_in_enqueue_order_and_clears() {
        let store = SessionStore::new();
        let id = store.create();

        for n in 0..3 {
            store.enqueue(&id, json!({ "n": n })).expect("session open");
        }

        let drained = store.drain_and_clear(&id);
        assert_eq!(drained, vec![json!({"n": 0}), json!({"n": 1}), json!({"n": 2})]);
        assert!(store.drain_and_clear(&id).is_empty());
        assert!(store.contains(&id));
    }

    #[test]
    fn enqueue_after_destroy_reports_not_found() {
        let store = SessionStore::new();
        let id = store.create();

        assert!(store.destroy(&id));
        assert!(!store.destroy(&id));

        let err = store
            .enqueue(&id, json!({"dropped": true}))
            .expect_err("closed session must reject messages");
        assert_eq!(err, SessionError::NotFound(id.clone()));
        assert!(store.drain_and_clear(&id).is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn parse_rejects_blank_identifiers() {
        assert_eq!(SessionId::parse("   "), None);
        assert_eq!(
            SessionId::parse(" abc ").map(|id| id.to_string()),
            Some("abc".to_string())
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_enqueue_and_drain_lose_nothing() {
        let store = Arc::new(SessionStore::new());
        let id = store.create();

        let writer = {
            let store = Arc::clone(&store);
            let id = id.clone();
            tokio::spawn(async move {
                for n in 0..1_000 {
                    store.enqueue(&id, json!(n)).expect("session open");
                    if n % 50 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            })
        };

        let mut received = Vec::new();
        while received.len() < 1_000 {
            received.extend(store.drain_and_clear(&id));
            tokio::task::yield_now().await;
        }
        writer.await.expect("writer task");

        let expected = (0..1_000).map(|n| json!(n)).collect::<Vec<_>>();
        assert_eq!(received, expected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn create_and_destroy_many_leaves_store_empty() {
        let store = Arc::new(SessionStore::new());
        let handles = (0..50)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    let id = store.create();
                    assert!(store.opened_at(&id).is_some());
                    store.destroy(&id)
                })
            })
            .collect::<Vec<_>>();

        for handle in handles {
            assert!(handle.await.expect("session task"));
        }
        assert!(store.is_empty());
    }
}

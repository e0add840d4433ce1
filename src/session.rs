//! Per-session conversation buffers.
//!
//! Each conversation lives behind its own mutex so that appends to one buffer
//! are serialized while different sessions proceed independently. The map
//! itself is a [`DashMap`] so lookups never block on an in-flight request.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use dashmap::DashMap;
use tracing::debug;

use crate::config::SessionConfig;
use crate::context::{ConversationBuffer, Turn};

/// Session used by clients that do not identify themselves.
pub const DEFAULT_SESSION_ID: &str = "default";

/// Longest session id accepted from clients.
pub const MAX_SESSION_ID_LEN: usize = 128;

/// Session ids are opaque, but limited to visible ASCII of bounded length.
pub fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= MAX_SESSION_ID_LEN && id.bytes().all(|b| b.is_ascii_graphic())
}

#[derive(Debug)]
struct Session {
    buffer: ConversationBuffer,
    last_seen: Instant,
}

/// Shared handle to one conversation.
///
/// Every method takes the session lock for the duration of the call only.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    inner: Arc<Mutex<Session>>,
}

impl SessionHandle {
    fn new(window_size: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Session {
                buffer: ConversationBuffer::new(window_size),
                last_seen: Instant::now(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        // A poisoned lock only means another request panicked mid-append; the
        // buffer itself is still a valid sequence of turns.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn append_user(&self, text: impl Into<String>) {
        let mut session = self.lock();
        session.buffer.append_user(text);
        session.last_seen = Instant::now();
    }

    pub fn append_assistant(&self, text: impl Into<String>) {
        let mut session = self.lock();
        session.buffer.append_assistant(text);
        session.last_seen = Instant::now();
    }

    /// Appends a user turn and returns the resulting context in one critical
    /// section, so the snapshot always ends with this turn.
    pub fn append_user_and_snapshot(&self, text: impl Into<String>) -> Vec<Turn> {
        let mut session = self.lock();
        session.buffer.append_user(text);
        session.last_seen = Instant::now();
        session.buffer.snapshot()
    }

    pub fn snapshot(&self) -> Vec<Turn> {
        self.lock().buffer.snapshot()
    }

    pub fn len(&self) -> usize {
        self.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().buffer.is_empty()
    }

    pub fn last_seen(&self) -> Instant {
        self.lock().last_seen
    }
}

/// All live conversations, keyed by session id.
#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, SessionHandle>>,
    config: SessionConfig,
}

impl SessionStore {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns the session for `id`, creating an empty one if needed.
    pub fn session(&self, id: &str) -> SessionHandle {
        if let Some(handle) = self.sessions.get(id) {
            return handle.value().clone();
        }

        let handle = self
            .sessions
            .entry(id.to_string())
            .or_insert_with(|| {
                debug!(session_id = id, "Creating conversation");
                SessionHandle::new(self.config.window_size)
            })
            .value()
            .clone();

        if self.sessions.len() > self.config.max_sessions {
            self.evict_overflow(id);
        }
        handle
    }

    pub fn get(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.get(id).map(|handle| handle.value().clone())
    }

    pub fn snapshot(&self, id: &str) -> Option<Vec<Turn>> {
        self.get(id).map(|handle| handle.snapshot())
    }

    /// Drops a conversation. Requests already holding its handle finish
    /// against the detached buffer.
    pub fn remove(&self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn evict_idle(&self) -> usize {
        self.evict_idle_at(Instant::now())
    }

    /// Removes sessions idle for longer than the configured TTL as of `now`,
    /// then trims down to `max_sessions`. Returns how many were removed.
    pub fn evict_idle_at(&self, now: Instant) -> usize {
        let before = self.sessions.len();
        let ttl = self.config.ttl;
        self.sessions
            .retain(|_, handle| now.saturating_duration_since(handle.last_seen()) <= ttl);
        let expired = before.saturating_sub(self.sessions.len());
        expired + self.evict_overflow("")
    }

    /// Once more than `max_sessions` are live, removes least recently used
    /// sessions down to the low-water mark, never touching `keep`.
    fn evict_overflow(&self, keep: &str) -> usize {
        let max_sessions = self.config.max_sessions;
        if self.sessions.len() <= max_sessions {
            return 0;
        }
        let excess = self.sessions.len().saturating_sub(low_water_mark(max_sessions));

        let mut candidates: Vec<(String, Instant)> = self
            .sessions
            .iter()
            .filter(|entry| entry.key() != keep)
            .map(|entry| (entry.key().clone(), entry.value().last_seen()))
            .collect();
        if excess < candidates.len() {
            candidates.select_nth_unstable_by_key(excess, |(_, last_seen)| *last_seen);
        }

        let mut removed = 0;
        for (id, _) in candidates.into_iter().take(excess) {
            if self.sessions.remove(&id).is_some() {
                debug!(session_id = %id, "Evicted least recently used conversation");
                removed += 1;
            }
        }
        removed
    }
}

/// Size the store is trimmed to once it overflows, so the scan runs once per
/// batch of new sessions rather than once per session.
fn low_water_mark(max_sessions: usize) -> usize {
    max_sessions - max_sessions / 10
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn store(window_size: usize, max_sessions: usize) -> SessionStore {
        SessionStore::new(SessionConfig {
            window_size,
            ttl: Duration::from_secs(60),
            max_sessions,
            eviction_interval: Duration::from_secs(1),
        })
    }

    #[test]
    fn test_sessions_are_isolated() {
        let store = store(10, 100);
        store.session("alice").append_user("hi from alice");
        store.session("bob").append_user("hi from bob");

        assert_eq!(store.snapshot("alice").unwrap(), vec![Turn::user("hi from alice")]);
        assert_eq!(store.snapshot("bob").unwrap(), vec![Turn::user("hi from bob")]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_session_handle_is_shared() {
        let store = store(10, 100);
        let first = store.session("s");
        let second = store.session("s");

        first.append_user("q");
        second.append_assistant("a");
        assert_eq!(first.len(), 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_window_applies_per_session() {
        let store = store(4, 100);
        let handle = store.session("s");
        for i in 0..9 {
            handle.append_user(format!("m{}", i));
        }

        let contents: Vec<String> = handle
            .snapshot()
            .iter()
            .map(|t| t.content().to_string())
            .collect();
        assert_eq!(contents, vec!["m5", "m6", "m7", "m8"]);
    }

    #[test]
    fn test_append_user_and_snapshot_ends_with_new_turn() {
        let store = store(2, 100);
        let handle = store.session("s");
        handle.append_user("old");
        handle.append_assistant("reply");

        let snapshot = handle.append_user_and_snapshot("new");
        assert_eq!(snapshot, vec![Turn::assistant("reply"), Turn::user("new")]);
    }

    #[test]
    fn test_unknown_session_has_no_snapshot() {
        let store = store(10, 100);
        assert!(store.snapshot("missing").is_none());
        assert!(store.get("missing").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_session() {
        let store = store(10, 100);
        store.session("s").append_user("q");

        assert!(store.remove("s"));
        assert!(!store.remove("s"));
        assert!(store.snapshot("s").is_none());
    }

    #[test]
    fn test_evict_idle_sessions() {
        let store = store(10, 100);
        store.session("a").append_user("q");
        store.session("b").append_user("q");

        assert_eq!(store.evict_idle_at(Instant::now()), 0);
        assert_eq!(store.len(), 2);

        let later = Instant::now() + Duration::from_secs(61);
        assert_eq!(store.evict_idle_at(later), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn test_overflow_evicts_least_recently_used() {
        let store = store(10, 2);
        store.session("a").append_user("q");
        std::thread::sleep(Duration::from_millis(5));
        store.session("b").append_user("q");
        std::thread::sleep(Duration::from_millis(5));
        store.session("a").append_user("again");
        std::thread::sleep(Duration::from_millis(5));

        store.session("c");
        assert_eq!(store.len(), 2);
        assert!(store.get("b").is_none());
        assert!(store.get("a").is_some());
        assert!(store.get("c").is_some());
    }

    #[test]
    fn test_overflow_evicts_in_batches() {
        let store = store(10, 10);
        for i in 0..10 {
            store.session(&format!("s{}", i)).append_user("q");
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(store.len(), 10);

        store.session("newest");
        assert_eq!(store.len(), 9);
        assert!(store.get("s0").is_none());
        assert!(store.get("s1").is_none());
        assert!(store.get("s2").is_some());
        assert!(store.get("newest").is_some());

        // Room below the cap again, so the next session evicts nothing.
        store.session("after");
        assert_eq!(store.len(), 10);
        assert!(store.get("s2").is_some());
    }

    #[test]
    fn test_session_id_validation() {
        assert!(is_valid_session_id("user-42"));
        assert!(is_valid_session_id(DEFAULT_SESSION_ID));
        assert!(!is_valid_session_id(""));
        assert!(!is_valid_session_id("has space"));
        assert!(!is_valid_session_id(&"x".repeat(MAX_SESSION_ID_LEN + 1)));
    }
}

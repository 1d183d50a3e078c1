//! In-memory conversation buffers, one per user
//!
//! Sessions live only for the lifetime of the process. The buffer is
//! bounded: once a session exceeds `2 * max_history_turns` turns, the
//! oldest middle turns are dropped while the very first turn is kept
//! as an anchor for the opening context.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use twilight_model::id::marker::UserMarker;
use twilight_model::id::Id;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// One message within a conversation, in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

struct Session {
    turns: Vec<Turn>,
    last_activity: Instant,
}

/// Map of user ID -> conversation session.
///
/// All access goes through the store's lock; callers never see the
/// internal buffers by mutable reference.
pub struct ConversationStore {
    sessions: Mutex<HashMap<Id<UserMarker>, Session>>,
    max_history_turns: usize,
}

impl ConversationStore {
    pub fn new(max_history_turns: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_history_turns,
        }
    }

    /// Reset the user's session to an empty buffer.
    pub fn start(&self, user_id: Id<UserMarker>, now: Instant) {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.insert(
            user_id,
            Session {
                turns: Vec::new(),
                last_activity: now,
            },
        );
    }

    /// Remove the user's session, reporting whether one existed.
    pub fn end(&self, user_id: Id<UserMarker>) -> bool {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.remove(&user_id).is_some()
    }

    /// Append a user turn, creating the session if needed, then trim
    /// the buffer to the history limit.
    pub fn append_user(&self, user_id: Id<UserMarker>, content: &str, now: Instant) {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions.entry(user_id).or_insert_with(|| Session {
            turns: Vec::new(),
            last_activity: now,
        });
        session.turns.push(Turn {
            role: Role::User,
            content: content.to_string(),
        });
        session.last_activity = now;

        // Keep the first turn (opening context) plus the most recent
        // limit-1 turns; everything in between is dropped for good.
        let limit = self.max_history_turns * 2;
        if limit >= 2 && session.turns.len() > limit {
            let tail_start = session.turns.len() - (limit - 1);
            let mut trimmed = Vec::with_capacity(limit);
            trimmed.push(session.turns[0].clone());
            trimmed.extend_from_slice(&session.turns[tail_start..]);
            session.turns = trimmed;
        }
    }

    /// Append an assistant turn to an existing session.
    pub fn append_assistant(&self, user_id: Id<UserMarker>, content: &str) -> Result<()> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions.get_mut(&user_id).ok_or(Error::NoActiveSession)?;
        session.turns.push(Turn {
            role: Role::Assistant,
            content: content.to_string(),
        });
        session.last_activity = Instant::now();
        Ok(())
    }

    /// Owned copy of the user's conversation, empty if no session.
    pub fn snapshot(&self, user_id: Id<UserMarker>) -> Vec<Turn> {
        let sessions = self.sessions.lock().unwrap();
        sessions
            .get(&user_id)
            .map(|s| s.turns.clone())
            .unwrap_or_default()
    }

    /// Drop every session idle for at least `timeout`, returning the
    /// evicted user IDs for logging.
    pub fn evict_idle(&self, now: Instant, timeout: Duration) -> Vec<Id<UserMarker>> {
        let mut sessions = self.sessions.lock().unwrap();
        let mut evicted = Vec::new();
        sessions.retain(|user_id, session| {
            if now.saturating_duration_since(session.last_activity) >= timeout {
                evicted.push(*user_id);
                false
            } else {
                true
            }
        });
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: u64) -> Id<UserMarker> {
        Id::new(id)
    }

    fn contents(turns: &[Turn]) -> Vec<&str> {
        turns.iter().map(|t| t.content.as_str()).collect()
    }

    #[test]
    fn test_append_builds_history_in_order() {
        let store = ConversationStore::new(10);
        let now = Instant::now();

        store.append_user(user(1), "hello", now);
        store.append_assistant(user(1), "hi there").unwrap();

        let turns = store.snapshot(user(1));
        assert_eq!(contents(&turns), vec!["hello", "hi there"]);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[1].role, Role::Assistant);
    }

    #[test]
    fn test_truncation_keeps_first_and_recent_turns() {
        // max_history_turns=2 -> limit=4
        let store = ConversationStore::new(2);
        let now = Instant::now();

        store.append_user(user(1), "A", now);
        store.append_assistant(user(1), "B").unwrap();
        store.append_user(user(1), "C", now);
        store.append_assistant(user(1), "D").unwrap();
        store.append_user(user(1), "E", now);

        // Five turns exceed the limit: keep "A" plus the last three
        assert_eq!(contents(&store.snapshot(user(1))), vec!["A", "C", "D", "E"]);
    }

    #[test]
    fn test_buffer_never_exceeds_limit() {
        let store = ConversationStore::new(3);
        let now = Instant::now();

        store.append_user(user(1), "first", now);
        for i in 0..50 {
            store.append_assistant(user(1), &format!("a{i}")).unwrap();
            store.append_user(user(1), &format!("u{i}"), now);
        }

        let turns = store.snapshot(user(1));
        assert!(turns.len() <= 6);
        assert_eq!(turns[0].content, "first");
    }

    #[test]
    fn test_start_resets_history() {
        let store = ConversationStore::new(10);
        let now = Instant::now();

        store.append_user(user(1), "old", now);
        store.start(user(1), now);
        assert!(store.snapshot(user(1)).is_empty());
    }

    #[test]
    fn test_end_reports_presence() {
        let store = ConversationStore::new(10);

        assert!(!store.end(user(1)));
        store.append_user(user(1), "hello", Instant::now());
        assert!(store.end(user(1)));
        assert!(!store.end(user(1)));
        assert!(store.snapshot(user(1)).is_empty());
    }

    #[test]
    fn test_append_assistant_requires_session() {
        let store = ConversationStore::new(10);
        assert!(matches!(
            store.append_assistant(user(1), "hello"),
            Err(Error::NoActiveSession)
        ));
    }

    #[test]
    fn test_evict_idle_boundaries() {
        let store = ConversationStore::new(10);
        let timeout = Duration::from_secs(600);
        let t0 = Instant::now();

        store.append_user(user(1), "hello", t0);

        assert!(store
            .evict_idle(t0 + Duration::from_secs(599), timeout)
            .is_empty());
        assert!(!store.snapshot(user(1)).is_empty());

        let evicted = store.evict_idle(t0 + Duration::from_secs(601), timeout);
        assert_eq!(evicted, vec![user(1)]);
        assert!(store.snapshot(user(1)).is_empty());
    }

    #[test]
    fn test_eviction_at_exact_timeout() {
        let store = ConversationStore::new(10);
        let timeout = Duration::from_secs(600);
        let t0 = Instant::now();

        store.append_user(user(1), "hello", t0);
        let evicted = store.evict_idle(t0 + timeout, timeout);
        assert_eq!(evicted, vec![user(1)]);
    }

    #[test]
    fn test_activity_refresh_prevents_eviction() {
        let store = ConversationStore::new(10);
        let timeout = Duration::from_secs(600);
        let t0 = Instant::now();

        store.append_user(user(1), "hello", t0);
        store.append_user(user(1), "still here", t0 + Duration::from_secs(500));

        assert!(store
            .evict_idle(t0 + Duration::from_secs(700), timeout)
            .is_empty());
        assert_eq!(
            store.evict_idle(t0 + Duration::from_secs(1100), timeout),
            vec![user(1)]
        );
    }

    #[test]
    fn test_evict_idle_is_per_user() {
        let store = ConversationStore::new(10);
        let timeout = Duration::from_secs(600);
        let t0 = Instant::now();

        store.append_user(user(1), "old", t0);
        store.append_user(user(2), "fresh", t0 + Duration::from_secs(500));

        let evicted = store.evict_idle(t0 + Duration::from_secs(650), timeout);
        assert_eq!(evicted, vec![user(1)]);
        assert!(!store.snapshot(user(2)).is_empty());
    }
}

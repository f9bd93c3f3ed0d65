use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

/// Proof that the browser completed a login at the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    /// `sub` claim of the provider
    pub subject: String,
    pub name: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Value kept per browser session id. A missing entry means anonymous.
#[derive(Debug, Clone)]
pub enum SessionState {
    /// Redirect to the provider was issued, callback not seen yet
    Pending {
        csrf_state: String,
        pkce_verifier: String,
    },
    Authenticated(Session),
}

#[derive(Debug)]
struct Entry {
    state: SessionState,
    touched_at: DateTime<Utc>,
}

/// Process-wide map from browser session id to its state.
///
/// Entries untouched for longer than `ttl` are dropped, matching the lifetime of
/// the session cookie.
#[derive(Debug)]
pub struct SessionStore {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: TimeDelta,
}

impl SessionStore {
    pub fn new(ttl: TimeDelta) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        // entries are replaced whole, so a poisoned map is still consistent
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_stale(&self, entry: &Entry, now: DateTime<Utc>) -> bool {
        entry
            .touched_at
            .checked_add_signed(self.ttl)
            .is_some_and(|deadline| deadline <= now)
    }

    /// Current state of `sid`, refreshing its lifetime
    pub fn get(&self, sid: &str) -> Option<SessionState> {
        let now = Utc::now();
        let mut entries = self.lock();

        if self.is_stale(entries.get(sid)?, now) {
            entries.remove(sid);
            return None;
        }
        let entry = entries.get_mut(sid)?;
        entry.touched_at = now;
        Some(entry.state.clone())
    }

    pub fn put(&self, sid: &str, state: SessionState) {
        let now = Utc::now();
        let mut entries = self.lock();
        entries.retain(|_, entry| !self.is_stale(entry, now));
        entries.insert(
            sid.to_owned(),
            Entry {
                state,
                touched_at: now,
            },
        );
    }

    /// Stores `session` only if `sid` is still pending with `csrf_state`.
    ///
    /// Returns false when the login was abandoned, replaced or logged out meanwhile.
    pub fn promote(&self, sid: &str, csrf_state: &str, session: Session) -> bool {
        let now = Utc::now();
        let mut entries = self.lock();

        let Some(entry) = entries.get_mut(sid) else {
            return false;
        };
        let still_pending = !self.is_stale(entry, now)
            && matches!(
                &entry.state,
                SessionState::Pending { csrf_state: pending, .. } if pending == csrf_state
            );
        if !still_pending {
            return false;
        }

        entry.state = SessionState::Authenticated(session);
        entry.touched_at = now;
        true
    }

    /// Moves the state of `from` to `to`, leaving `from` anonymous
    pub fn rename(&self, from: &str, to: &str) -> bool {
        let mut entries = self.lock();
        match entries.remove(from) {
            Some(entry) => {
                entries.insert(to.to_owned(), entry);
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, sid: &str) -> Option<SessionState> {
        self.lock().remove(sid).map(|entry| entry.state)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(csrf_state: &str) -> SessionState {
        SessionState::Pending {
            csrf_state: csrf_state.into(),
            pkce_verifier: "verifier".into(),
        }
    }

    fn session(expires_at: Option<DateTime<Utc>>) -> Session {
        Session {
            subject: "auth0|42".into(),
            name: None,
            expires_at,
        }
    }

    #[test]
    fn test_session_expiry() {
        let now = Utc::now();

        assert!(!session(None).is_expired(now));
        assert!(!session(Some(now + TimeDelta::seconds(60))).is_expired(now));
        assert!(session(Some(now - TimeDelta::seconds(1))).is_expired(now));
    }

    #[test]
    fn test_store_put_get_remove() {
        let store = SessionStore::new(TimeDelta::hours(1));
        assert!(store.get("a").is_none());

        store.put("a", SessionState::Authenticated(session(None)));

        assert!(matches!(
            store.get("a"),
            Some(SessionState::Authenticated(_))
        ));
        assert!(store.get("b").is_none());
        assert!(store.remove("a").is_some());
        assert!(store.get("a").is_none());
    }

    #[test]
    fn test_promote_requires_matching_pending_state() {
        let store = SessionStore::new(TimeDelta::hours(1));

        // anonymous
        assert!(!store.promote("a", "s1", session(None)));
        assert!(store.get("a").is_none());

        store.put("a", pending("s1"));
        assert!(!store.promote("a", "other", session(None)));
        assert!(matches!(store.get("a"), Some(SessionState::Pending { .. })));

        assert!(store.promote("a", "s1", session(None)));
        assert!(matches!(
            store.get("a"),
            Some(SessionState::Authenticated(_))
        ));

        // already authenticated, the same state cannot be replayed
        assert!(!store.promote("a", "s1", session(None)));
    }

    #[test]
    fn test_rename_moves_state() {
        let store = SessionStore::new(TimeDelta::hours(1));
        store.put("old", SessionState::Authenticated(session(None)));

        assert!(store.rename("old", "new"));

        assert!(store.get("old").is_none());
        assert!(matches!(
            store.get("new"),
            Some(SessionState::Authenticated(_))
        ));
        assert!(!store.rename("missing", "other"));
    }

    fn backdate(store: &SessionStore, sid: &str, by: TimeDelta) {
        let mut entries = store.lock();
        let entry = entries.get_mut(sid).unwrap();
        entry.touched_at = entry.touched_at - by;
    }

    #[test]
    fn test_put_prunes_only_entries_older_than_ttl() {
        let store = SessionStore::new(TimeDelta::minutes(10));
        for i in 0..100 {
            store.put(&format!("anon-{i}"), pending("s"));
        }
        backdate(&store, "anon-0", TimeDelta::minutes(11));
        backdate(&store, "anon-1", TimeDelta::minutes(5));
        assert_eq!(store.len(), 100);

        store.put("fresh", pending("s"));

        assert_eq!(store.len(), 100);
        assert!(store.get("anon-0").is_none());
        assert!(store.get("anon-1").is_some());
    }

    #[test]
    fn test_put_evicts_stale_entries() {
        let store = SessionStore::new(TimeDelta::zero());
        for i in 0..10_000 {
            store.put(&format!("anon-{i}"), pending("s"));
        }

        // every earlier entry was stale by the time the next one was stored
        assert!(store.len() <= 1);
    }

    #[test]
    fn test_stale_entry_reads_as_anonymous() {
        let store = SessionStore::new(TimeDelta::zero());
        store.put("a", SessionState::Authenticated(session(None)));

        assert!(store.get("a").is_none());
        assert!(!store.promote("a", "s", session(None)));
    }
}

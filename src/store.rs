//! Session storage behind a narrow key-value interface.
//!
//! Sessions are ephemeral by design: they live for the process lifetime and
//! die with it. The trait keeps the surface small (get/put/delete plus an
//! in-place update) so a durable backing store could be substituted without
//! touching pipeline logic.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::ExamSession;

pub trait SessionStore: Send + Sync {
    fn get(&self, session_id: &str) -> Option<ExamSession>;
    fn put(&self, session: ExamSession);
    fn delete(&self, session_id: &str) -> bool;
    /// Apply a mutation to a stored session, if present. Returns the updated
    /// copy. A session is only ever written by its own student's in-flight
    /// request, so this lock is uncontended in practice.
    fn update(&self, session_id: &str, f: &mut dyn FnMut(&mut ExamSession)) -> Option<ExamSession>;
}

#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, ExamSession>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, session_id: &str) -> Option<ExamSession> {
        self.sessions.read().unwrap().get(session_id).cloned()
    }

    fn put(&self, session: ExamSession) {
        self.sessions.write().unwrap().insert(session.session_id.clone(), session);
    }

    fn delete(&self, session_id: &str) -> bool {
        self.sessions.write().unwrap().remove(session_id).is_some()
    }

    fn update(&self, session_id: &str, f: &mut dyn FnMut(&mut ExamSession)) -> Option<ExamSession> {
        let mut map = self.sessions.write().unwrap();
        let session = map.get_mut(session_id)?;
        f(session);
        Some(session.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn session(id: &str) -> ExamSession {
        ExamSession {
            session_id: id.into(),
            student_id: "s-1".into(),
            questions: vec![],
            responses: vec![],
            grades: vec![],
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    #[test]
    fn put_get_delete_roundtrip() {
        let store = MemoryStore::new();
        store.put(session("a"));
        assert!(store.get("a").is_some());
        assert!(store.get("b").is_none());
        assert!(store.delete("a"));
        assert!(!store.delete("a"));
    }

    #[test]
    fn update_mutates_in_place() {
        let store = MemoryStore::new();
        store.put(session("a"));
        let updated = store
            .update("a", &mut |s| s.completed_at = Some(Utc::now()))
            .unwrap();
        assert!(updated.completed_at.is_some());
        assert!(store.get("a").unwrap().completed_at.is_some());
        assert!(store.update("missing", &mut |_| {}).is_none());
    }
}

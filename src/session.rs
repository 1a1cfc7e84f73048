//! Session lifecycle and per-session conversational state.
//!
//! A session owns its chat history and references its document
//! collection in the process-wide [`VectorIndex`] by name. Sessions are
//! independent units of concurrency: mutations to one session never
//! contend with another. History and ingestion have independent
//! lifecycles — resetting a conversation does not touch the collection.
//!
//! Sessions and their collections are never evicted; lifetime is
//! unbounded until process shutdown. This is a known resource-management
//! gap, deliberately left open rather than guessing an eviction policy.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{EngineError, Result};
use crate::index::VectorIndex;
use crate::models::ChatTurn;

struct SessionState {
    collection: String,
    active_backend: Option<String>,
    history: Vec<ChatTurn>,
}

/// Owns the session map: creation, reset, and the mapping from session
/// to collection, active backend, and history.
pub struct ConversationManager {
    index: Arc<VectorIndex>,
    sessions: RwLock<HashMap<String, Arc<RwLock<SessionState>>>>,
}

impl ConversationManager {
    pub fn new(index: Arc<VectorIndex>) -> Self {
        Self {
            index,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    fn session(&self, session_id: &str) -> Result<Arc<RwLock<SessionState>>> {
        self.sessions
            .read()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))
    }

    /// Return the session's collection name, creating the session (with
    /// a fresh, empty collection and no explicit backend) on first
    /// contact. An existing session is returned unchanged.
    pub fn get_or_create(&self, session_id: &str) -> String {
        if let Ok(session) = self.session(session_id) {
            return session.read().unwrap().collection.clone();
        }

        let mut sessions = self.sessions.write().unwrap();
        // Double-checked under the write lock: another caller may have
        // created the session between our read and write.
        if let Some(session) = sessions.get(session_id) {
            return session.read().unwrap().collection.clone();
        }

        let collection = format!("session_{}", session_id);
        self.index.ensure_collection(&collection);
        sessions.insert(
            session_id.to_string(),
            Arc::new(RwLock::new(SessionState {
                collection: collection.clone(),
                active_backend: None,
                history: Vec::new(),
            })),
        );
        tracing::info!(session_id, collection, "created session");
        collection
    }

    /// Clear the session's history. The underlying collection is left
    /// intact — ingestion and conversation are independent lifecycles.
    pub fn reset(&self, session_id: &str) -> Result<()> {
        let session = self.session(session_id)?;
        session.write().unwrap().history.clear();
        tracing::info!(session_id, "conversation reset");
        Ok(())
    }

    /// Append a completed turn in call order. No size bound is imposed;
    /// callers wishing to bound prompt context must truncate themselves.
    pub fn append_turn(&self, session_id: &str, question: &str, answer: &str) -> Result<()> {
        let session = self.session(session_id)?;
        session.write().unwrap().history.push(ChatTurn {
            question: question.to_string(),
            answer: answer.to_string(),
        });
        Ok(())
    }

    /// Snapshot of the session's history.
    pub fn history(&self, session_id: &str) -> Result<Vec<ChatTurn>> {
        let session = self.session(session_id)?;
        let history = session.read().unwrap().history.clone();
        Ok(history)
    }

    /// The backend name the session explicitly switched to, if any.
    pub fn active_backend(&self, session_id: &str) -> Result<Option<String>> {
        let session = self.session(session_id)?;
        let name = session.read().unwrap().active_backend.clone();
        Ok(name)
    }

    /// Record the session's active backend. Validation of the name is
    /// the router's job; this only stores it.
    pub(crate) fn set_active_backend(&self, session_id: &str, name: &str) -> Result<()> {
        let session = self.session(session_id)?;
        session.write().unwrap().active_backend = Some(name.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> ConversationManager {
        ConversationManager::new(Arc::new(VectorIndex::new()))
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let m = manager();
        let first = m.get_or_create("s1");
        let second = m.get_or_create("s1");
        assert_eq!(first, second);
    }

    #[test]
    fn each_session_gets_its_own_collection() {
        let m = manager();
        assert_ne!(m.get_or_create("s1"), m.get_or_create("s2"));
    }

    #[test]
    fn reset_unknown_session_fails() {
        let m = manager();
        assert!(matches!(
            m.reset("never-seen"),
            Err(EngineError::SessionNotFound(_))
        ));
    }

    #[test]
    fn history_appends_in_call_order_and_reset_clears() {
        let m = manager();
        m.get_or_create("s1");
        m.append_turn("s1", "q1", "a1").unwrap();
        m.append_turn("s1", "q2", "a2").unwrap();

        let history = m.history("s1").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].question, "q1");
        assert_eq!(history[1].answer, "a2");

        m.reset("s1").unwrap();
        assert!(m.history("s1").unwrap().is_empty());
    }

    #[test]
    fn active_backend_defaults_to_none() {
        let m = manager();
        m.get_or_create("s1");
        assert_eq!(m.active_backend("s1").unwrap(), None);
        m.set_active_backend("s1", "ollama").unwrap();
        assert_eq!(m.active_backend("s1").unwrap().as_deref(), Some("ollama"));
    }
}

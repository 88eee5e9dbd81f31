//! Session persistence abstractions.
//!
//! The engine reads and writes whole session aggregates through the
//! `SessionRepository` trait; each mutating operation persists the full
//! aggregate, no partial or streaming writes. `InMemorySessionRepository`
//! backs tests and ephemeral deployments, `FsSessionRepository` stores one
//! JSON file per session.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::errors::EngineError;
use crate::session::Session;

pub mod fs;

pub use fs::FsSessionRepository;

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Finds a session by id. `Ok(None)` means the id is unknown; errors are
    /// reserved for storage failures.
    async fn find_by_id(&self, session_id: &str) -> Result<Option<Session>, EngineError>;

    /// Saves the full aggregate, replacing any previous record.
    async fn save(&self, session: &Session) -> Result<(), EngineError>;

    /// Deletes a session. Deleting an unknown id is not an error.
    async fn delete(&self, session_id: &str) -> Result<(), EngineError>;

    /// Lists all stored session ids.
    async fn list_ids(&self) -> Result<Vec<String>, EngineError>;
}

/// In-memory store keyed by session id.
#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<String, Session>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn find_by_id(&self, session_id: &str) -> Result<Option<Session>, EngineError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn save(&self, session: &Session) -> Result<(), EngineError> {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<(), EngineError> {
        self.sessions.write().await.remove(session_id);
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.sessions.read().await.keys().cloned().collect())
    }
}

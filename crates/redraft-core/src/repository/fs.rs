//! Filesystem-backed session store: one JSON file per session.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::errors::EngineError;
use crate::repository::SessionRepository;
use crate::session::Session;

/// Stores each session aggregate as `<dir>/<session-id>.json`.
///
/// Writes go through a temp file followed by a rename so a crash mid-write
/// never leaves a truncated record behind.
pub struct FsSessionRepository {
    dir: PathBuf,
}

impl FsSessionRepository {
    /// Opens (creating if needed) a session directory.
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            EngineError::StorageError(format!(
                "failed to create session directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(Self { dir })
    }

    fn session_path(&self, session_id: &str) -> Result<PathBuf, EngineError> {
        // Ids are engine-assigned UUIDs; reject anything that could escape
        // the session directory when handed a caller-supplied id.
        if session_id.is_empty()
            || !session_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(EngineError::InvalidInput(format!(
                "malformed session id: {:?}",
                session_id
            )));
        }
        Ok(self.dir.join(format!("{}.json", session_id)))
    }

    fn id_from_path(path: &Path) -> Option<String> {
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            return None;
        }
        path.file_stem()
            .and_then(|s| s.to_str())
            .map(|s| s.to_string())
    }
}

#[async_trait]
impl SessionRepository for FsSessionRepository {
    async fn find_by_id(&self, session_id: &str) -> Result<Option<Session>, EngineError> {
        let path = self.session_path(session_id)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(EngineError::StorageError(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        let session: Session = serde_json::from_slice(&bytes)?;
        Ok(Some(session))
    }

    async fn save(&self, session: &Session) -> Result<(), EngineError> {
        let path = self.session_path(&session.id)?;
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(session)?;

        tokio::fs::write(&tmp, &json).await.map_err(|e| {
            EngineError::StorageError(format!("failed to write {}: {}", tmp.display(), e))
        })?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| {
            EngineError::StorageError(format!("failed to rename {}: {}", tmp.display(), e))
        })?;
        log::debug!("persisted session {} ({} bytes)", session.id, json.len());
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<(), EngineError> {
        let path = self.session_path(session_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EngineError::StorageError(format!(
                "failed to delete {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn list_ids(&self) -> Result<Vec<String>, EngineError> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(|e| {
            EngineError::StorageError(format!(
                "failed to list session directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            EngineError::StorageError(format!("failed to iterate session directory: {}", e))
        })? {
            if let Some(id) = Self::id_from_path(&entry.path()) {
                ids.push(id);
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fs_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FsSessionRepository::new(dir.path()).await.unwrap();

        let mut session = Session::new("file-1", "draft", None).unwrap();
        session.apply_changes("edited", None).unwrap();
        repo.save(&session).await.unwrap();

        let loaded = repo.find_by_id(&session.id).await.unwrap().unwrap();
        assert_eq!(loaded.current_content, "edited");
        assert_eq!(loaded.versions.len(), 2);
        assert_eq!(loaded.versions, session.versions);

        let ids = repo.list_ids().await.unwrap();
        assert_eq!(ids, vec![session.id.clone()]);

        repo.delete(&session.id).await.unwrap();
        assert!(repo.find_by_id(&session.id).await.unwrap().is_none());
        assert!(repo.list_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_id_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FsSessionRepository::new(dir.path()).await.unwrap();
        let missing = repo
            .find_by_id("00000000-0000-0000-0000-000000000000")
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_malformed_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FsSessionRepository::new(dir.path()).await.unwrap();
        let err = repo.find_by_id("../escape").await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_save_overwrites_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FsSessionRepository::new(dir.path()).await.unwrap();

        let mut session = Session::new("file-1", "v0", None).unwrap();
        repo.save(&session).await.unwrap();
        session.apply_changes("v1", None).unwrap();
        repo.save(&session).await.unwrap();

        let loaded = repo.find_by_id(&session.id).await.unwrap().unwrap();
        assert_eq!(loaded.current_content, "v1");
        assert_eq!(repo.list_ids().await.unwrap().len(), 1);
    }
}

//! The editing session aggregate.
//!
//! A `Session` tracks one AI-assisted editing conversation for one piece of
//! content: the ordered conversation log, the append-only version history,
//! the at-most-one pending proposal, and the cumulative token usage. All
//! invariant enforcement lives here so that the engine and the repositories
//! can treat the aggregate as a unit; nothing outside this module mutates a
//! session's fields directly.
//!
//! Two invariants are load-bearing for everything else:
//!
//! - `versions` is never empty; index 0 is the content at creation and the
//!   history only ever grows. Revert appends a snapshot rather than
//!   truncating, so version indices held by a reader stay valid forever.
//! - once a session is `Completed`, every mutating method fails with
//!   `SessionClosed` without touching state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core_types::{Message, Role, Usage};
use crate::errors::EngineError;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    /// Terminal. No mutation is accepted afterwards.
    Completed,
}

/// A fully materialized recording of the content at one point in time.
///
/// Snapshots store whole content rather than diffs; revert correctness then
/// reduces to copying a string, at the cost of storage size.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct VersionSnapshot {
    pub content: String,
    pub description: String,
    /// Number of conversation messages at the time this version was created,
    /// correlating versions with conversation state.
    pub created_from_message_count: usize,
    pub timestamp: DateTime<Utc>,
}

/// An assistant-suggested content replacement awaiting explicit application
/// or discard. At most one is live per session; a newer proposal supersedes
/// an unapplied older one.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub new_content: String,
    pub explanations: Vec<String>,
    /// Index into the conversation of the assistant message that produced it.
    pub source_message_index: usize,
}

/// Version list entry without the content payload. History listings return
/// these; full content is fetched per index to keep list responses small.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VersionSummary {
    pub index: usize,
    pub description: String,
    pub created_from_message_count: usize,
    pub timestamp: DateTime<Utc>,
}

/// Terminal summary returned by [`Session::complete`].
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionSummary {
    pub session_id: String,
    pub final_content: String,
    pub version_count: usize,
    pub message_count: usize,
    pub user_message_count: usize,
    pub total_usage: Usage,
}

/// The aggregate root for one editing conversation.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Session {
    pub id: String,
    pub status: SessionStatus,
    /// Reference to the external artifact being edited. Immutable.
    pub subject_content_id: String,
    pub current_content: String,
    pub conversation: Vec<Message>,
    pub versions: Vec<VersionSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_proposal: Option<Proposal>,
    #[serde(default)]
    pub total_usage: Usage,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const INITIAL_VERSION_DESCRIPTION: &str = "Initial content";
pub const MANUAL_EDIT_DESCRIPTION: &str = "Manual edit";
pub const AI_SUGGESTION_DESCRIPTION: &str = "Applied AI suggestion";

impl Session {
    /// Creates a new active session seeded with the initial content as
    /// version 0, optionally with an opening user prompt.
    pub fn new(
        subject_content_id: impl Into<String>,
        initial_content: impl Into<String>,
        initial_prompt: Option<String>,
    ) -> Result<Self, EngineError> {
        let subject_content_id = subject_content_id.into();
        if subject_content_id.trim().is_empty() {
            return Err(EngineError::InvalidInput(
                "subject_content_id must not be empty".to_string(),
            ));
        }

        let initial_content = initial_content.into();
        let now = Utc::now();
        let conversation = match initial_prompt {
            Some(prompt) => vec![Message::user(prompt)],
            None => Vec::new(),
        };
        let message_count = conversation.len();

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            status: SessionStatus::Active,
            subject_content_id,
            current_content: initial_content.clone(),
            conversation,
            versions: vec![VersionSnapshot {
                content: initial_content,
                description: INITIAL_VERSION_DESCRIPTION.to_string(),
                created_from_message_count: message_count,
                timestamp: now,
            }],
            pending_proposal: None,
            total_usage: Usage::default(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Fails with `SessionClosed` unless the session is still active.
    pub fn ensure_active(&self) -> Result<(), EngineError> {
        match self.status {
            SessionStatus::Active => Ok(()),
            SessionStatus::Completed => Err(EngineError::SessionClosed(self.id.clone())),
        }
    }

    /// Appends a conversation turn and returns its index.
    pub fn append_message(&mut self, message: Message) -> Result<usize, EngineError> {
        self.ensure_active()?;
        self.conversation.push(message);
        self.touch();
        Ok(self.conversation.len() - 1)
    }

    /// Commits `new_content` as a new version snapshot and makes it current.
    ///
    /// This is the only path on which `versions` grows. Any pending proposal
    /// is cleared unconditionally: applying content supersedes whatever was
    /// awaiting a decision.
    pub fn apply_changes(
        &mut self,
        new_content: impl Into<String>,
        description: Option<String>,
    ) -> Result<&VersionSnapshot, EngineError> {
        self.ensure_active()?;
        let new_content = new_content.into();
        let description =
            description.unwrap_or_else(|| MANUAL_EDIT_DESCRIPTION.to_string());

        self.versions.push(VersionSnapshot {
            content: new_content.clone(),
            description,
            created_from_message_count: self.conversation.len(),
            timestamp: Utc::now(),
        });
        self.current_content = new_content;
        self.pending_proposal = None;
        self.touch();
        Ok(self.versions.last().unwrap())
    }

    /// Stores a proposal for later apply/discard, replacing any previous one.
    pub fn set_pending_proposal(&mut self, proposal: Proposal) -> Result<(), EngineError> {
        self.ensure_active()?;
        if self.pending_proposal.is_some() {
            log::debug!("session {}: superseding stale pending proposal", self.id);
        }
        self.pending_proposal = Some(proposal);
        self.touch();
        Ok(())
    }

    /// Clears the pending proposal. A second call is a no-op, not an error.
    pub fn discard_proposal(&mut self) -> Result<(), EngineError> {
        self.ensure_active()?;
        if self.pending_proposal.take().is_some() {
            self.touch();
        }
        Ok(())
    }

    /// Restores the content of `versions[index]` as current.
    ///
    /// Revert appends a fresh snapshot of the reverted-to content instead of
    /// truncating history, so the audit trail stays monotonic and revert is
    /// itself undoable by reverting again.
    pub fn revert_to_version(&mut self, index: usize) -> Result<&VersionSnapshot, EngineError> {
        self.ensure_active()?;
        if index >= self.versions.len() {
            return Err(EngineError::IndexOutOfRange {
                index,
                len: self.versions.len(),
            });
        }
        let content = self.versions[index].content.clone();
        self.apply_changes(content, Some(format!("Reverted to version {}", index)))
    }

    /// Adds a generation's reported cost to the monotonic session counter.
    pub fn record_usage(&mut self, usage: Usage) {
        self.total_usage.add(usage);
        self.touch();
    }

    /// Transitions the session to its terminal state and freezes
    /// `current_content` as the final output. Fails if already completed.
    pub fn complete(&mut self) -> Result<SessionSummary, EngineError> {
        self.ensure_active()?;
        self.status = SessionStatus::Completed;
        self.touch();
        Ok(self.summary())
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.id.clone(),
            final_content: self.current_content.clone(),
            version_count: self.versions.len(),
            message_count: self.conversation.len(),
            user_message_count: self.user_message_count(),
            total_usage: self.total_usage,
        }
    }

    /// Version history in creation order, without content payloads.
    pub fn version_summaries(&self) -> Vec<VersionSummary> {
        self.versions
            .iter()
            .enumerate()
            .map(|(index, v)| VersionSummary {
                index,
                description: v.description.clone(),
                created_from_message_count: v.created_from_message_count,
                timestamp: v.timestamp,
            })
            .collect()
    }

    /// Full content of one version, fetched individually.
    pub fn version_content(&self, index: usize) -> Result<&VersionSnapshot, EngineError> {
        self.versions.get(index).ok_or(EngineError::IndexOutOfRange {
            index,
            len: self.versions.len(),
        })
    }

    /// Count of user turns, surfaced in the completion summary.
    pub fn user_message_count(&self) -> usize {
        self.conversation
            .iter()
            .filter(|m| m.role == Role::User)
            .count()
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

//! Session orchestration and lifecycle management.
//!
//! `SessionEngine` owns the load → mutate → persist cycle for every
//! operation: it checks state-machine legality, invokes the completion
//! generator with a bounded timeout, runs the proposal evaluator over the
//! reply, and persists the whole aggregate after each mutation. Operations
//! against one session are serialized through a per-session lock arena;
//! operations on different sessions proceed fully in parallel.
//!
//! Durability rule for `send_message`: the user's message is persisted
//! before the generator is invoked, so a failed or timed-out generation
//! still leaves the turn recorded and the caller can simply resend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;

use crate::config::GeneratorConfig;
use crate::core_types::{Message, Usage};
use crate::errors::EngineError;
use crate::evaluator::ProposalEvaluator;
use crate::generator::{CompletionGenerator, GenerationContext, DEFAULT_SYSTEM_PROMPT};
use crate::repository::SessionRepository;
use crate::session::{
    Proposal, Session, SessionSummary, VersionSnapshot, VersionSummary, AI_SUGGESTION_DESCRIPTION,
};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bound on one generator invocation.
    pub generation_timeout: Duration,
    /// Trailing window of conversation messages handed to the generator.
    pub history_window: usize,
    pub system_prompt: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            generation_timeout: Duration::from_secs(60),
            history_window: 40,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl From<&GeneratorConfig> for EngineConfig {
    fn from(config: &GeneratorConfig) -> Self {
        Self {
            generation_timeout: Duration::from_secs(config.timeout_secs),
            history_window: config.history_window,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        }
    }
}

/// What `send_message` hands back to the caller.
#[derive(Debug, Clone)]
pub struct SendMessageOutcome {
    /// The assistant's raw reply text.
    pub reply: String,
    /// The reply with any proposal fence stripped, suitable for display
    /// next to a "review the suggested change" affordance.
    pub prose: String,
    /// The extracted proposal, pending or already applied.
    pub proposal: Option<Proposal>,
    /// True when the proposal was applied in the same turn.
    pub auto_applied: bool,
    pub total_usage: Usage,
}

/// Result of committing content into the version history.
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub version_count: usize,
    pub current_content: String,
}

pub struct SessionEngine {
    generator: Arc<dyn CompletionGenerator>,
    repository: Arc<dyn SessionRepository>,
    config: EngineConfig,
    // Lock arena keyed by session id. The outer mutex only guards the map;
    // the per-session async mutex is held for the duration of an operation.
    session_locks: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SessionEngine {
    pub fn new(
        generator: Arc<dyn CompletionGenerator>,
        repository: Arc<dyn SessionRepository>,
        config: EngineConfig,
    ) -> Self {
        Self {
            generator,
            repository,
            config,
            session_locks: StdMutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, session_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.session_locks.lock().expect("lock arena poisoned");
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    // Dropped once a session can no longer be mutated, so the arena does not
    // accumulate an entry per completed or deleted session.
    fn discard_lock(&self, session_id: &str) {
        self.session_locks
            .lock()
            .expect("lock arena poisoned")
            .remove(session_id);
    }

    async fn load(&self, session_id: &str) -> Result<Session, EngineError> {
        self.repository
            .find_by_id(session_id)
            .await?
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))
    }

    /// Creates and persists a new active session seeded with
    /// `initial_content` as version 0.
    pub async fn create_session(
        &self,
        subject_content_id: &str,
        initial_content: &str,
        initial_prompt: Option<String>,
    ) -> Result<Session, EngineError> {
        let session = Session::new(subject_content_id, initial_content, initial_prompt)?;
        self.repository.save(&session).await?;
        log::info!(
            "created session {} for subject {}",
            session.id,
            session.subject_content_id
        );
        Ok(session)
    }

    /// Loads the full session aggregate.
    pub async fn get_session(&self, session_id: &str) -> Result<Session, EngineError> {
        self.load(session_id).await
    }

    /// Records a user turn, generates the assistant's reply, and either
    /// applies or stores any proposal the reply carries.
    pub async fn send_message(
        &self,
        session_id: &str,
        text: &str,
        auto_apply: bool,
    ) -> Result<SendMessageOutcome, EngineError> {
        if text.trim().is_empty() {
            return Err(EngineError::InvalidInput(
                "message text must not be empty".to_string(),
            ));
        }

        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        let mut session = self.load(session_id).await?;
        session.ensure_active()?;

        // Record and persist the user turn before generating, so a failed
        // generation never loses what the user typed.
        session.append_message(Message::user(text))?;
        self.repository.save(&session).await?;

        let context = GenerationContext {
            history: self.windowed_history(&session),
            current_content: session.current_content.clone(),
            system_prompt: self.config.system_prompt.clone(),
        };

        let generation = match tokio::time::timeout(
            self.config.generation_timeout,
            self.generator.generate(context),
        )
        .await
        {
            Ok(Ok(generation)) => generation,
            Ok(Err(e)) => {
                log::warn!(
                    "generation failed for session {} (user message retained): {}",
                    session_id,
                    e
                );
                return Err(e);
            }
            Err(_) => {
                let timeout_secs = self.config.generation_timeout.as_secs();
                log::warn!(
                    "generation timed out after {}s for session {} (user message retained)",
                    timeout_secs,
                    session_id
                );
                return Err(EngineError::GenerationTimeout { timeout_secs });
            }
        };

        let assistant_index =
            session.append_message(Message::assistant(generation.reply.clone()))?;

        let proposal = ProposalEvaluator::evaluate(&generation.reply, assistant_index);
        let mut auto_applied = false;
        if let Some(ref proposal) = proposal {
            if auto_apply {
                session.apply_changes(
                    proposal.new_content.clone(),
                    Some(AI_SUGGESTION_DESCRIPTION.to_string()),
                )?;
                let version_index = session.versions.len() - 1;
                log::debug!(
                    "session {}: auto-applied proposal as version {} ({} chars)",
                    session_id,
                    version_index,
                    session.current_content.len()
                );
                auto_applied = true;
                if let Some(msg) = session.conversation.get_mut(assistant_index) {
                    msg.metadata
                        .insert("version_index".to_string(), version_index.to_string());
                }
            } else {
                session.set_pending_proposal(proposal.clone())?;
            }
        }

        if let Some(usage) = generation.usage {
            session.record_usage(usage);
        }

        self.repository.save(&session).await?;

        let prose = if proposal.is_some() {
            ProposalEvaluator::prose_without_proposal(&generation.reply)
        } else {
            generation.reply.clone()
        };

        Ok(SendMessageOutcome {
            reply: generation.reply,
            prose,
            proposal,
            auto_applied,
            total_usage: session.total_usage,
        })
    }

    /// Commits `new_content` as a new version and makes it current.
    pub async fn apply_changes(
        &self,
        session_id: &str,
        new_content: &str,
        description: Option<String>,
    ) -> Result<ApplyOutcome, EngineError> {
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        let mut session = self.load(session_id).await?;
        session.apply_changes(new_content, description)?;
        self.repository.save(&session).await?;
        Ok(ApplyOutcome {
            version_count: session.versions.len(),
            current_content: session.current_content,
        })
    }

    /// Drops the pending proposal, if any. Idempotent.
    pub async fn discard_proposal(&self, session_id: &str) -> Result<(), EngineError> {
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        let mut session = self.load(session_id).await?;
        session.discard_proposal()?;
        self.repository.save(&session).await?;
        Ok(())
    }

    /// Version summaries in creation order, content omitted.
    pub async fn get_version_history(
        &self,
        session_id: &str,
    ) -> Result<Vec<VersionSummary>, EngineError> {
        let session = self.load(session_id).await?;
        Ok(session.version_summaries())
    }

    /// Full snapshot of one version.
    pub async fn get_version_content(
        &self,
        session_id: &str,
        index: usize,
    ) -> Result<VersionSnapshot, EngineError> {
        let session = self.load(session_id).await?;
        Ok(session.version_content(index)?.clone())
    }

    /// Restores a prior version's content as current, recorded as a new
    /// appended version.
    pub async fn revert_to_version(
        &self,
        session_id: &str,
        index: usize,
    ) -> Result<ApplyOutcome, EngineError> {
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        let mut session = self.load(session_id).await?;
        session.revert_to_version(index)?;
        self.repository.save(&session).await?;
        Ok(ApplyOutcome {
            version_count: session.versions.len(),
            current_content: session.current_content,
        })
    }

    /// Terminal transition; freezes the current content as final output.
    pub async fn complete_session(
        &self,
        session_id: &str,
    ) -> Result<SessionSummary, EngineError> {
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        let mut session = self.load(session_id).await?;
        let summary = session.complete()?;
        self.repository.save(&session).await?;
        log::info!(
            "completed session {} ({} versions, {} messages)",
            session_id,
            summary.version_count,
            summary.message_count
        );
        drop(_guard);
        self.discard_lock(session_id);
        Ok(summary)
    }

    /// Removes the session record entirely.
    pub async fn delete_session(&self, session_id: &str) -> Result<(), EngineError> {
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        self.repository.delete(session_id).await?;
        drop(_guard);
        self.discard_lock(session_id);
        Ok(())
    }

    fn windowed_history(&self, session: &Session) -> Vec<Message> {
        let start = session
            .conversation
            .len()
            .saturating_sub(self.config.history_window);
        session.conversation[start..].to_vec()
    }
}

//! Core engine for session-based, AI-assisted content editing with
//! versioning.
//!
//! A user converses with an assistant to iteratively transform a piece of
//! content; each assistant turn may propose a new version, which the user
//! previews, applies, or discards. Applied versions form a linear,
//! append-only, revertible history, and token usage is tracked per session.
//!
//! # Architecture Overview
//!
//! - **Session aggregate**: conversation log, version history, pending
//!   proposal, and usage counter with all invariants enforced in one place
//! - **Session engine**: per-session serialized orchestration of the
//!   generate → evaluate → apply/hold → persist cycle
//! - **Completion generators**: provider-agnostic trait with an
//!   OpenAI-compatible HTTP implementation
//! - **Proposal evaluation**: structural extraction of proposed content from
//!   assistant replies, never prose heuristics
//! - **Repositories**: whole-aggregate persistence, in memory or one JSON
//!   file per session
//! - **Configuration**: YAML deployment config with env-var key indirection

pub mod config;
pub mod core_types;
pub mod engine;
pub mod errors;
pub mod evaluator;
pub mod generator;
pub mod repository;
pub mod session;

pub use config::{ConfigLoader, RedraftConfig};
pub use core_types::{Generation, Message, Role, Usage};
pub use engine::{ApplyOutcome, EngineConfig, SendMessageOutcome, SessionEngine};
pub use errors::EngineError;
pub use evaluator::ProposalEvaluator;
pub use generator::{CompletionGenerator, GenerationContext, OpenAiGenerator};
pub use repository::{FsSessionRepository, InMemorySessionRepository, SessionRepository};
pub use session::{Proposal, Session, SessionStatus, SessionSummary, VersionSnapshot, VersionSummary};

#[cfg(test)]
pub mod test_utils;

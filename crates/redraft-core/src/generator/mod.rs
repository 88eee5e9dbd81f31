//! Completion generator abstractions and integrations.
//!
//! Defines the `CompletionGenerator` trait the engine suspends on, and the
//! OpenAI-compatible HTTP provider. Generators are injected capabilities:
//! the engine never reaches for ambient state, which keeps it testable with
//! a deterministic scripted generator.

use async_trait::async_trait;

use crate::core_types::{Generation, Message};
use crate::errors::EngineError;

pub mod openai;

pub use openai::OpenAiGenerator;

/// Everything a generator is given for one turn: the (windowed) conversation
/// history, the current materialized content, and the system prompt framing
/// the editing task. The newest user message is the last history entry.
#[derive(Debug, Clone)]
pub struct GenerationContext {
    pub history: Vec<Message>,
    pub current_content: String,
    pub system_prompt: String,
}

/// Default instruction framing the proposal protocol for the generator.
/// Providers prepend this (or a caller override) as the system message.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an editing assistant. The user is iteratively \
revising a piece of content with your help. When you want to propose a replacement for the \
content, put the complete new content inside a fenced block that starts with a line containing \
only ```proposal and ends with a line containing only ```. After the block, you may add a \
'Changes:' section with '- ' bullet points summarizing what changed. If you are only answering \
a question, reply in prose without a proposal block.";

#[async_trait]
pub trait CompletionGenerator: Send + Sync {
    /// Produces the assistant's reply for one turn. This is the engine's
    /// single long-latency suspension point; implementations must be
    /// cancel-safe up to the HTTP call.
    async fn generate(&self, context: GenerationContext) -> Result<Generation, EngineError>;
}

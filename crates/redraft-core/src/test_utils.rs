//! Deterministic generator fakes for engine and server tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::core_types::Generation;
use crate::errors::EngineError;
use crate::generator::{CompletionGenerator, GenerationContext};

/// Replays a fixed script of generation outcomes and records every context
/// it was called with.
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<Generation, EngineError>>>,
    contexts: Mutex<Vec<GenerationContext>>,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<Result<Generation, EngineError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            contexts: Mutex::new(Vec::new()),
        }
    }

    /// Contexts seen so far, in call order.
    pub fn contexts(&self) -> Vec<GenerationContext> {
        self.contexts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionGenerator for ScriptedGenerator {
    async fn generate(&self, context: GenerationContext) -> Result<Generation, EngineError> {
        self.contexts.lock().unwrap().push(context);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(Generation {
                    reply: "ok".to_string(),
                    usage: None,
                })
            })
    }
}

/// Never resolves; exercises the engine's generation timeout.
pub struct PendingGenerator;

#[async_trait]
impl CompletionGenerator for PendingGenerator {
    async fn generate(&self, _context: GenerationContext) -> Result<Generation, EngineError> {
        std::future::pending().await
    }
}

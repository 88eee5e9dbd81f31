//! OpenAI-compatible chat completions provider.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::core_types::{Generation, Message, Role, Usage};
use crate::errors::EngineError;
use crate::generator::{CompletionGenerator, GenerationContext};

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    request_timeout: Option<Duration>,
}

impl OpenAiGenerator {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            api_base: DEFAULT_API_BASE.to_string(),
            model,
            temperature: None,
            max_tokens: None,
            request_timeout: None,
        }
    }

    pub fn with_api_base(mut self, api_base: String) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Sets a client-level request timeout. The engine applies its own
    /// overall bound as well; this one catches connect-level stalls.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Result<Self, EngineError> {
        self.client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::ConfigError(format!("HTTP client build failed: {}", e)))?;
        self.request_timeout = Some(timeout);
        Ok(self)
    }

    fn build_request_body(&self, context: &GenerationContext) -> Value {
        let mut messages = vec![json!({
            "role": "system",
            "content": context.system_prompt,
        })];
        // The current content rides along as a second system message so the
        // model always sees the exact text it is editing, even when the
        // history window has evicted the turn that introduced it.
        messages.push(json!({
            "role": "system",
            "content": format!("Current content:\n{}", context.current_content),
        }));
        for msg in &context.history {
            messages.push(json!({
                "role": Self::format_role(&msg.role),
                "content": msg.content,
            }));
        }

        let mut body = json!({
            "model": self.model,
            "messages": messages,
        });
        if let Some(temp) = self.temperature {
            body["temperature"] = temp.into();
        }
        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = max_tokens.into();
        }
        body
    }

    fn format_role(role: &Role) -> &'static str {
        match role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    fn parse_response(response: Value) -> Result<Generation, EngineError> {
        let choices = response["choices"].as_array().ok_or_else(|| {
            EngineError::GenerationFailed("no choices in completion response".to_string())
        })?;
        if choices.is_empty() {
            return Err(EngineError::GenerationFailed(
                "empty choices array".to_string(),
            ));
        }

        let reply = choices[0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| {
                EngineError::GenerationFailed("completion message has no content".to_string())
            })?;

        let usage = response.get("usage").map(|u| Usage {
            prompt_tokens: Self::token_count(u, "prompt_tokens"),
            completion_tokens: Self::token_count(u, "completion_tokens"),
            total_tokens: Self::token_count(u, "total_tokens"),
        });

        Ok(Generation { reply, usage })
    }

    // Saturates rather than truncates, so an absurd provider-reported count
    // can never wrap a session's monotonic usage counter.
    fn token_count(usage: &Value, field: &str) -> u32 {
        usage[field]
            .as_u64()
            .map_or(0, |n| u32::try_from(n).unwrap_or(u32::MAX))
    }
}

#[async_trait]
impl CompletionGenerator for OpenAiGenerator {
    async fn generate(&self, context: GenerationContext) -> Result<Generation, EngineError> {
        let url = format!("{}/chat/completions", self.api_base);
        let body = self.build_request_body(&context);

        log::debug!(
            "completion request to {} with {} history messages",
            url,
            context.history.len()
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EngineError::GenerationTimeout {
                        timeout_secs: self.request_timeout.map(|t| t.as_secs()).unwrap_or(0),
                    }
                } else {
                    EngineError::GenerationFailed(format!("HTTP request failed: {}", e))
                }
            })?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| EngineError::GenerationFailed(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            log::error!("completion API returned {}: {}", status, response_text);
            return Err(EngineError::GenerationFailed(format!(
                "API request failed with status {}: {}",
                status, response_text
            )));
        }

        let response_json: Value = serde_json::from_str(&response_text).map_err(|e| {
            EngineError::GenerationFailed(format!("invalid JSON response: {}", e))
        })?;

        Self::parse_response(response_json)
    }
}

/// Builds a generator from configuration, resolving the API key through the
/// configured environment variable when no literal key is given.
pub fn create_generator(
    config: &crate::config::GeneratorConfig,
) -> Result<std::sync::Arc<dyn CompletionGenerator>, EngineError> {
    let api_key = config
        .api_key
        .clone()
        .or_else(|| {
            config
                .api_key_env
                .as_ref()
                .and_then(|env_var| std::env::var(env_var).ok())
        })
        .ok_or_else(|| {
            EngineError::ConfigError(
                "no API key found for completion generator; set api_key or api_key_env"
                    .to_string(),
            )
        })?;

    let mut generator = OpenAiGenerator::new(api_key, config.model.clone());
    if let Some(ref base) = config.api_base {
        generator = generator.with_api_base(base.clone());
    }
    if let Some(temp) = config.temperature {
        generator = generator.with_temperature(temp);
    }
    if let Some(max_tokens) = config.max_tokens {
        generator = generator.with_max_tokens(max_tokens);
    }
    generator = generator.with_request_timeout(Duration::from_secs(config.timeout_secs))?;

    Ok(std::sync::Arc::new(generator))
}

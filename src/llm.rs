//! Text generation collaborator.
//!
//! Everything that needs free-text generation (answers, generative bridges)
//! goes through the [`TextGenerator`] trait so the orchestrator can be tested
//! without network access and failures carry a uniform error kind.

use crate::error::{Result, SvarError};
use crate::openai::create_client;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use tracing::{debug, instrument};

/// Trait for LLM-backed text generation.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate text from a system prompt and a user prompt.
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

/// OpenAI chat-completions text generator.
pub struct OpenAiGenerator {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    max_tokens: u32,
}

impl OpenAiGenerator {
    /// Create a generator for the given model with a response-size cap.
    pub fn new(model: &str, max_tokens: u32) -> Self {
        Self {
            client: create_client(),
            model: model.to_string(),
            max_tokens,
        }
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system_prompt)
                .build()
                .map_err(|e| SvarError::Generation(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user_prompt)
                .build()
                .map_err(|e| SvarError::Generation(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(0.7)
            .max_tokens(self.max_tokens)
            .build()
            .map_err(|e| SvarError::Generation(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| SvarError::OpenAI(format!("Chat completion failed: {}", e)))?;

        let text = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .ok_or_else(|| SvarError::Generation("Empty response from LLM".to_string()))?
            .clone();

        debug!("Generated {} chars", text.len());
        Ok(text)
    }
}

//! OpenAI chat completion provider (`/v1/chat/completions`).
//!
//! Stateless: every call carries the full message list. Constructed once at
//! startup, then cheaply cloned because `reqwest::Client` is an `Arc`
//! internally.

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, error};

use super::wire::{ChatCompletionRequest, ChatCompletionResponse, check_status};
use crate::config::OpenAiConfig;
use crate::llm::{ChatMessage, CompletionOptions, LlmResponse, ProviderError};

#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: Client,
    endpoint: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    api_key: String,
}

impl OpenAiProvider {
    pub fn new(config: &OpenAiConfig, api_key: String, timeout_seconds: u64) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.api_base_url),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            api_key,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        options: CompletionOptions,
    ) -> Result<LlmResponse, ProviderError> {
        // gpt-5 family models reject an explicit temperature.
        let temperature = if self.model.starts_with("gpt-5") {
            None
        } else {
            Some(options.temperature.unwrap_or(self.temperature))
        };
        let payload = ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature,
            max_tokens: options.max_tokens.unwrap_or(self.max_tokens),
        };

        debug!(model = %self.model, messages = messages.len(), "sending OpenAI request");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!(url = %self.endpoint, error = %e, "OpenAI request failed (transport)");
                ProviderError::Request(e.to_string())
            })?;

        let response = check_status(response).await?;
        let parsed = response.json::<ChatCompletionResponse>().await.map_err(|e| {
            error!(error = %e, "failed to deserialize OpenAI response");
            ProviderError::Request(format!("failed to parse response body: {e}"))
        })?;

        let out = parsed.into_response(&self.model)?;
        debug!(tokens = ?out.tokens_used, "received OpenAI response");
        Ok(out)
    }
}

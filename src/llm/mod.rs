//! AI provider abstraction.
//!
//! `LlmProvider` is an enum over concrete provider implementations.
//! Add a new variant + module in `providers/` for each additional backend.
//!
//! Provider instances are shared immutable capabilities; clone them freely.
//! Multi-provider fallback lives in [`router`], the stateful OpenAI
//! Assistants flow in [`assistant`].

pub mod assistant;
pub mod prompts;
pub mod providers;
pub mod router;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::MessageRole;

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("missing credentials for {0}")]
    MissingCredentials(String),
    #[error("provider request failed: {0}")]
    Request(String),
    #[error("provider authentication failed: {0}")]
    Auth(String),
    #[error("no AI providers configured")]
    NoProviders,
    #[error("assistant error: {0}")]
    Assistant(String),
}

// ── Shared types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    GigaChat,
    Dummy,
}

impl ProviderKind {
    /// Order tried after the preferred provider fails.
    pub const FALLBACK_ORDER: [ProviderKind; 3] =
        [ProviderKind::OpenAi, ProviderKind::GigaChat, ProviderKind::Dummy];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::GigaChat => "gigachat",
            ProviderKind::Dummy => "dummy",
        }
    }

    /// Name shown to people in chat menus.
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OpenAI",
            ProviderKind::GigaChat => "GigaChat",
            ProviderKind::Dummy => "Dummy",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "gigachat" => Ok(ProviderKind::GigaChat),
            "dummy" => Ok(ProviderKind::Dummy),
            other => Err(ProviderError::UnknownProvider(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: MessageRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: MessageRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: MessageRole::Assistant, content: content.into() }
    }
}

/// Per-call overrides; `None` falls back to the provider's configured value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CompletionOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionOptions {
    pub fn max_tokens(n: u32) -> Self {
        Self { max_tokens: Some(n), ..Self::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub tokens_used: Option<i64>,
    pub finish_reason: Option<String>,
}

// ── Provider enum ─────────────────────────────────────────────────────────────

/// All available provider backends.
///
/// Enum dispatch avoids `dyn` trait objects and the `async-trait` dependency.
/// Adding a backend = new module + new variant + new match arms.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    OpenAi(providers::openai::OpenAiProvider),
    GigaChat(providers::gigachat::GigaChatProvider),
    Dummy(providers::dummy::DummyProvider),
}

impl LlmProvider {
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        options: CompletionOptions,
    ) -> Result<LlmResponse, ProviderError> {
        match self {
            LlmProvider::OpenAi(p) => p.chat(messages, options).await,
            LlmProvider::GigaChat(p) => p.chat(messages, options).await,
            LlmProvider::Dummy(p) => p.chat(messages, options).await,
        }
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            LlmProvider::OpenAi(_) => ProviderKind::OpenAi,
            LlmProvider::GigaChat(_) => ProviderKind::GigaChat,
            LlmProvider::Dummy(_) => ProviderKind::Dummy,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            LlmProvider::OpenAi(p) => p.model(),
            LlmProvider::GigaChat(p) => p.model(),
            LlmProvider::Dummy(_) => providers::dummy::MODEL,
        }
    }

    /// One tiny round-trip to prove the credentials and endpoint work.
    pub async fn check_connection(&self) -> Result<(), ProviderError> {
        let probe = [ChatMessage::user("test")];
        self.chat(&probe, CompletionOptions::max_tokens(5)).await.map(|_| ())
    }
}

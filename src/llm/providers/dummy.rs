//! Dummy provider: echoes the last user message back prefixed with `[echo]`.
//! Used when no provider keys are configured and throughout the tests.

use crate::llm::{ChatMessage, CompletionOptions, LlmResponse, ProviderError};
use crate::storage::MessageRole;

pub const MODEL: &str = "dummy-echo";

#[derive(Debug, Clone)]
pub struct DummyProvider;

impl DummyProvider {
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        _options: CompletionOptions,
    ) -> Result<LlmResponse, ProviderError> {
        let last = messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        Ok(LlmResponse {
            content: format!("[echo] {last}"),
            model: MODEL.to_string(),
            tokens_used: Some(0),
            finish_reason: Some("stop".into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echoes_last_user_message() {
        let msgs = [
            ChatMessage::system("sys"),
            ChatMessage::user("first"),
            ChatMessage::assistant("reply"),
            ChatMessage::user("hello"),
        ];
        let r = DummyProvider.chat(&msgs, CompletionOptions::default()).await.unwrap();
        assert_eq!(r.content, "[echo] hello");
        assert_eq!(r.model, MODEL);
    }

    #[tokio::test]
    async fn empty_history() {
        let r = DummyProvider.chat(&[], CompletionOptions::default()).await.unwrap();
        assert_eq!(r.content, "[echo] ");
    }
}

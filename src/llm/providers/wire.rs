//! Chat-completions wire format shared by the OpenAI and GigaChat backends.
//! Only `check_status` is used outside `providers`, by the assistant client.

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::llm::{ChatMessage, LlmResponse, ProviderError};

#[derive(Debug, Serialize)]
pub(super) struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    pub max_tokens: u32,
}

#[derive(Debug, Deserialize)]
pub(super) struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: i64,
}

impl ChatCompletionResponse {
    /// First choice's text; empty content is an error.
    pub fn into_response(self, fallback_model: &str) -> Result<LlmResponse, ProviderError> {
        let model = self.model.unwrap_or_else(|| fallback_model.to_string());
        let tokens_used = self.usage.map(|u| u.total_tokens);
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Request("response has no choices".into()))?;
        let content = choice
            .message
            .content
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ProviderError::Request("empty or missing content in response".into()))?;
        Ok(LlmResponse { content, model, tokens_used, finish_reason: choice.finish_reason })
    }
}

// Error envelope used by OpenAI and compatible APIs.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

/// Consume the response and return it if successful, or a structured error.
/// 401/403 map to [`ProviderError::Auth`].
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());

    let message = if let Ok(env) = serde_json::from_str::<ErrorEnvelope>(&body) {
        let code = env
            .error
            .code
            .map(|v| match v {
                serde_json::Value::String(s) => format!(" [code={s}]"),
                other => format!(" [code={other}]"),
            })
            .unwrap_or_default();
        format!("HTTP {status}{code}: {}", env.error.message)
    } else {
        format!("HTTP {status}: {body}")
    };

    error!(%status, %message, "provider returned HTTP error");
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        Err(ProviderError::Auth(message))
    } else {
        Err(ProviderError::Request(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_first_choice() {
        let raw = r#"{"model":"gpt-4o-mini-2024","choices":[{"message":{"content":"  ответ  "},"finish_reason":"stop"}],"usage":{"total_tokens":42}}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        let r = parsed.into_response("gpt-4o-mini").unwrap();
        assert_eq!(r.content, "ответ");
        assert_eq!(r.model, "gpt-4o-mini-2024");
        assert_eq!(r.tokens_used, Some(42));
        assert_eq!(r.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn missing_content_is_error() {
        let parsed: ChatCompletionResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":""}}]}"#).unwrap();
        assert!(parsed.into_response("m").is_err());
        let parsed: ChatCompletionResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(parsed.into_response("m").is_err());
    }

    #[test]
    fn request_skips_absent_temperature() {
        let msgs = [ChatMessage::user("hi")];
        let req = ChatCompletionRequest { model: "m", messages: &msgs, temperature: None, max_tokens: 5 };
        let v = serde_json::to_value(&req).unwrap();
        assert!(v.get("temperature").is_none());
        assert_eq!(v["messages"][0]["role"], "user");
        assert_eq!(v["max_tokens"], 5);
    }
}

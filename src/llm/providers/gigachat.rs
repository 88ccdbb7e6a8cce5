//! GigaChat provider.
//!
//! Chat requests use the OpenAI-shaped `/chat/completions` endpoint with a
//! short-lived bearer token obtained through the OAuth endpoint. The token is
//! cached per provider (shared across clones) and refreshed a minute before
//! it expires. Refreshes are serialized by the cache mutex.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::wire::{ChatCompletionRequest, ChatCompletionResponse, check_status};
use crate::config::GigaChatConfig;
use crate::llm::{ChatMessage, CompletionOptions, LlmResponse, ProviderError};

/// Token lifetime assumed when the OAuth reply has no `expires_at`.
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(1800);
const REFRESH_MARGIN: Duration = Duration::from_secs(60);
/// `expires_at` values above this are milliseconds.
const MILLIS_THRESHOLD: u64 = 10_000_000_000;

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    valid_until: SystemTime,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_at: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct GigaChatProvider {
    client: Client,
    auth_url: String,
    endpoint: String,
    scope: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    client_id: String,
    client_secret: String,
    token: Arc<Mutex<Option<CachedToken>>>,
}

impl GigaChatProvider {
    /// `api_key` is `client_id:client_secret`; a key without `:` is taken as
    /// the client id with an empty secret.
    pub fn new(config: &GigaChatConfig, api_key: &str, timeout_seconds: u64) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))?;

        let (client_id, client_secret) = split_key(api_key);
        info!(model = %config.model, "GigaChat provider initialized");

        Ok(Self {
            client,
            auth_url: config.auth_url.clone(),
            endpoint: format!("{}/chat/completions", config.api_base_url),
            scope: config.scope.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            client_id,
            client_secret,
            token: Arc::new(Mutex::new(None)),
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
        let token = self.access_token().await?;
        let payload = ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: Some(options.temperature.unwrap_or(self.temperature)),
            max_tokens: options.max_tokens.unwrap_or(self.max_tokens),
        };

        debug!(model = %self.model, messages = messages.len(), "sending GigaChat request");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&token)
            .header("Accept", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!(url = %self.endpoint, error = %e, "GigaChat request failed (transport)");
                ProviderError::Request(e.to_string())
            })?;

        let response = check_status(response).await?;
        let parsed = response.json::<ChatCompletionResponse>().await.map_err(|e| {
            error!(error = %e, "failed to deserialize GigaChat response");
            ProviderError::Request(format!("failed to parse response body: {e}"))
        })?;
        parsed.into_response(&self.model)
    }

    /// Cached token, refreshed through OAuth when missing or about to expire.
    async fn access_token(&self) -> Result<String, ProviderError> {
        let mut cache = self.token.lock().await;
        if let Some(t) = cache.as_ref().filter(|t| SystemTime::now() < t.valid_until) {
            debug!("reusing cached GigaChat token");
            return Ok(t.value.clone());
        }

        info!("refreshing GigaChat token");
        let credentials = STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret));
        let response = self
            .client
            .post(&self.auth_url)
            .header("Authorization", format!("Basic {credentials}"))
            .header("RqUID", Uuid::new_v4().to_string())
            .header("Accept", "application/json")
            .form(&[("scope", self.scope.as_str())])
            .send()
            .await
            .map_err(|e| ProviderError::Auth(format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, %body, "GigaChat token request rejected");
            return Err(ProviderError::Auth(format!("token request returned HTTP {status}")));
        }
        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Auth(format!("failed to parse token response: {e}")))?;

        let valid_until = token_valid_until(parsed.expires_at, SystemTime::now());
        *cache = Some(CachedToken { value: parsed.access_token.clone(), valid_until });
        Ok(parsed.access_token)
    }
}

fn split_key(api_key: &str) -> (String, String) {
    match api_key.split_once(':') {
        Some((id, secret)) => (id.to_string(), secret.to_string()),
        None => (api_key.to_string(), String::new()),
    }
}

fn token_valid_until(expires_at: Option<u64>, now: SystemTime) -> SystemTime {
    match expires_at {
        Some(raw) => {
            let secs = if raw > MILLIS_THRESHOLD { raw / 1000 } else { raw };
            (UNIX_EPOCH + Duration::from_secs(secs))
                .checked_sub(REFRESH_MARGIN)
                .unwrap_or(UNIX_EPOCH)
        }
        None => now + DEFAULT_TOKEN_TTL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_without_colon_is_client_id() {
        assert_eq!(split_key("abc:def:ghi"), ("abc".into(), "def:ghi".into()));
        assert_eq!(split_key("onlyid"), ("onlyid".into(), String::new()));
    }

    #[test]
    fn expiry_handles_millis_and_seconds() {
        let now = SystemTime::now();
        let secs = 1_760_000_000u64;
        let expected = UNIX_EPOCH + Duration::from_secs(secs - 60);
        assert_eq!(token_valid_until(Some(secs), now), expected);
        assert_eq!(token_valid_until(Some(secs * 1000), now), expected);
        assert_eq!(token_valid_until(None, now), now + Duration::from_secs(1800));
    }
}

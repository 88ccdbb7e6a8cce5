//! OpenAI Assistants API client (the "neuro-assistant" mode).
//!
//! Unlike chat completions, the assistant keeps conversation state remotely
//! in a thread. Each user gets one thread whose id is persisted on their
//! profile; the assistant id itself is persisted in system settings so a
//! restart reuses the same assistant.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::ProviderError;
use super::prompts;
use super::providers::wire::check_status;
use crate::config::AssistantConfig;

const BETA_HEADER: (&str, &str) = ("OpenAI-Beta", "assistants=v2");

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssistantReply {
    pub content: String,
    pub model: String,
    pub assistant_id: String,
    pub thread_id: String,
    pub run_id: String,
    pub tokens_used: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssistantInfo {
    pub id: String,
    pub name: Option<String>,
    pub model: String,
    pub instructions: Option<String>,
    pub tools: Vec<String>,
}

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct IdOnly {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AssistantObject {
    id: String,
    #[serde(default)]
    name: Option<String>,
    model: String,
    #[serde(default)]
    instructions: Option<String>,
    #[serde(default)]
    tools: Vec<ToolObject>,
}

#[derive(Debug, Deserialize)]
struct ToolObject {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct RunObject {
    id: String,
    status: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<RunUsage>,
}

#[derive(Debug, Deserialize)]
struct RunUsage {
    #[serde(default)]
    total_tokens: i64,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    data: Vec<MessageObject>,
}

#[derive(Debug, Deserialize)]
struct MessageObject {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<TextBlock>,
}

#[derive(Debug, Deserialize)]
struct TextBlock {
    value: String,
}

impl MessageObject {
    /// Concatenated text parts; image and file blocks are ignored.
    fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| b.text.as_ref())
            .map(|t| t.value.as_str())
            .collect()
    }
}

fn is_pending(status: &str) -> bool {
    matches!(status, "queued" | "in_progress")
}

// ── Client ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AssistantClient {
    client: Client,
    base_url: String,
    api_key: String,
    name: String,
    model: String,
    poll_interval: Duration,
    max_wait: Duration,
    assistant_id: Arc<RwLock<Option<String>>>,
}

impl AssistantClient {
    pub fn new(config: &AssistantConfig, api_key: String, timeout_seconds: u64) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| ProviderError::Assistant(format!("failed to build HTTP client: {e}")))?;
        info!(model = %config.model, "assistant client initialized");
        Ok(Self {
            client,
            base_url: config.api_base_url.clone(),
            api_key,
            name: config.name.clone(),
            model: config.model.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_wait: Duration::from_secs(config.max_wait_seconds),
            assistant_id: Arc::new(RwLock::new(None)),
        })
    }

    /// The assistant id in use, once [`ensure_assistant`](Self::ensure_assistant) succeeded.
    pub async fn assistant_id(&self) -> Option<String> {
        self.assistant_id.read().await.clone()
    }

    pub async fn create_assistant(&self) -> Result<String, ProviderError> {
        info!(name = %self.name, "creating assistant");
        let body = json!({
            "name": self.name,
            "instructions": prompts::assistant_instructions(),
            "model": self.model,
            "tools": [{ "type": "file_search" }],
        });
        let created: IdOnly = self.send(self.post("/assistants").json(&body)).await?;
        *self.assistant_id.write().await = Some(created.id.clone());
        info!(assistant_id = %created.id, "assistant created");
        Ok(created.id)
    }

    pub async fn retrieve_assistant(&self, id: &str) -> Result<AssistantInfo, ProviderError> {
        let a: AssistantObject = self.send(self.get(&format!("/assistants/{id}"))).await?;
        Ok(AssistantInfo {
            id: a.id,
            name: a.name,
            model: a.model,
            instructions: a.instructions,
            tools: a.tools.into_iter().map(|t| t.kind).collect(),
        })
    }

    /// Reuse `stored_id` when it still exists remotely, otherwise create a
    /// new assistant. Returns the id now in use.
    pub async fn ensure_assistant(&self, stored_id: Option<&str>) -> Result<String, ProviderError> {
        if let Some(current) = self.assistant_id().await {
            if stored_id.is_none_or(|s| s == current) {
                return Ok(current);
            }
        }
        if let Some(id) = stored_id {
            match self.retrieve_assistant(id).await {
                Ok(info) => {
                    info!(assistant_id = %info.id, "using existing assistant");
                    *self.assistant_id.write().await = Some(info.id.clone());
                    return Ok(info.id);
                }
                Err(e) => warn!(assistant_id = %id, error = %e, "stored assistant not found, creating a new one"),
            }
        }
        self.create_assistant().await
    }

    pub async fn create_thread(&self) -> Result<String, ProviderError> {
        let thread: IdOnly = self.send(self.post("/threads").json(&json!({}))).await?;
        debug!(thread_id = %thread.id, "thread created");
        Ok(thread.id)
    }

    pub async fn add_message(&self, thread_id: &str, content: &str) -> Result<String, ProviderError> {
        let body = json!({ "role": "user", "content": content });
        let msg: IdOnly = self
            .send(self.post(&format!("/threads/{thread_id}/messages")).json(&body))
            .await?;
        Ok(msg.id)
    }

    /// Best effort: a failure is logged and reported as `false`.
    pub async fn delete_thread(&self, thread_id: &str) -> bool {
        let req = self.request(reqwest::Method::DELETE, &format!("/threads/{thread_id}"));
        match self.send::<serde_json::Value>(req).await {
            Ok(_) => {
                debug!(%thread_id, "thread deleted");
                true
            }
            Err(e) => {
                warn!(%thread_id, error = %e, "thread deletion failed");
                false
            }
        }
    }

    /// Start a run on `thread_id`, wait for it, and return the newest message.
    pub async fn run(&self, thread_id: &str) -> Result<AssistantReply, ProviderError> {
        let assistant_id = self
            .assistant_id()
            .await
            .ok_or_else(|| ProviderError::Assistant("assistant id not set".into()))?;

        debug!(%assistant_id, %thread_id, "starting assistant run");
        let mut run: RunObject = self
            .send(
                self.post(&format!("/threads/{thread_id}/runs"))
                    .json(&json!({ "assistant_id": assistant_id })),
            )
            .await?;

        let started = Instant::now();
        while is_pending(&run.status) {
            if started.elapsed() >= self.max_wait {
                return Err(ProviderError::Assistant(format!(
                    "run {} still {} after {}s",
                    run.id,
                    run.status,
                    self.max_wait.as_secs()
                )));
            }
            tokio::time::sleep(self.poll_interval).await;
            run = self.send(self.get(&format!("/threads/{thread_id}/runs/{}", run.id))).await?;
        }

        if run.status != "completed" {
            return Err(ProviderError::Assistant(format!("run finished with status {}", run.status)));
        }

        let list: MessageList = self
            .send(self.get(&format!("/threads/{thread_id}/messages?order=desc&limit=1")))
            .await?;
        let content = list
            .data
            .first()
            .map(MessageObject::text)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ProviderError::Assistant("no reply message in thread".into()))?;

        let reply = AssistantReply {
            content,
            model: run.model.unwrap_or_else(|| self.model.clone()),
            assistant_id,
            thread_id: thread_id.to_string(),
            run_id: run.id,
            tokens_used: run.usage.map(|u| u.total_tokens),
        };
        debug!(tokens = ?reply.tokens_used, "assistant replied");
        Ok(reply)
    }

    /// Ask on an existing thread, or on a fresh one when `thread_id` is `None`.
    pub async fn ask(&self, question: &str, thread_id: Option<&str>) -> Result<AssistantReply, ProviderError> {
        let thread_id = match thread_id {
            Some(t) => t.to_string(),
            None => self.create_thread().await?,
        };
        self.add_message(&thread_id, question).await?;
        self.run(&thread_id).await
    }

    pub async fn info(&self) -> Result<AssistantInfo, ProviderError> {
        let id = self
            .assistant_id()
            .await
            .ok_or_else(|| ProviderError::Assistant("assistant id not set".into()))?;
        self.retrieve_assistant(&id).await
    }

    // ── HTTP plumbing ────────────────────────────────────────────────────────

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(&self.api_key)
            .header(BETA_HEADER.0, BETA_HEADER.1)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.request(reqwest::Method::GET, path)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.request(reqwest::Method::POST, path)
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ProviderError> {
        let resp = req
            .send()
            .await
            .map_err(|e| ProviderError::Assistant(format!("request failed: {e}")))?;
        let resp = check_status(resp)
            .await
            .map_err(|e| ProviderError::Assistant(e.to_string()))?;
        resp.json::<T>()
            .await
            .map_err(|e| ProviderError::Assistant(format!("failed to parse response body: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_text_concatenates_text_blocks() {
        let raw = r#"{"data":[{"content":[
            {"type":"text","text":{"value":"Часть 1. ","annotations":[]}},
            {"type":"image_file","image_file":{"file_id":"f"}},
            {"type":"text","text":{"value":"Часть 2."}}
        ]}]}"#;
        let list: MessageList = serde_json::from_str(raw).unwrap();
        assert_eq!(list.data[0].text(), "Часть 1. Часть 2.");
    }

    #[test]
    fn pending_statuses() {
        assert!(is_pending("queued"));
        assert!(is_pending("in_progress"));
        assert!(!is_pending("completed"));
        assert!(!is_pending("requires_action"));
    }

    #[test]
    fn assistant_object_tools() {
        let raw = r#"{"id":"asst_1","name":"OT","model":"gpt-4o","tools":[{"type":"file_search"}]}"#;
        let a: AssistantObject = serde_json::from_str(raw).unwrap();
        assert_eq!(a.tools[0].kind, "file_search");
        assert!(a.instructions.is_none());
    }

    #[tokio::test]
    async fn run_without_assistant_id_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let cfg = crate::config::Config::test_default(dir.path());
        let client = AssistantClient::new(&cfg.assistant, "sk".into(), 1).unwrap();
        let err = client.run("thread_x").await.unwrap_err();
        assert!(err.to_string().contains("assistant id not set"));
        assert!(client.info().await.is_err());
    }
}

//! Health registry for the bot's moving parts.
//!
//! Components write their own state when it changes: the channels when they
//! come up or fail, the [`HealthProbe`](super::probe::HealthProbe) after each
//! storage, knowledge-base and provider check. Readers (`GET /api/health`,
//! the admin menu) only see cached state, so a health request never waits on
//! a provider.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Well-known component ids.
pub mod ids {
    pub const STORAGE: &str = "storage";
    pub const KNOWLEDGE: &str = "knowledge";
    pub const PROVIDERS: &str = "providers";
    pub const TELEGRAM: &str = "telegram";
    pub const ADMIN: &str = "admin";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub id: String,
    pub healthy: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// RFC 3339 time of the last write.
    pub updated_at: String,
}

impl ComponentHealth {
    fn new(id: &str, healthy: bool, message: String, details: Option<serde_json::Value>) -> Self {
        Self {
            id: id.to_string(),
            healthy,
            message,
            details,
            updated_at: crate::storage::now_iso8601(),
        }
    }
}

/// Body of `GET /api/health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub status: &'static str,
    pub components: Vec<ComponentHealth>,
}

#[derive(Clone, Default)]
pub struct HealthRegistry {
    inner: Arc<RwLock<HashMap<String, ComponentHealth>>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reporter(&self, id: impl Into<String>) -> HealthReporter {
        HealthReporter { id: id.into(), registry: self.clone() }
    }

    /// All states, sorted by id.
    pub async fn snapshot(&self) -> Vec<ComponentHealth> {
        let map = self.inner.read().await;
        let mut v: Vec<_> = map.values().cloned().collect();
        v.sort_by(|a, b| a.id.cmp(&b.id));
        v
    }

    /// Vacuously true before anything reported.
    pub async fn all_healthy(&self) -> bool {
        self.inner.read().await.values().all(|h| h.healthy)
    }

    pub async fn summary(&self) -> HealthSummary {
        let components = self.snapshot().await;
        let status = if components.iter().all(|c| c.healthy) { "ok" } else { "degraded" };
        HealthSummary { status, components }
    }
}

/// Write handle for one component id.
#[derive(Clone)]
pub struct HealthReporter {
    id: String,
    registry: HealthRegistry,
}

impl HealthReporter {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn set_healthy(&self) {
        self.write(true, "ok".into(), None).await;
    }

    pub async fn set_healthy_with(&self, message: impl Into<String>, details: Option<serde_json::Value>) {
        self.write(true, message.into(), details).await;
    }

    pub async fn set_unhealthy(&self, message: impl Into<String>) {
        self.write(false, message.into(), None).await;
    }

    pub async fn set_unhealthy_with(&self, message: impl Into<String>, details: Option<serde_json::Value>) {
        self.write(false, message.into(), details).await;
    }

    /// `None` until the component reported once.
    pub async fn get_current(&self) -> Option<ComponentHealth> {
        self.registry.inner.read().await.get(&self.id).cloned()
    }

    async fn write(&self, healthy: bool, message: String, details: Option<serde_json::Value>) {
        let h = ComponentHealth::new(&self.id, healthy, message, details);
        self.registry.inner.write().await.insert(self.id.clone(), h);
    }
}

//! Periodic health checks for storage, the knowledge base and AI providers.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::health::{HealthRegistry, HealthReporter, ids};
use crate::knowledge::KnowledgeBase;
use crate::llm::router::ProviderRouter;
use crate::storage::Database;
use crate::subsystems::runtime::{Component, ComponentFuture};

const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);

pub struct HealthProbe {
    db: Database,
    kb: Arc<KnowledgeBase>,
    router: Arc<ProviderRouter>,
    storage: HealthReporter,
    knowledge: HealthReporter,
    providers: HealthReporter,
    interval: Duration,
}

impl HealthProbe {
    pub fn new(registry: &HealthRegistry, db: Database, kb: Arc<KnowledgeBase>, router: Arc<ProviderRouter>) -> Self {
        Self {
            db,
            kb,
            router,
            storage: registry.reporter(ids::STORAGE),
            knowledge: registry.reporter(ids::KNOWLEDGE),
            providers: registry.reporter(ids::PROVIDERS),
            interval: DEFAULT_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run every check once.
    pub async fn check_all(&self) {
        self.check_storage().await;
        self.check_knowledge().await;
        self.check_providers().await;
    }

    async fn check_storage(&self) {
        match self.db.call("ping", |db| db.ping()).await {
            Ok(()) => {
                let details = json!({ "path": self.db.path().display().to_string() });
                self.storage.set_healthy_with("ok", Some(details)).await;
            }
            Err(e) => {
                warn!(error = %e, "storage health check failed");
                self.storage.set_unhealthy(e.to_string()).await;
            }
        }
    }

    async fn check_knowledge(&self) {
        let stats = self.kb.statistics();
        let details = json!({
            "total_questions": stats.total_questions,
            "blocks": stats.blocks.len(),
        });
        if stats.total_questions == 0 {
            self.knowledge
                .set_unhealthy_with("knowledge base is empty", Some(details))
                .await;
        } else {
            self.knowledge.set_healthy_with("ok", Some(details)).await;
        }
    }

    /// Healthy while at least one provider answers.
    async fn check_providers(&self) {
        let mut results = Map::new();
        for kind in self.router.available() {
            let Some(provider) = self.router.get(kind) else { continue };
            let ok = match provider.check_connection().await {
                Ok(()) => true,
                Err(e) => {
                    warn!(provider = %kind, error = %e, "provider health check failed");
                    false
                }
            };
            results.insert(kind.as_str().to_string(), Value::Bool(ok));
        }
        let preferred = self.router.preferred().await;
        let any_ok = results.values().any(|v| v.as_bool() == Some(true));
        let details = json!({ "preferred": preferred.as_str(), "providers": results });
        if any_ok {
            self.providers.set_healthy_with("ok", Some(details)).await;
        } else {
            self.providers
                .set_unhealthy_with("no AI provider reachable", Some(details))
                .await;
        }
    }
}

impl Component for HealthProbe {
    fn id(&self) -> &str {
        "health-probe"
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => self.check_all().await,
                }
            }
            debug!("health probe stopped");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::providers::dummy::DummyProvider;
    use crate::llm::{LlmProvider, ProviderKind};
    use tempfile::TempDir;

    #[tokio::test]
    async fn probe_reports_every_component() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(&dir.path().join("bot.db")).unwrap();
        let router = ProviderRouter::new(vec![LlmProvider::Dummy(DummyProvider)], ProviderKind::Dummy, true);
        let registry = HealthRegistry::new();
        let probe = HealthProbe::new(&registry, db, Arc::new(KnowledgeBase::from_entries(Vec::new())), Arc::new(router));

        probe.check_all().await;

        let snapshot = registry.snapshot().await;
        let by_id = |id: &str| snapshot.iter().find(|h| h.id == id).cloned().unwrap();
        assert!(by_id("storage").healthy);
        assert!(!by_id("knowledge").healthy);
        let providers = by_id("providers");
        assert!(providers.healthy);
        assert_eq!(providers.details.unwrap()["providers"]["dummy"], true);
    }

    #[tokio::test]
    async fn probe_stops_on_cancel() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(&dir.path().join("bot.db")).unwrap();
        let router = ProviderRouter::new(vec![LlmProvider::Dummy(DummyProvider)], ProviderKind::Dummy, true);
        let registry = HealthRegistry::new();
        let probe = HealthProbe::new(&registry, db, Arc::new(KnowledgeBase::from_entries(Vec::new())), Arc::new(router))
            .with_interval(Duration::from_millis(10));

        let token = CancellationToken::new();
        let handle = tokio::spawn(Box::new(probe).run(token.clone()));
        tokio::time::sleep(Duration::from_millis(30)).await;
        token.cancel();
        handle.await.unwrap().unwrap();
        assert!(registry.reporter(ids::STORAGE).get_current().await.is_some());
    }
}

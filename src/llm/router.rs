//! Multi-provider fallback.
//!
//! The router tries the preferred provider first, then the remaining ones in
//! [`ProviderKind::FALLBACK_ORDER`]. The preference is read from the
//! `ai_provider` system setting on every call, so an admin switch takes
//! effect immediately; the configured default applies when the setting is
//! absent or unreadable.

use tracing::{debug, info, warn};

use super::{ChatMessage, CompletionOptions, LlmProvider, LlmResponse, ProviderError, ProviderKind};
use crate::config::Config;
use crate::storage::{Database, keys};

/// A response together with the provider that produced it.
#[derive(Debug, Clone)]
pub struct Routed {
    pub response: LlmResponse,
    pub provider: ProviderKind,
}

#[derive(Debug, Clone)]
pub struct ProviderRouter {
    providers: Vec<LlmProvider>,
    default: ProviderKind,
    fallback: bool,
    settings: Option<Database>,
}

impl ProviderRouter {
    pub fn new(providers: Vec<LlmProvider>, default: ProviderKind, fallback: bool) -> Self {
        Self { providers, default, fallback, settings: None }
    }

    /// Read the preferred provider from `db` instead of only the default.
    pub fn with_settings(mut self, db: Database) -> Self {
        self.settings = Some(db);
        self
    }

    pub fn from_config(config: &Config, db: Database) -> Result<Self, ProviderError> {
        let providers = super::providers::build_available(config)?;
        let default: ProviderKind = config.ai.provider.parse()?;
        info!(
            default = %default,
            available = ?providers.iter().map(|p| p.kind().as_str()).collect::<Vec<_>>(),
            fallback = config.ai.fallback,
            "provider router ready"
        );
        Ok(Self::new(providers, default, config.ai.fallback).with_settings(db))
    }

    pub fn available(&self) -> Vec<ProviderKind> {
        self.providers.iter().map(|p| p.kind()).collect()
    }

    pub fn get(&self, kind: ProviderKind) -> Option<&LlmProvider> {
        self.providers.iter().find(|p| p.kind() == kind)
    }

    pub fn default_kind(&self) -> ProviderKind {
        self.default
    }

    /// The stored `ai_provider` setting, or the configured default.
    pub async fn preferred(&self) -> ProviderKind {
        let Some(db) = &self.settings else {
            return self.default;
        };
        let stored = db
            .call("get ai_provider", |db| db.get_setting(keys::AI_PROVIDER))
            .await;
        match stored {
            Ok(Some(value)) => value.parse::<ProviderKind>().unwrap_or_else(|e| {
                warn!(%value, error = %e, "ignoring invalid ai_provider setting");
                self.default
            }),
            Ok(None) => self.default,
            Err(e) => {
                warn!(error = %e, "could not read ai_provider setting");
                self.default
            }
        }
    }

    /// Providers in the order they will be tried for `preferred`.
    pub fn order(&self, preferred: ProviderKind) -> Vec<&LlmProvider> {
        let mut out: Vec<&LlmProvider> = self.get(preferred).into_iter().collect();
        for kind in ProviderKind::FALLBACK_ORDER {
            if kind != preferred {
                out.extend(self.get(kind));
            }
        }
        if !self.fallback {
            out.truncate(1);
        }
        out
    }

    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        options: CompletionOptions,
    ) -> Result<Routed, ProviderError> {
        let preferred = self.preferred().await;
        let mut last_err = None;

        for provider in self.order(preferred) {
            let kind = provider.kind();
            debug!(provider = %kind, "trying provider");
            match provider.chat(messages, options).await {
                Ok(response) => {
                    if kind != preferred {
                        info!(provider = %kind, preferred = %preferred, "answered by fallback provider");
                    }
                    return Ok(Routed { response, provider: kind });
                }
                Err(e) => {
                    warn!(provider = %kind, error = %e, "provider failed");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or(ProviderError::NoProviders))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Secrets;
    use crate::llm::providers::{build, dummy::DummyProvider};
    use tempfile::TempDir;

    /// An OpenAI provider pointed at a closed local port.
    fn unreachable_openai(dir: &TempDir) -> LlmProvider {
        let mut cfg = Config::test_default(dir.path());
        cfg.secrets = Secrets::from_lookup(|k| (k == "OPENAI_API_KEY").then(|| "sk-test".into()));
        build(ProviderKind::OpenAi, &cfg).unwrap()
    }

    #[tokio::test]
    async fn falls_back_after_failure() {
        let dir = TempDir::new().unwrap();
        let router = ProviderRouter::new(
            vec![unreachable_openai(&dir), LlmProvider::Dummy(DummyProvider)],
            ProviderKind::OpenAi,
            true,
        );
        let routed = router.complete(&[ChatMessage::user("привет")], CompletionOptions::default()).await.unwrap();
        assert_eq!(routed.provider, ProviderKind::Dummy);
        assert_eq!(routed.response.content, "[echo] привет");
    }

    #[tokio::test]
    async fn fallback_disabled_returns_error() {
        let dir = TempDir::new().unwrap();
        let router = ProviderRouter::new(
            vec![unreachable_openai(&dir), LlmProvider::Dummy(DummyProvider)],
            ProviderKind::OpenAi,
            false,
        );
        let err = router.complete(&[ChatMessage::user("x")], CompletionOptions::default()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Request(_)));
    }

    #[tokio::test]
    async fn empty_router_has_no_providers() {
        let router = ProviderRouter::new(Vec::new(), ProviderKind::OpenAi, true);
        let err = router.complete(&[ChatMessage::user("x")], CompletionOptions::default()).await.unwrap_err();
        assert!(matches!(err, ProviderError::NoProviders));
    }

    #[tokio::test]
    async fn stored_setting_overrides_default() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(&dir.path().join("bot.db")).unwrap();
        let router = ProviderRouter::new(
            vec![unreachable_openai(&dir), LlmProvider::Dummy(DummyProvider)],
            ProviderKind::OpenAi,
            true,
        )
        .with_settings(db.clone());

        assert_eq!(router.preferred().await, ProviderKind::OpenAi);
        db.set_setting(keys::AI_PROVIDER, "dummy", None).unwrap();
        assert_eq!(router.preferred().await, ProviderKind::Dummy);
        let kinds: Vec<_> = router.order(ProviderKind::Dummy).iter().map(|p| p.kind()).collect();
        assert_eq!(kinds, vec![ProviderKind::Dummy, ProviderKind::OpenAi]);

        db.set_setting(keys::AI_PROVIDER, "bogus", None).unwrap();
        assert_eq!(router.preferred().await, ProviderKind::OpenAi);
    }

    #[test]
    fn order_skips_missing_preferred() {
        let router = ProviderRouter::new(vec![LlmProvider::Dummy(DummyProvider)], ProviderKind::GigaChat, true);
        let kinds: Vec<_> = router.order(ProviderKind::GigaChat).iter().map(|p| p.kind()).collect();
        assert_eq!(kinds, vec![ProviderKind::Dummy]);
        assert_eq!(router.available(), vec![ProviderKind::Dummy]);
    }
}

//! AI provider implementations.
//!
//! `build(kind, config)` constructs one backend; `build_available(config)` is
//! the startup factory that returns every backend whose credentials are set.
//! Adding a new backend = new module + new match arm.

pub mod dummy;
pub mod gigachat;
pub mod openai;
pub(crate) mod wire;

use tracing::{info, warn};

use crate::config::Config;
use crate::llm::{LlmProvider, ProviderError, ProviderKind};

/// Construct a single provider. Keys come from [`crate::config::Secrets`],
/// never from TOML.
pub fn build(kind: ProviderKind, config: &Config) -> Result<LlmProvider, ProviderError> {
    let timeout = config.ai.timeout_seconds;
    match kind {
        ProviderKind::Dummy => Ok(LlmProvider::Dummy(dummy::DummyProvider)),
        ProviderKind::OpenAi => {
            let key = config
                .secrets
                .openai_api_key
                .clone()
                .ok_or_else(|| ProviderError::MissingCredentials("OPENAI_API_KEY".into()))?;
            Ok(LlmProvider::OpenAi(openai::OpenAiProvider::new(&config.openai, key, timeout)?))
        }
        ProviderKind::GigaChat => {
            let key = config
                .secrets
                .gigachat_api_key
                .as_deref()
                .ok_or_else(|| ProviderError::MissingCredentials("GIGACHAT_API_KEY".into()))?;
            Ok(LlmProvider::GigaChat(gigachat::GigaChatProvider::new(&config.gigachat, key, timeout)?))
        }
    }
}

/// Every provider that can be built, in fallback order.
///
/// `ai.provider = "dummy"` yields only the echo backend. When no real keys
/// are configured the echo backend is used as well, with a warning.
pub fn build_available(config: &Config) -> Result<Vec<LlmProvider>, ProviderError> {
    if config.ai.provider == ProviderKind::Dummy.as_str() {
        info!("AI provider set to dummy, replies are echoed");
        return Ok(vec![LlmProvider::Dummy(dummy::DummyProvider)]);
    }

    let mut out = Vec::new();
    for kind in [ProviderKind::OpenAi, ProviderKind::GigaChat] {
        match build(kind, config) {
            Ok(p) => {
                info!(provider = %kind, model = %p.model(), "AI provider ready");
                out.push(p);
            }
            Err(ProviderError::MissingCredentials(var)) => {
                info!(provider = %kind, "{var} not set, provider disabled");
            }
            Err(e) => return Err(e),
        }
    }

    if out.is_empty() {
        warn!("no AI provider keys configured, falling back to the echo provider");
        out.push(LlmProvider::Dummy(dummy::DummyProvider));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Secrets;
    use tempfile::TempDir;

    fn config_with(provider: &str, secrets: Secrets) -> (TempDir, Config) {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::test_default(dir.path());
        cfg.ai.provider = provider.into();
        cfg.secrets = secrets;
        (dir, cfg)
    }

    #[test]
    fn dummy_provider_only() {
        let (_d, cfg) = config_with("dummy", Secrets::default());
        let ps = build_available(&cfg).unwrap();
        assert_eq!(ps.len(), 1);
        assert_eq!(ps[0].kind(), ProviderKind::Dummy);
    }

    #[test]
    fn keys_select_providers() {
        let secrets = Secrets::from_lookup(|k| match k {
            "OPENAI_API_KEY" => Some("sk-test".into()),
            "GIGACHAT_API_KEY" => Some("id:secret".into()),
            _ => None,
        });
        let (_d, cfg) = config_with("openai", secrets);
        let kinds: Vec<_> = build_available(&cfg).unwrap().iter().map(|p| p.kind()).collect();
        assert_eq!(kinds, vec![ProviderKind::OpenAi, ProviderKind::GigaChat]);
    }

    #[test]
    fn no_keys_falls_back_to_echo() {
        let (_d, cfg) = config_with("gigachat", Secrets::default());
        let ps = build_available(&cfg).unwrap();
        assert_eq!(ps[0].kind(), ProviderKind::Dummy);
    }

    #[test]
    fn missing_key_is_reported() {
        let (_d, cfg) = config_with("openai", Secrets::default());
        assert!(matches!(
            build(ProviderKind::OpenAi, &cfg),
            Err(ProviderError::MissingCredentials(v)) if v == "OPENAI_API_KEY"
        ));
    }
}

//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory,
//! then applies env overrides. Secrets (bot token, AI keys, admin secret)
//! come from the environment only and never from TOML.
//!
//! # Module layout
//!
//! - **types**: public structs consumed by the rest of the crate.
//! - **raw**: TOML deserialization shapes with serde defaults; private.
//! - **load**: `load`, `load_from`, `[meta] base` merging, `expand_home`.

mod load;
mod raw;
mod types;

pub use load::{Overrides, expand_home, load, load_from};
pub use types::*;

impl Config {
    /// Safe `Config` for tests: dummy provider, no keys, no network checks.
    pub fn test_default(work_dir: &std::path::Path) -> Self {
        Self {
            bot_name: "test".into(),
            work_dir: work_dir.to_path_buf(),
            log_level: "info".into(),
            log_file: None,
            database: DatabaseConfig { path: work_dir.join("test.db") },
            telegram: TelegramConfig { enabled: false },
            admin: AdminConfig { enabled: false, bind: raw::default_admin_bind() },
            ai: AiConfig {
                provider: "dummy".into(),
                fallback: true,
                timeout_seconds: 2,
                max_history_length: raw::default_max_history_length(),
                enable_statistics: true,
            },
            openai: OpenAiConfig {
                api_base_url: "http://127.0.0.1:9/v1".into(),
                model: "test-model".into(),
                max_tokens: 100,
                temperature: 0.0,
            },
            gigachat: GigaChatConfig {
                auth_url: "http://127.0.0.1:9/oauth".into(),
                api_base_url: "http://127.0.0.1:9/api/v1".into(),
                scope: raw::default_gigachat_scope(),
                model: raw::default_gigachat_model(),
                max_tokens: 100,
                temperature: 0.0,
                accept_invalid_certs: false,
            },
            assistant: AssistantConfig {
                enabled: false,
                api_base_url: "http://127.0.0.1:9/v1".into(),
                name: raw::default_assistant_name(),
                model: "test-model".into(),
                poll_interval_ms: 10,
                max_wait_seconds: 1,
            },
            knowledge: KnowledgeConfig {
                faq_path: work_dir.join("faq.json"),
                match_threshold: raw::default_match_threshold(),
                check_urls: false,
                url_timeout_seconds: 1,
            },
            secrets: Secrets::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const BASE_TOML: &str = r#"
[bot]
name = "base-bot"
work_dir = "/tmp/hse-base"
log_level = "debug"

[database]
path = "bot.db"

[ai]
provider = "gigachat"
max_history_length = 6

[llm.openai]
model = "gpt-base"
temperature = 0.3
"#;

    fn write_named(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_values_and_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_named(&dir, "c.toml", BASE_TOML);
        let cfg = load_from(&path, &Overrides::default(), Secrets::default()).unwrap();
        assert_eq!(cfg.bot_name, "base-bot");
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.database.path, std::path::PathBuf::from("/tmp/hse-base/bot.db"));
        assert_eq!(cfg.ai.provider, "gigachat");
        assert_eq!(cfg.ai.max_history_length, 6);
        assert_eq!(cfg.openai.model, "gpt-base");
        assert_eq!(cfg.openai.max_tokens, 2000);
        assert_eq!(cfg.gigachat.max_tokens, 2048);
        assert_eq!(cfg.gigachat.scope, "GIGACHAT_API_PERS");
        assert_eq!(cfg.knowledge.match_threshold, 0.5);
        assert!(cfg.ai.fallback);
    }

    #[test]
    fn overrides_win() {
        let dir = TempDir::new().unwrap();
        let path = write_named(&dir, "c.toml", BASE_TOML);
        let overrides = Overrides {
            work_dir: Some("/tmp/other".into()),
            log_level: Some("warn".into()),
            database_path: Some("/var/lib/hse.db".into()),
            ai_provider: Some("OpenAI".into()),
            log_file: None,
        };
        let cfg = load_from(&path, &overrides, Secrets::default()).unwrap();
        assert_eq!(cfg.work_dir, std::path::PathBuf::from("/tmp/other"));
        assert_eq!(cfg.log_level, "warn");
        assert_eq!(cfg.database.path, std::path::PathBuf::from("/var/lib/hse.db"));
        assert_eq!(cfg.ai.provider, "openai");
    }

    #[test]
    fn unknown_provider_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_named(&dir, "c.toml", "[bot]\n[ai]\nprovider = \"claude\"\n");
        let err = load_from(&path, &Overrides::default(), Secrets::default()).unwrap_err();
        assert!(err.to_string().contains("unsupported ai.provider"));
    }

    #[test]
    fn overlay_wins_scalar() {
        let dir = TempDir::new().unwrap();
        write_named(&dir, "base.toml", BASE_TOML);
        let overlay = "[meta]\nbase = \"base.toml\"\n\n[llm.openai]\nmodel = \"gpt-overlay\"\n";
        let overlay_path = write_named(&dir, "overlay.toml", overlay);
        let cfg = load_from(&overlay_path, &Overrides::default(), Secrets::default()).unwrap();
        assert_eq!(cfg.openai.model, "gpt-overlay");
        assert_eq!(cfg.openai.temperature, 0.3);
        assert_eq!(cfg.bot_name, "base-bot");
    }

    #[test]
    fn cycle_detection() {
        let dir = TempDir::new().unwrap();
        let self_path = dir.path().join("self.toml");
        let content = format!("[meta]\nbase = \"{}\"\n\n{BASE_TOML}", self_path.display());
        std::fs::write(&self_path, content).unwrap();
        let err = load_from(&self_path, &Overrides::default(), Secrets::default()).unwrap_err();
        assert!(err.to_string().contains("circular"));
    }

    #[test]
    fn secrets_from_lookup() {
        let secrets = Secrets::from_lookup(|k| match k {
            "OPENAI_API_KEY" => Some("sk-test".into()),
            "GIGACHAT_API_KEY" => Some("   ".into()),
            "ADMIN_SECRET_KEY" => Some("abcdefghijklmnopqrstuvwxyz".into()),
            "ADMIN_USER_IDS" => Some("12, 34,x,56".into()),
            _ => None,
        });
        assert_eq!(secrets.openai_api_key.as_deref(), Some("sk-test"));
        assert!(secrets.gigachat_api_key.is_none());
        assert_eq!(secrets.admin_password().as_deref(), Some("abcdefghijklmnopqrst"));
        assert_eq!(secrets.admin_user_ids, vec![12, 34, 56]);
        assert!(secrets.is_admin_id(34));
        let dbg = format!("{secrets:?}");
        assert!(!dbg.contains("sk-test"));
    }

    #[test]
    fn placeholder_admin_secret_disables_panel() {
        let secrets = Secrets::from_lookup(|k| {
            (k == "ADMIN_SECRET_KEY").then(|| ADMIN_SECRET_PLACEHOLDER.to_string())
        });
        assert!(secrets.admin_password().is_none());
    }
}

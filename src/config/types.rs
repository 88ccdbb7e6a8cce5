//! Public configuration structs consumed by the rest of the crate.

use std::path::PathBuf;

// ── Top-level ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_name: String,
    pub work_dir: PathBuf,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub database: DatabaseConfig,
    pub telegram: TelegramConfig,
    pub admin: AdminConfig,
    pub ai: AiConfig,
    pub openai: OpenAiConfig,
    pub gigachat: GigaChatConfig,
    pub assistant: AssistantConfig,
    pub knowledge: KnowledgeConfig,
    /// Sourced from the environment only, never from TOML.
    pub secrets: Secrets,
}

impl Config {
    pub fn telegram_should_load(&self) -> bool {
        self.telegram.enabled && self.secrets.telegram_bot_token.is_some()
    }

    /// The admin panel refuses to start with a missing or placeholder secret.
    pub fn admin_should_load(&self) -> bool {
        self.admin.enabled && self.secrets.admin_password().is_some()
    }
}

// ── Sections ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Absolute path of the SQLite file.
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub enabled: bool,
    pub bind: String,
}

#[derive(Debug, Clone)]
pub struct AiConfig {
    /// `openai`, `gigachat` or `dummy`.
    pub provider: String,
    pub fallback: bool,
    pub timeout_seconds: u64,
    pub max_history_length: usize,
    pub enable_statistics: bool,
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone)]
pub struct GigaChatConfig {
    pub auth_url: String,
    pub api_base_url: String,
    pub scope: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// The GigaChat endpoints are signed by the Russian national CA.
    pub accept_invalid_certs: bool,
}

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub enabled: bool,
    pub api_base_url: String,
    pub name: String,
    pub model: String,
    pub poll_interval_ms: u64,
    pub max_wait_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct KnowledgeConfig {
    pub faq_path: PathBuf,
    pub match_threshold: f64,
    pub check_urls: bool,
    pub url_timeout_seconds: u64,
}

// ── Secrets ──────────────────────────────────────────────────────────────────

pub const ADMIN_SECRET_PLACEHOLDER: &str = "change-me-in-production";

#[derive(Clone, Default)]
pub struct Secrets {
    pub telegram_bot_token: Option<String>,
    pub openai_api_key: Option<String>,
    /// `client_id:client_secret`.
    pub gigachat_api_key: Option<String>,
    pub admin_secret_key: Option<String>,
    pub admin_user_ids: Vec<i64>,
}

impl Secrets {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Self {
            telegram_bot_token: get("TELEGRAM_BOT_TOKEN"),
            openai_api_key: get("OPENAI_API_KEY"),
            gigachat_api_key: get("GIGACHAT_API_KEY"),
            admin_secret_key: get("ADMIN_SECRET_KEY"),
            admin_user_ids: get("ADMIN_USER_IDS")
                .map(|raw| parse_id_list(&raw))
                .unwrap_or_default(),
        }
    }

    /// Admin panel password: the first 20 chars of the secret key.
    pub fn admin_password(&self) -> Option<String> {
        self.admin_secret_key
            .as_deref()
            .filter(|k| *k != ADMIN_SECRET_PLACEHOLDER)
            .map(|k| k.chars().take(20).collect())
    }

    pub fn is_admin_id(&self, id: i64) -> bool {
        self.admin_user_ids.contains(&id)
    }
}

// Keys must never reach the logs.
impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mark = |o: &Option<String>| if o.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Secrets")
            .field("telegram_bot_token", &mark(&self.telegram_bot_token))
            .field("openai_api_key", &mark(&self.openai_api_key))
            .field("gigachat_api_key", &mark(&self.gigachat_api_key))
            .field("admin_secret_key", &mark(&self.admin_secret_key))
            .field("admin_user_ids", &self.admin_user_ids)
            .finish()
    }
}

fn parse_id_list(raw: &str) -> Vec<i64> {
    raw.split(',')
        .filter_map(|part| part.trim().parse::<i64>().ok())
        .collect()
}

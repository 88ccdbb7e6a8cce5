//! Raw TOML deserialization types.
//!
//! These structs mirror the file shape and use `serde` defaults.
//! The `load` module resolves them into the public `types` structs.

use serde::Deserialize;

// ── Top-level ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RawConfig {
    pub bot: RawBot,
    #[serde(default)]
    pub database: RawDatabase,
    #[serde(default)]
    pub telegram: RawTelegram,
    #[serde(default)]
    pub admin: RawAdmin,
    #[serde(default)]
    pub ai: RawAi,
    #[serde(default)]
    pub llm: RawLlm,
    #[serde(default)]
    pub assistant: RawAssistant,
    #[serde(default)]
    pub knowledge: RawKnowledge,
}

#[derive(Deserialize)]
pub(super) struct RawBot {
    #[serde(default = "default_bot_name")]
    pub name: String,
    #[serde(default = "default_work_dir")]
    pub work_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_file: Option<String>,
}

#[derive(Deserialize)]
pub(super) struct RawDatabase {
    #[serde(default = "default_db_path")]
    pub path: String,
}

#[derive(Deserialize)]
pub(super) struct RawTelegram {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Deserialize)]
pub(super) struct RawAdmin {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_admin_bind")]
    pub bind: String,
}

#[derive(Deserialize)]
pub(super) struct RawAi {
    #[serde(default = "default_ai_provider")]
    pub provider: String,
    #[serde(default = "default_true")]
    pub fallback: bool,
    #[serde(default = "default_ai_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_max_history_length")]
    pub max_history_length: usize,
    #[serde(default = "default_true")]
    pub enable_statistics: bool,
}

// ── LLM ──────────────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
pub(super) struct RawLlm {
    #[serde(default)]
    pub openai: RawOpenAi,
    #[serde(default)]
    pub gigachat: RawGigaChat,
}

#[derive(Deserialize)]
pub(super) struct RawOpenAi {
    #[serde(default = "default_openai_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_openai_model")]
    pub model: String,
    #[serde(default = "default_openai_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

#[derive(Deserialize)]
pub(super) struct RawGigaChat {
    #[serde(default = "default_gigachat_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_gigachat_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_gigachat_scope")]
    pub scope: String,
    #[serde(default = "default_gigachat_model")]
    pub model: String,
    #[serde(default = "default_gigachat_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_true")]
    pub accept_invalid_certs: bool,
}

#[derive(Deserialize)]
pub(super) struct RawAssistant {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_openai_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_assistant_name")]
    pub name: String,
    #[serde(default = "default_openai_model")]
    pub model: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_wait_seconds")]
    pub max_wait_seconds: u64,
}

#[derive(Deserialize)]
pub(super) struct RawKnowledge {
    #[serde(default = "default_faq_path")]
    pub faq_path: String,
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,
    #[serde(default = "default_true")]
    pub check_urls: bool,
    #[serde(default = "default_url_timeout_seconds")]
    pub url_timeout_seconds: u64,
}

// ── Default impls for serde ──────────────────────────────────────────────────

impl Default for RawDatabase {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

impl Default for RawTelegram {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for RawAdmin {
    fn default() -> Self {
        Self { enabled: true, bind: default_admin_bind() }
    }
}

impl Default for RawAi {
    fn default() -> Self {
        Self {
            provider: default_ai_provider(),
            fallback: true,
            timeout_seconds: default_ai_timeout_seconds(),
            max_history_length: default_max_history_length(),
            enable_statistics: true,
        }
    }
}

impl Default for RawOpenAi {
    fn default() -> Self {
        Self {
            api_base_url: default_openai_api_base_url(),
            model: default_openai_model(),
            max_tokens: default_openai_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl Default for RawGigaChat {
    fn default() -> Self {
        Self {
            auth_url: default_gigachat_auth_url(),
            api_base_url: default_gigachat_api_base_url(),
            scope: default_gigachat_scope(),
            model: default_gigachat_model(),
            max_tokens: default_gigachat_max_tokens(),
            temperature: default_temperature(),
            accept_invalid_certs: true,
        }
    }
}

impl Default for RawAssistant {
    fn default() -> Self {
        Self {
            enabled: true,
            api_base_url: default_openai_api_base_url(),
            name: default_assistant_name(),
            model: default_openai_model(),
            poll_interval_ms: default_poll_interval_ms(),
            max_wait_seconds: default_max_wait_seconds(),
        }
    }
}

impl Default for RawKnowledge {
    fn default() -> Self {
        Self {
            faq_path: default_faq_path(),
            match_threshold: default_match_threshold(),
            check_urls: true,
            url_timeout_seconds: default_url_timeout_seconds(),
        }
    }
}

// ── Default functions (used by serde) ────────────────────────────────────────

fn default_true() -> bool {
    true
}

pub(super) fn default_bot_name() -> String {
    "HSEConsultBot".to_string()
}
pub(super) fn default_work_dir() -> String {
    "~/.hse-consult-bot".to_string()
}
pub(super) fn default_log_level() -> String {
    "info".to_string()
}
pub(super) fn default_db_path() -> String {
    "hse_bot.db".to_string()
}
pub(super) fn default_admin_bind() -> String {
    "127.0.0.1:8080".to_string()
}
pub(super) fn default_ai_provider() -> String {
    "openai".to_string()
}
pub(super) fn default_ai_timeout_seconds() -> u64 {
    60
}
pub(super) fn default_max_history_length() -> usize {
    10
}
pub(super) fn default_openai_api_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
pub(super) fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}
pub(super) fn default_openai_max_tokens() -> u32 {
    2000
}
pub(super) fn default_temperature() -> f32 {
    0.7
}
pub(super) fn default_gigachat_auth_url() -> String {
    "https://ngw.devices.sberbank.ru:9443/api/v2/oauth".to_string()
}
pub(super) fn default_gigachat_api_base_url() -> String {
    "https://gigachat.devices.sberbank.ru/api/v1".to_string()
}
pub(super) fn default_gigachat_scope() -> String {
    "GIGACHAT_API_PERS".to_string()
}
pub(super) fn default_gigachat_model() -> String {
    "GigaChat".to_string()
}
pub(super) fn default_gigachat_max_tokens() -> u32 {
    2048
}
pub(super) fn default_assistant_name() -> String {
    "OT Consultant Assistant".to_string()
}
pub(super) fn default_poll_interval_ms() -> u64 {
    500
}
pub(super) fn default_max_wait_seconds() -> u64 {
    120
}
pub(super) fn default_faq_path() -> String {
    "data/faq.json".to_string()
}
pub(super) fn default_match_threshold() -> f64 {
    0.5
}
pub(super) fn default_url_timeout_seconds() -> u64 {
    5
}

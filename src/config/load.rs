//! Configuration loading with env-var overrides.
//!
//! Reads TOML files, supports `[meta] base = "..."` inheritance chains,
//! and applies the `HSE_*` / `DATABASE_PATH` / `AI_PROVIDER` env overrides.

use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::AppError;

use super::raw::RawConfig;
use super::types::*;

/// Values that replace what the TOML file says. Tests build this directly
/// instead of mutating process env vars.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub work_dir: Option<String>,
    pub log_level: Option<String>,
    pub log_file: Option<String>,
    pub database_path: Option<String>,
    pub ai_provider: Option<String>,
}

impl Overrides {
    pub fn from_env() -> Self {
        let get = |key: &str| env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            work_dir: get("HSE_WORK_DIR"),
            log_level: get("HSE_LOG_LEVEL"),
            log_file: get("LOG_FILE"),
            database_path: get("DATABASE_PATH"),
            ai_provider: get("AI_PROVIDER"),
        }
    }
}

/// Deep-merge two TOML values. Tables merge recursively; any other overlay
/// value replaces the base value wholesale.
fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_tbl), toml::Value::Table(overlay_tbl)) => {
            for (key, ov_val) in overlay_tbl {
                let merged = match base_tbl.remove(&key) {
                    Some(base_val) => merge_toml(base_val, ov_val),
                    None => ov_val,
                };
                base_tbl.insert(key, merged);
            }
            toml::Value::Table(base_tbl)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file, follow any `[meta] base` chain and return the merged
/// value. `visited` catches circular references.
fn load_raw_merged(path: &Path, visited: &mut HashSet<PathBuf>) -> Result<toml::Value, AppError> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !visited.insert(canonical) {
        return Err(AppError::Config(format!(
            "circular base reference detected at: {}",
            path.display()
        )));
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let overlay_val: toml::Value = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    if let Some(base_str) = overlay_val
        .get("meta")
        .and_then(|m| m.get("base"))
        .and_then(|b| b.as_str())
    {
        let base_path = if Path::new(base_str).is_absolute() {
            PathBuf::from(base_str)
        } else {
            path.parent().unwrap_or(Path::new(".")).join(base_str)
        };
        let base_val = load_raw_merged(&base_path, visited)?;
        Ok(merge_toml(base_val, overlay_val))
    } else {
        Ok(overlay_val)
    }
}

/// Load config from the given path, or `config/default.toml`, then apply
/// env overrides and read secrets from the environment. Without a path and
/// without `config/default.toml` the built-in defaults are used.
pub fn load(config_path: Option<&str>) -> Result<Config, AppError> {
    let overrides = Overrides::from_env();
    let secrets = Secrets::from_env();

    if let Some(path) = config_path {
        return load_from(Path::new(path), &overrides, secrets);
    }

    let default_path = Path::new("config/default.toml");
    if default_path.exists() {
        load_from(default_path, &overrides, secrets)
    } else {
        let mut table = toml::value::Table::new();
        table.insert("bot".into(), toml::Value::Table(toml::value::Table::new()));
        let parsed: RawConfig = Deserialize::deserialize(toml::Value::Table(table))
            .map_err(|e: toml::de::Error| AppError::Config(format!("built-in defaults: {e}")))?;
        Ok(resolve(parsed, &overrides, secrets))
    }
}

/// Load from an explicit path with explicit overrides and secrets.
pub fn load_from(path: &Path, overrides: &Overrides, secrets: Secrets) -> Result<Config, AppError> {
    let merged_val = load_raw_merged(path, &mut HashSet::new())?;

    let parsed: RawConfig = Deserialize::deserialize(merged_val).map_err(|e: toml::de::Error| {
        AppError::Config(format!("config error in {}: {e}", path.display()))
    })?;

    let config = resolve(parsed, overrides, secrets);
    validate(&config)?;
    Ok(config)
}

fn resolve(parsed: RawConfig, overrides: &Overrides, secrets: Secrets) -> Config {
    let b = parsed.bot;

    let work_dir = expand_home(overrides.work_dir.as_deref().unwrap_or(&b.work_dir));
    let log_level = overrides.log_level.clone().unwrap_or(b.log_level);
    let log_file = overrides
        .log_file
        .as_deref()
        .or(b.log_file.as_deref())
        .map(|p| relative_to(&work_dir, p));

    let db_path = overrides.database_path.as_deref().unwrap_or(&parsed.database.path);
    let database = DatabaseConfig { path: relative_to(&work_dir, db_path) };

    let provider = overrides
        .ai_provider
        .clone()
        .unwrap_or(parsed.ai.provider)
        .to_lowercase();

    Config {
        bot_name: b.name,
        work_dir,
        log_level,
        log_file,
        database,
        telegram: TelegramConfig { enabled: parsed.telegram.enabled },
        admin: AdminConfig { enabled: parsed.admin.enabled, bind: parsed.admin.bind },
        ai: AiConfig {
            provider,
            fallback: parsed.ai.fallback,
            timeout_seconds: parsed.ai.timeout_seconds.max(1),
            max_history_length: parsed.ai.max_history_length,
            enable_statistics: parsed.ai.enable_statistics,
        },
        openai: OpenAiConfig {
            api_base_url: trim_slash(parsed.llm.openai.api_base_url),
            model: parsed.llm.openai.model,
            max_tokens: parsed.llm.openai.max_tokens,
            temperature: parsed.llm.openai.temperature,
        },
        gigachat: GigaChatConfig {
            auth_url: parsed.llm.gigachat.auth_url,
            api_base_url: trim_slash(parsed.llm.gigachat.api_base_url),
            scope: parsed.llm.gigachat.scope,
            model: parsed.llm.gigachat.model,
            max_tokens: parsed.llm.gigachat.max_tokens,
            temperature: parsed.llm.gigachat.temperature,
            accept_invalid_certs: parsed.llm.gigachat.accept_invalid_certs,
        },
        assistant: AssistantConfig {
            enabled: parsed.assistant.enabled,
            api_base_url: trim_slash(parsed.assistant.api_base_url),
            name: parsed.assistant.name,
            model: parsed.assistant.model,
            poll_interval_ms: parsed.assistant.poll_interval_ms.max(10),
            max_wait_seconds: parsed.assistant.max_wait_seconds.max(1),
        },
        knowledge: KnowledgeConfig {
            faq_path: expand_home(&parsed.knowledge.faq_path),
            match_threshold: parsed.knowledge.match_threshold,
            check_urls: parsed.knowledge.check_urls,
            url_timeout_seconds: parsed.knowledge.url_timeout_seconds.max(1),
        },
        secrets,
    }
}

fn validate(config: &Config) -> Result<(), AppError> {
    match config.ai.provider.as_str() {
        "openai" | "gigachat" | "dummy" => {}
        other => {
            return Err(AppError::Config(format!(
                "unsupported ai.provider '{other}' (expected openai, gigachat or dummy)"
            )));
        }
    }
    if !(0.0..=1.0).contains(&config.knowledge.match_threshold) {
        return Err(AppError::Config(format!(
            "knowledge.match_threshold must be within 0..=1, got {}",
            config.knowledge.match_threshold
        )));
    }
    Ok(())
}

fn relative_to(base: &Path, path: &str) -> PathBuf {
    let p = expand_home(path);
    if p.is_absolute() { p } else { base.join(p) }
}

fn trim_slash(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

/// Expand a leading `~` to the user's home directory.
/// Paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

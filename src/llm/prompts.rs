//! Prompt templates.
//!
//! Template bodies live under `config/prompts/` and are compiled into the
//! binary. Variable substitution uses `{{key}}` syntax and is applied once at
//! [`build()`](PromptBuilder::build) time, after all parts are joined.

use std::collections::HashMap;

use crate::knowledge::FaqEntry;
use crate::storage::UserRole;

const SEPARATOR: &str = "\n\n";

const SYSTEM_BASE: &str = include_str!("../../config/prompts/system_base.md");
const CATEGORIZE: &str = include_str!("../../config/prompts/categorize.md");
const FAQ_EXPAND: &str = include_str!("../../config/prompts/faq_expand.md");
const ASSISTANT_INSTRUCTIONS: &str = include_str!("../../config/prompts/assistant_instructions.md");

/// Categories the classifier may answer with. The last one is the catch-all.
pub const CATEGORIES: &[&str] = &[
    "инструктажи",
    "обучение",
    "медосмотры",
    "сиз",
    "соут",
    "документация",
    "несчастные_случаи",
    "пожарная_безопасность",
    "санпин",
    "другое",
];

pub const FALLBACK_CATEGORY: &str = "другое";

/// Token cap for the classification call.
pub const CATEGORIZE_MAX_TOKENS: u32 = 10;

/// Fluent builder that assembles a prompt from text fragments.
#[derive(Debug, Default)]
pub struct PromptBuilder {
    parts: Vec<String>,
    vars: HashMap<String, String>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment. Blank fragments are skipped.
    pub fn append(mut self, text: impl Into<String>) -> Self {
        let s = text.into();
        let trimmed = s.trim();
        if !trimmed.is_empty() {
            self.parts.push(trimmed.to_string());
        }
        self
    }

    /// Register `{{key}}` → `value` substitution pairs applied at build time.
    pub fn with_vars<'a, I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (k, v) in vars {
            self.vars.insert(k.to_string(), v.to_string());
        }
        self
    }

    pub fn var(mut self, key: &str, value: impl Into<String>) -> Self {
        self.vars.insert(key.to_string(), value.into());
        self
    }

    /// Join all parts with blank lines and apply variable substitution.
    pub fn build(self) -> String {
        let mut prompt = self.parts.join(SEPARATOR);
        for (k, v) in &self.vars {
            let placeholder = format!("{{{{{k}}}}}");
            prompt = prompt.replace(&placeholder, v);
        }
        prompt
    }
}

fn role_addendum(role: UserRole) -> &'static str {
    match role {
        UserRole::Admin => {
            "Собеседник — администратор системы. Допустимы технические подробности и развёрнутые ссылки на нормативную базу."
        }
        UserRole::SpecialistOtDou => {
            "Собеседник — специалист по охране труда ДОУ. Отвечай профессионально: порядок действий, формы документов, сроки, ответственность."
        }
        UserRole::SpecialistOtOther => {
            "Собеседник — специалист по охране труда другой отрасли. Подчёркивай особенности дошкольных учреждений и отличия от общих требований."
        }
        UserRole::Employee => {
            "Собеседник — сотрудник ДОУ (воспитатель, помощник воспитателя, технический персонал). Объясняй простым языком, что нужно делать и какие у сотрудника права."
        }
        UserRole::Trial => {
            "Собеседник пользуется пробным доступом. Давай краткие, но точные ответы со ссылками на нормы."
        }
    }
}

/// System prompt for a chat-mode consultation.
pub fn system_prompt(role: UserRole, bot_name: &str) -> String {
    PromptBuilder::new()
        .append(SYSTEM_BASE)
        .append(role_addendum(role))
        .var("bot_name", bot_name)
        .build()
}

pub fn categorization_prompt(question: &str) -> String {
    PromptBuilder::new()
        .append(CATEGORIZE)
        .var("categories", CATEGORIES.join(", "))
        .var("question", question)
        .build()
}

/// Map a free-form classifier reply onto [`CATEGORIES`].
pub fn normalize_category(raw: &str) -> String {
    let word = raw
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .trim_matches(|c: char| !c.is_alphanumeric() && c != '_')
        .to_lowercase();
    if CATEGORIES.contains(&word.as_str()) {
        word
    } else {
        FALLBACK_CATEGORY.to_string()
    }
}

/// The knowledge-base hit rendered as plain context for the model.
pub fn faq_context(entry: &FaqEntry) -> String {
    let mut lines = vec![
        format!("Вопрос: {}", entry.question),
        format!("Ответ: {}", entry.short_answer),
    ];
    if !entry.legal_reference.is_empty() {
        lines.push(format!("Правовая база: {}", entry.legal_reference));
    }
    if !entry.legal_url.is_empty() {
        lines.push(format!("Ссылка: {}", entry.legal_url));
    }
    lines.join("\n")
}

/// Prompt asking the model to extend a knowledge-base answer.
pub fn faq_expansion_prompt(faq_context: &str, question: &str) -> String {
    PromptBuilder::new()
        .append(FAQ_EXPAND)
        .var("faq_context", faq_context)
        .var("question", question)
        .build()
}

pub fn assistant_instructions() -> &'static str {
    ASSISTANT_INSTRUCTIONS.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_joins_and_substitutes() {
        let p = PromptBuilder::new()
            .append("  Hello {{name}}  ")
            .append("   ")
            .append("Bye {{name}}")
            .with_vars([("name", "Anna")])
            .build();
        assert_eq!(p, "Hello Anna\n\nBye Anna");
    }

    #[test]
    fn system_prompt_varies_by_role() {
        let dou = system_prompt(UserRole::SpecialistOtDou, "HSEConsultBot");
        let emp = system_prompt(UserRole::Employee, "HSEConsultBot");
        assert!(dou.contains("HSEConsultBot"));
        assert!(dou.contains("специалист по охране труда ДОУ"));
        assert_ne!(dou, emp);
        assert!(!dou.contains("{{"));
    }

    #[test]
    fn categorization_lists_categories() {
        let p = categorization_prompt("Как часто проводить инструктаж?");
        assert!(p.contains("пожарная_безопасность"));
        assert!(p.contains("Как часто проводить инструктаж?"));
    }

    #[test]
    fn normalize_category_variants() {
        assert_eq!(normalize_category("Инструктажи."), "инструктажи");
        assert_eq!(normalize_category("  сиз\n"), "сиз");
        assert_eq!(normalize_category("[echo] вопрос"), "другое");
        assert_eq!(normalize_category(""), "другое");
    }

    #[test]
    fn expansion_prompt_embeds_context() {
        let entry = FaqEntry {
            question: "Кто проводит вводный инструктаж?".into(),
            short_answer: "Специалист по охране труда.".into(),
            legal_reference: "Постановление № 2464".into(),
            legal_url: String::new(),
            block: "Инструктажи".into(),
            current_as_of: String::new(),
        };
        let ctx = faq_context(&entry);
        assert!(ctx.contains("Правовая база: Постановление № 2464"));
        assert!(!ctx.contains("Ссылка"));
        let p = faq_expansion_prompt(&ctx, "А если специалиста нет?");
        assert!(p.starts_with("Релевантная информация из базы знаний:"));
        assert!(p.contains("Вопрос пользователя: А если специалиста нет?"));
    }

    #[test]
    fn assistant_instructions_present() {
        assert!(assistant_instructions().contains("нейроассистент"));
    }
}

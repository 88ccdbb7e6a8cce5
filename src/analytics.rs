//! Analytics-side anonymization and reporting.
//!
//! Stricter than [`crate::privacy`]: names, INN and address fragments are
//! also masked, because exports leave the system. Only the two name
//! patterns are case-sensitive; a case-insensitive name pattern would
//! swallow any three consecutive lowercase words. Address, contact and
//! document patterns match in any case.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{SecondsFormat, Utc};
use regex::Regex;
use serde::Serialize;

use crate::storage::{QueryRecord, User};

static FULL_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[А-ЯЁ][а-яё]+\s+[А-ЯЁ][а-яё]+\s+[А-ЯЁ][а-яё]+\b").expect("full name regex")
});
static SHORT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[А-ЯЁ][а-яё]+\s+[А-ЯЁ][а-яё]+\b").expect("short name regex"));
static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\+?[78][\s\-]?\(?\d{3}\)?[\s\-]?\d{3}[\s\-]?\d{2}[\s\-]?\d{2}").expect("phone regex")
});
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("email regex")
});
static PASSPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b\d{4}\s?\d{6}\b").expect("passport regex"));
static SNILS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b\d{3}-\d{3}-\d{3}\s\d{2}\b").expect("snils regex"));
static INN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\b\d{10,12}\b").expect("inn regex"));
static CITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bг\.\s*[А-ЯЁ][а-яё]+").expect("city regex"));
static STREET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bул\.\s*[А-ЯЁ][а-яё]+").expect("street regex"));

fn rules() -> [(&'static Regex, &'static str); 9] {
    [
        (&*FULL_NAME, "[ФИО]"),
        (&*SHORT_NAME, "[ФИ]"),
        (&*PHONE, "[ТЕЛЕФОН]"),
        (&*EMAIL, "[EMAIL]"),
        (&*PASSPORT, "[ПАСПОРТ]"),
        (&*SNILS, "[СНИЛС]"),
        (&*INN, "[ИНН]"),
        (&*CITY, "[ГОРОД]"),
        (&*STREET, "[УЛИЦА]"),
    ]
}

pub fn anonymize_query_text(text: &str) -> String {
    rules()
        .iter()
        .fold(text.to_string(), |acc, (re, placeholder)| {
            re.replace_all(&acc, *placeholder).into_owned()
        })
}

/// `true` if the text looks like it carries a name or contact identifier.
pub fn is_sensitive(text: &str) -> bool {
    [&*SHORT_NAME, &*PHONE, &*EMAIL, &*PASSPORT, &*SNILS]
        .iter()
        .any(|re| re.is_match(text))
}

/// Replace the identifying profile fields. Only present fields are touched.
pub fn anonymize_user(user: &User) -> User {
    let mut out = user.clone();
    if out.username.as_deref().is_some_and(|u| !u.is_empty()) {
        out.username = Some(format!("user_{}", user.id));
    }
    if out.first_name.as_deref().is_some_and(|n| !n.is_empty()) {
        out.first_name = Some("***".into());
    }
    if out.last_name.as_deref().is_some_and(|n| !n.is_empty()) {
        out.last_name = Some("***".into());
    }
    out
}

pub fn anonymize_queries(queries: &[QueryRecord]) -> Vec<QueryRecord> {
    queries
        .iter()
        .map(|q| QueryRecord {
            question: anonymize_query_text(&q.question),
            answer: anonymize_query_text(&q.answer),
            ..q.clone()
        })
        .collect()
}

// ── Summary & report ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AnalyticsSummary {
    pub total_queries: usize,
    pub avg_response_time: f64,
    pub total_tokens: i64,
    pub categories: BTreeMap<String, usize>,
    pub ai_providers: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopQuery {
    pub question: String,
    pub category: Option<String>,
    pub response_time: Option<f64>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsReport {
    pub summary: AnalyticsSummary,
    pub top_queries: Vec<TopQuery>,
    pub anonymized: bool,
    pub generated_at: String,
}

pub fn summary(queries: &[QueryRecord]) -> AnalyticsSummary {
    let times: Vec<f64> = queries
        .iter()
        .filter_map(|q| q.response_time)
        .filter(|t| *t > 0.0)
        .collect();
    let avg = if times.is_empty() {
        0.0
    } else {
        times.iter().sum::<f64>() / times.len() as f64
    };

    let mut categories = BTreeMap::new();
    let mut ai_providers = BTreeMap::new();
    for q in queries {
        if let Some(c) = q.category.as_deref().filter(|c| !c.is_empty()) {
            *categories.entry(c.to_string()).or_insert(0) += 1;
        }
        if !q.ai_provider.is_empty() {
            *ai_providers.entry(q.ai_provider.clone()).or_insert(0) += 1;
        }
    }

    AnalyticsSummary {
        total_queries: queries.len(),
        avg_response_time: (avg * 100.0).round() / 100.0,
        total_tokens: queries.iter().filter_map(|q| q.tokens_used).sum(),
        categories,
        ai_providers,
    }
}

pub fn create_report(queries: &[QueryRecord], anonymize: bool) -> AnalyticsReport {
    let anonymized;
    let queries = if anonymize {
        anonymized = anonymize_queries(queries);
        anonymized.as_slice()
    } else {
        queries
    };

    let top_queries = queries
        .iter()
        .take(10)
        .map(|q| TopQuery {
            question: truncate_with_ellipsis(&q.question, 100),
            category: q.category.clone(),
            response_time: q.response_time,
            created_at: q.created_at.clone(),
        })
        .collect();

    AnalyticsReport {
        summary: summary(queries),
        top_queries,
        anonymized: anonymize,
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    }
}

/// Char-safe truncation that appends `...` only when something was cut.
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let mut s: String = text.chars().take(max_chars).collect();
        s.push_str("...");
        s
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(question: &str, category: Option<&str>, provider: &str, time: Option<f64>, tokens: Option<i64>) -> QueryRecord {
        QueryRecord {
            id: 1,
            user_id: 10,
            question: question.into(),
            answer: "ответ".into(),
            ai_provider: provider.into(),
            ai_model: None,
            response_time: time,
            tokens_used: tokens,
            category: category.map(Into::into),
            documents_used: None,
            created_at: "2025-10-17T10:00:00Z".into(),
        }
    }

    #[test]
    fn masks_names_and_addresses() {
        let out = anonymize_query_text("Заведующая Петрова Анна Сергеевна из г. Казань, ул. Ленина");
        assert!(out.contains("[ФИО]"));
        assert!(out.contains("[ГОРОД]"));
        assert!(out.contains("[УЛИЦА]"));
        assert!(!out.contains("Петрова"));
    }

    #[test]
    fn masks_addresses_in_any_case() {
        assert_eq!(anonymize_query_text("школа в г. москва"), "школа в [ГОРОД]");
        assert_eq!(anonymize_query_text("Адрес ул. ленина"), "Адрес [УЛИЦА]");
        assert_eq!(anonymize_query_text("Адрес УЛ. Ленина"), "Адрес [УЛИЦА]");
        assert_eq!(anonymize_query_text("Г. Казань"), "[ГОРОД]");
        assert_eq!(anonymize_query_text("пишите на IVAN@MAIL.RU"), "пишите на [EMAIL]");
    }

    #[test]
    fn lowercase_words_are_not_names() {
        let text = "как провести вводный инструктаж";
        assert_eq!(anonymize_query_text(text), text);
    }

    #[test]
    fn masks_inn_and_snils() {
        let out = anonymize_query_text("ИНН 500100732259, СНИЛС 123-456-789 01");
        assert!(out.contains("[ИНН]"));
        assert!(out.contains("[СНИЛС]"));
    }

    #[test]
    fn sensitive_detection() {
        assert!(is_sensitive("Иванов Иван просит справку"));
        assert!(is_sensitive("пишите на a@b.ru"));
        assert!(!is_sensitive("нормы освещённости в группе"));
    }

    #[test]
    fn summary_counts() {
        let qs = vec![
            query("a", Some("инструктажи"), "openai", Some(1.0), Some(100)),
            query("b", Some("инструктажи"), "gigachat", Some(2.0), None),
            query("c", None, "openai", None, Some(50)),
        ];
        let s = summary(&qs);
        assert_eq!(s.total_queries, 3);
        assert_eq!(s.avg_response_time, 1.5);
        assert_eq!(s.total_tokens, 150);
        assert_eq!(s.categories["инструктажи"], 2);
        assert_eq!(s.ai_providers["openai"], 2);
    }

    #[test]
    fn empty_summary() {
        let s = summary(&[]);
        assert_eq!(s.total_queries, 0);
        assert_eq!(s.avg_response_time, 0.0);
        assert!(s.categories.is_empty());
    }

    #[test]
    fn report_truncates_and_caps_top_queries() {
        let long = "вопрос ".repeat(30);
        let qs: Vec<_> = (0..12).map(|_| query(&long, None, "openai", None, None)).collect();
        let r = create_report(&qs, true);
        assert_eq!(r.top_queries.len(), 10);
        assert!(r.top_queries[0].question.ends_with("..."));
        assert_eq!(r.top_queries[0].question.chars().count(), 103);
        assert!(r.anonymized);
        assert_ne!(r.generated_at, "2025-01-01T00:00:00Z");
    }

    #[test]
    fn anonymize_user_masks_present_fields_only() {
        let user = User {
            id: 77,
            username: Some("ivan".into()),
            first_name: Some("Иван".into()),
            last_name: None,
            role: Default::default(),
            is_active: true,
            is_blocked: false,
            assistant_thread_id: None,
            gdpr_accepted: true,
            gdpr_accepted_at: None,
            total_requests: 0,
            last_request_at: None,
            created_at: String::new(),
            updated_at: String::new(),
        };
        let anon = anonymize_user(&user);
        assert_eq!(anon.username.as_deref(), Some("user_77"));
        assert_eq!(anon.first_name.as_deref(), Some("***"));
        assert!(anon.last_name.is_none());
    }
}

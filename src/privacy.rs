//! Personal-data filter for user questions.
//!
//! Applied before a question reaches an AI provider or any storage table.
//! Only high-confidence identifiers are replaced here. INN is left alone
//! because ten-digit numbers show up in ordinary questions (order numbers,
//! regulation ids); the analytics path in [`crate::analytics`] is stricter.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\+7|8)[\s\-]?\(?\d{3}\)?[\s\-]?\d{3}[\s\-]?\d{2}[\s\-]?\d{2}").expect("phone regex")
});
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("email regex")
});
static PASSPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{4}\s?\d{6}\b").expect("passport regex"));
static SNILS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{3}-\d{3}-\d{3}\s?\d{2}\b").expect("snils regex"));

/// Replacement order matters: a phone number would otherwise be eaten by
/// the passport pattern.
fn rules() -> [(&'static Regex, &'static str); 4] {
    [
        (&*PHONE, "[ТЕЛЕФОН]"),
        (&*EMAIL, "[EMAIL]"),
        (&*PASSPORT, "[ПАСПОРТ]"),
        (&*SNILS, "[СНИЛС]"),
    ]
}

/// Replace personal identifiers with placeholders.
///
/// Returns the cleaned text and whether anything was replaced.
pub fn anonymize_personal_data(text: &str) -> (String, bool) {
    let mut out = text.to_string();
    let mut detected = false;

    for (re, placeholder) in rules() {
        if re.is_match(&out) {
            out = re.replace_all(&out, placeholder).into_owned();
            detected = true;
        }
    }

    if detected {
        warn!("personal data detected in user text, anonymized");
        debug!(before = text.chars().count(), after = out.chars().count(), "anonymization length");
    }
    (out, detected)
}

/// `true` if the text holds anything [`anonymize_personal_data`] would replace.
pub fn contains_personal_data(text: &str) -> bool {
    rules().iter().any(|(re, _)| re.is_match(text))
}

/// HTML notice shown to the user after their question was anonymized.
pub fn privacy_warning() -> &'static str {
    "⚠️ <b>Обнаружены персональные данные!</b>\n\n\
     В вашем вопросе содержатся данные, которые могут быть персональными \
     (телефон, email, паспорт и т.д.).\n\n\
     🔒 <b>Для вашей безопасности:</b>\n\
     • Персональные данные были автоматически анонимизированы\n\
     • Они НЕ будут переданы в AI-сервисы\n\
     • Рекомендуем НЕ указывать личные данные в открытом виде\n\n\
     Ваш вопрос обработан с анонимизацией."
}

/// Log-safe user label: only the last three digits of the id survive.
pub fn masked_user_id(user_id: i64, username: Option<&str>) -> String {
    let id = user_id.to_string();
    let tail: String = id.chars().rev().take(3).collect::<Vec<_>>().into_iter().rev().collect();
    match username {
        Some(name) if !name.is_empty() => format!("user_***{tail} (@{name})"),
        _ => format!("user_***{tail}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_phone_variants() {
        let (out, hit) = anonymize_personal_data("Звоните +7 (912) 345-67-89 или 89123456789");
        assert!(hit);
        assert_eq!(out, "Звоните [ТЕЛЕФОН] или [ТЕЛЕФОН]");
    }

    #[test]
    fn replaces_email_passport_snils() {
        let (out, hit) = anonymize_personal_data(
            "почта ivan.petrov@school.ru, паспорт 4510 123456, СНИЛС 123-456-789 01",
        );
        assert!(hit);
        assert!(out.contains("[EMAIL]"));
        assert!(out.contains("[ПАСПОРТ]"));
        assert!(out.contains("[СНИЛС]"));
        assert!(!out.contains("ivan.petrov"));
    }

    #[test]
    fn leaves_inn_and_plain_text_alone() {
        let text = "Какой ИНН 500100732259 указывать в журнале инструктажа?";
        let (out, hit) = anonymize_personal_data(text);
        assert!(!hit);
        assert_eq!(out, text);
        assert!(!contains_personal_data(text));
    }

    #[test]
    fn contains_matches_anonymize() {
        assert!(contains_personal_data("мой телефон 8 912 345 67 89"));
        assert!(!contains_personal_data("статья 212 ТК РФ"));
    }

    #[test]
    fn masked_ids() {
        assert_eq!(masked_user_id(123456789, None), "user_***789");
        assert_eq!(masked_user_id(123456789, Some("ivan")), "user_***789 (@ivan)");
        assert_eq!(masked_user_id(42, Some("")), "user_***42");
    }

    #[test]
    fn warning_mentions_anonymization() {
        assert!(privacy_warning().contains("анонимизированы"));
    }
}

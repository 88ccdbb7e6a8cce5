//! HTML rendering of a knowledge-base hit for chat users.

use std::sync::LazyLock;

use regex::Regex;

use super::FaqMatch;

static ARTICLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ст\.\s*(\d+(?:\.\d+)?)").expect("article regex"));

const LABOR_CODE_BASE: &str = "https://www.consultant.ru/document/cons_doc_LAW_34683";

const GOVERNMENT_DOMAINS: &[&str] = &[
    "kremlin.ru",
    "government.ru",
    "duma.gov.ru",
    "council.gov.ru",
    "minjust.gov.ru",
    "mintrud.gov.ru",
    "rostrud.gov.ru",
    "gks.ru",
    "consultant.ru",
    "pravo.gov.ru",
    "fzrf.sudrf.ru",
    "docs.cntd.ru",
    "rulaws.ru",
    "zakonrf.info",
    "fstec.ru",
    "fsb.ru",
    "mvd.ru",
    "rosgvard.ru",
    "gost.ru",
    "rospotrebnadzor.ru",
    "roszdravnadzor.gov.ru",
    "minzdrav.gov.ru",
    "edu.gov.ru",
    "minobrnauki.gov.ru",
];

const OFFICIAL_SOURCES_HINT: &str =
    "<i>ℹ️ Для получения актуальной информации обратитесь к официальным источникам</i>";

/// Official or well-known legal portals whose links are shown as-is.
pub fn is_government_source(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }
    let url = url.to_lowercase();
    url.contains(".gov.ru") || GOVERNMENT_DOMAINS.iter().any(|d| url.contains(d))
}

/// `"ТК РФ ст. 212"` → `Some("st-212")`.
pub fn article_slug(legal_reference: &str) -> Option<String> {
    ARTICLE
        .captures(legal_reference)
        .and_then(|c| c.get(1))
        .map(|m| format!("st-{}", m.as_str()))
}

pub fn format_answer(m: &FaqMatch) -> String {
    let e = &m.entry;
    let mut parts = vec![
        "📚 <b>Найдено в базе знаний</b>".to_string(),
        format!("<b>Категория:</b> {}", e.block),
        String::new(),
        format!("<b>Вопрос:</b> {}", e.question),
        String::new(),
        format!("<b>Ответ:</b> {}", e.short_answer),
        String::new(),
    ];
    parts.extend(legal_basis(m));
    parts.push(String::new());
    parts.push(format!("<i>Актуально на: {}</i>", e.current_as_of));
    parts.push(format!("<i>Степень совпадения: {:.0}%</i>", m.score * 100.0));
    parts.join("\n")
}

fn legal_basis(m: &FaqMatch) -> Vec<String> {
    let reference = m.entry.legal_reference.as_str();
    let url = m.entry.legal_url.as_str();
    let basis = format!("<b>Правовая база:</b> {reference}");

    if reference.contains("ТК РФ") {
        return match article_slug(reference) {
            Some(slug) => vec![basis, format!("✅ <b>Ссылка:</b> {LABOR_CODE_BASE}/{slug}/")],
            None => vec![basis, OFFICIAL_SOURCES_HINT.to_string()],
        };
    }

    if is_government_source(url) {
        let mark = if m.url_valid == Some(true) { "✅" } else { "⚠️" };
        let mut lines = vec![basis, format!("{mark} <b>Ссылка:</b> {url}")];
        if m.url_valid == Some(false) {
            let status = m.url_status.map(|s| s.to_string()).unwrap_or_else(|| "N/A".into());
            lines.push(format!("<i>⚠️ Внимание: ссылка может быть недоступна (код {status})</i>"));
        }
        return lines;
    }

    if reference.is_empty() {
        vec![OFFICIAL_SOURCES_HINT.to_string()]
    } else {
        vec![basis, OFFICIAL_SOURCES_HINT.to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::FaqEntry;

    fn hit(reference: &str, url: &str, url_valid: Option<bool>, url_status: Option<u16>) -> FaqMatch {
        FaqMatch {
            entry: FaqEntry {
                question: "Как часто проводить повторный инструктаж?".into(),
                short_answer: "Не реже одного раза в шесть месяцев.".into(),
                legal_reference: reference.into(),
                legal_url: url.into(),
                block: "Инструктажи".into(),
                current_as_of: "01.09.2025".into(),
            },
            score: 0.874,
            url_valid,
            url_status,
        }
    }

    #[test]
    fn labor_code_reference_links_article() {
        let text = format_answer(&hit("ТК РФ ст. 214", "https://example.com/x", None, None));
        assert!(text.contains("https://www.consultant.ru/document/cons_doc_LAW_34683/st-214/"));
        assert!(text.contains("<b>Категория:</b> Инструктажи"));
        assert!(text.contains("Степень совпадения: 87%"));
        assert!(text.contains("Актуально на: 01.09.2025"));
    }

    #[test]
    fn labor_code_without_article_hints_official_sources() {
        let text = format_answer(&hit("ТК РФ", "", None, None));
        assert!(text.contains("обратитесь к официальным источникам"));
        assert!(!text.contains("Ссылка"));
    }

    #[test]
    fn government_url_marks_validity() {
        let ok = format_answer(&hit("Постановление 2464", "https://mintrud.gov.ru/docs/1", Some(true), Some(200)));
        assert!(ok.contains("✅ <b>Ссылка:</b> https://mintrud.gov.ru/docs/1"));

        let bad = format_answer(&hit("Постановление 2464", "https://pravo.gov.ru/x", Some(false), Some(404)));
        assert!(bad.contains("⚠️ <b>Ссылка:</b>"));
        assert!(bad.contains("(код 404)"));

        let unchecked = format_answer(&hit("СП 2.4.3648-20", "https://docs.cntd.ru/document/1", None, None));
        assert!(unchecked.contains("⚠️ <b>Ссылка:</b>"));
        assert!(!unchecked.contains("Внимание"));
    }

    #[test]
    fn non_government_url_is_hidden() {
        let text = format_answer(&hit("Методичка", "https://blog.example.com/ot", None, None));
        assert!(!text.contains("blog.example.com"));
        assert!(text.contains("<b>Правовая база:</b> Методичка"));
    }

    #[test]
    fn slug_and_domains() {
        assert_eq!(article_slug("ТК РФ ст.212.1").as_deref(), Some("st-212.1"));
        assert_eq!(article_slug("ТК РФ"), None);
        assert!(is_government_source("https://any.gov.ru/page"));
        assert!(!is_government_source(""));
        assert!(!is_government_source("https://example.org"));
    }
}

//! FAQ knowledge base: load, match, validate links, render.
//!
//! Entries are read from a JSON array on startup and can be reloaded at
//! runtime. A missing or malformed file leaves the base empty; the bot then
//! answers every question through the AI providers.

mod format;
mod similarity;

pub use format::{article_slug, format_answer, is_government_source};
pub use similarity::{ratio, similarity};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard};
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::KnowledgeConfig;
use crate::error::AppError;

/// Scores below this are never returned by [`KnowledgeBase::best_match`].
const MIN_SCORE: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaqEntry {
    pub question: String,
    pub short_answer: String,
    #[serde(default)]
    pub legal_reference: String,
    #[serde(default)]
    pub legal_url: String,
    pub block: String,
    #[serde(default)]
    pub current_as_of: String,
}

/// A scored hit, optionally with the result of probing its `legal_url`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaqMatch {
    pub entry: FaqEntry,
    pub score: f64,
    pub url_valid: Option<bool>,
    pub url_status: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KbStatistics {
    pub total_questions: usize,
    pub blocks: BTreeMap<String, usize>,
    pub questions_with_urls: usize,
    pub questions_without_urls: usize,
}

pub struct KnowledgeBase {
    path: Option<PathBuf>,
    entries: RwLock<Vec<FaqEntry>>,
    threshold: f64,
    check_urls: bool,
    http: Client,
}

impl KnowledgeBase {
    /// Load from `cfg.faq_path`. Never fails; see the module docs.
    pub fn load(cfg: &KnowledgeConfig) -> Self {
        let entries = read_entries_logged(&cfg.faq_path);
        Self {
            path: Some(cfg.faq_path.clone()),
            entries: RwLock::new(entries),
            threshold: cfg.match_threshold,
            check_urls: cfg.check_urls,
            http: url_client(cfg.url_timeout_seconds),
        }
    }

    /// In-memory base with default matching settings and no link probing.
    pub fn from_entries(entries: Vec<FaqEntry>) -> Self {
        Self {
            path: None,
            entries: RwLock::new(entries),
            threshold: 0.5,
            check_urls: false,
            http: url_client(5),
        }
    }

    /// Re-read the backing file. Returns the new entry count.
    pub fn reload(&self) -> usize {
        let Some(path) = &self.path else {
            return self.len();
        };
        info!(path = %path.display(), "reloading FAQ knowledge base");
        let entries = read_entries_logged(path);
        let n = entries.len();
        *self.entries.write().unwrap_or_else(|e| e.into_inner()) = entries;
        n
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn all_questions(&self) -> Vec<String> {
        self.read().iter().map(|e| e.question.clone()).collect()
    }

    /// Distinct block names, sorted.
    pub fn blocks(&self) -> Vec<String> {
        let mut blocks: Vec<String> = self.read().iter().map(|e| e.block.clone()).collect();
        blocks.sort();
        blocks.dedup();
        blocks
    }

    pub fn questions_by_block(&self, block: &str) -> Vec<FaqEntry> {
        self.read().iter().filter(|e| e.block == block).cloned().collect()
    }

    /// Entries scoring at least `threshold`, best first, at most `top_k`.
    pub fn find_relevant(&self, query: &str, threshold: f64, top_k: usize) -> Vec<(FaqEntry, f64)> {
        let entries = self.read();
        if entries.is_empty() {
            warn!("knowledge base is empty");
            return Vec::new();
        }
        let mut hits: Vec<(FaqEntry, f64)> = entries
            .iter()
            .filter_map(|e| {
                let score = similarity(query, &e.question);
                (score >= threshold).then(|| (e.clone(), score))
            })
            .collect();
        hits.sort_by(|a, b| b.1.total_cmp(&a.1));
        hits.truncate(top_k);
        hits
    }

    /// The single best entry for `query`, probing its link when `check_urls`
    /// is set and the base was configured to allow it.
    pub async fn best_match(&self, query: &str, check_urls: bool) -> Option<FaqMatch> {
        let (entry, score) = self.find_relevant(query, self.threshold, 1).into_iter().next()?;
        if score < MIN_SCORE {
            return None;
        }
        debug!(score, block = %entry.block, "FAQ match");

        let (url_valid, url_status) = if check_urls && self.check_urls && !entry.legal_url.is_empty() {
            let (valid, status) = self.check_url(&entry.legal_url).await;
            (Some(valid), status)
        } else {
            (None, None)
        };

        Some(FaqMatch { entry, score, url_valid, url_status })
    }

    /// HEAD the URL, following redirects. Valid means a 2xx or 3xx status.
    pub async fn check_url(&self, url: &str) -> (bool, Option<u16>) {
        let url = url.trim();
        if url.is_empty() {
            return (false, None);
        }
        match self.http.head(url).send().await {
            Ok(resp) => {
                let status = resp.status().as_u16();
                ((200..400).contains(&status), Some(status))
            }
            Err(e) => {
                warn!(%url, error = %e, "legal URL check failed");
                (false, None)
            }
        }
    }

    pub fn statistics(&self) -> KbStatistics {
        let entries = self.read();
        let mut blocks = BTreeMap::new();
        let mut with_urls = 0;
        for e in entries.iter() {
            *blocks.entry(e.block.clone()).or_insert(0) += 1;
            if !e.legal_url.trim().is_empty() {
                with_urls += 1;
            }
        }
        KbStatistics {
            total_questions: entries.len(),
            blocks,
            questions_with_urls: with_urls,
            questions_without_urls: entries.len() - with_urls,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<FaqEntry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }
}

pub fn read_entries(path: &Path) -> Result<Vec<FaqEntry>, AppError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| AppError::Knowledge(format!("read {}: {e}", path.display())))?;
    serde_json::from_str(&raw)
        .map_err(|e| AppError::Knowledge(format!("parse {}: {e}", path.display())))
}

fn read_entries_logged(path: &Path) -> Vec<FaqEntry> {
    match read_entries(path) {
        Ok(entries) => {
            info!(count = entries.len(), "FAQ knowledge base loaded");
            entries
        }
        Err(e) => {
            error!("{e}");
            Vec::new()
        }
    }
}

fn url_client(timeout_seconds: u64) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .build()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(question: &str, block: &str, url: &str) -> FaqEntry {
        FaqEntry {
            question: question.into(),
            short_answer: "ответ".into(),
            legal_reference: String::new(),
            legal_url: url.into(),
            block: block.into(),
            current_as_of: "01.09.2025".into(),
        }
    }

    fn sample() -> KnowledgeBase {
        KnowledgeBase::from_entries(vec![
            entry("Как часто проводить повторный инструктаж по охране труда?", "Инструктажи", "https://mintrud.gov.ru/a"),
            entry("Кто проводит вводный инструктаж в детском саду?", "Инструктажи", ""),
            entry("Какие нормы освещенности в групповой комнате?", "СанПиН", "  "),
        ])
    }

    #[test]
    fn blocks_sorted_and_distinct() {
        assert_eq!(sample().blocks(), vec!["Инструктажи", "СанПиН"]);
        assert_eq!(sample().questions_by_block("Инструктажи").len(), 2);
        assert_eq!(sample().all_questions().len(), 3);
    }

    #[test]
    fn statistics_count_urls() {
        let s = sample().statistics();
        assert_eq!(s.total_questions, 3);
        assert_eq!(s.blocks["Инструктажи"], 2);
        assert_eq!(s.questions_with_urls, 1);
        assert_eq!(s.questions_without_urls, 2);
    }

    #[test]
    fn find_relevant_orders_by_score() {
        let kb = sample();
        let hits = kb.find_relevant("как часто проводить повторный инструктаж по охране труда", 0.0, 5);
        assert_eq!(hits.len(), 3);
        assert!(hits[0].0.question.contains("повторный"));
        assert!(hits.windows(2).all(|w| w[0].1 >= w[1].1));
        assert_eq!(kb.find_relevant("x", 0.0, 1).len(), 1);
    }

    #[tokio::test]
    async fn best_match_without_url_check() {
        let kb = sample();
        let m = kb.best_match("Как часто проводить повторный инструктаж по охране труда?", false).await.unwrap();
        assert!((m.score - 1.0).abs() < 1e-9);
        assert_eq!(m.url_valid, None);
        assert!(kb.best_match("совершенно посторонний текст про погоду", false).await.is_none());
    }

    #[tokio::test]
    async fn empty_url_is_invalid() {
        assert_eq!(sample().check_url("  ").await, (false, None));
    }

    #[test]
    fn empty_base() {
        let kb = KnowledgeBase::from_entries(Vec::new());
        assert!(kb.is_empty());
        assert!(kb.find_relevant("что угодно", 0.0, 5).is_empty());
        assert_eq!(kb.statistics().total_questions, 0);
        assert_eq!(kb.reload(), 0);
    }
}

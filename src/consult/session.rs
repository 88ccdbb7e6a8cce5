//! Per-user dialogue state between two chat events.
//!
//! Holds what the next message or button press needs to know: which mode a
//! bare prompt (`/ask`, `/ask_assistant`) armed, the knowledge-base hit
//! offered for expansion, and the last AI answer awaiting a rating. Nothing
//! here survives a restart.

use std::collections::HashMap;
use std::sync::Mutex;

use super::AskMode;

/// A knowledge-base hit that may still be expanded or rated.
#[derive(Debug, Clone, PartialEq)]
pub struct FaqContext {
    /// The anonymized question the user asked.
    pub user_question: String,
    pub faq_question: String,
    /// The hit rendered as model context.
    pub context: String,
    pub score: f64,
    pub token: u32,
    pub mode: AskMode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LastAnswer {
    pub question: String,
    pub answer: String,
    pub mode: AskMode,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DialogueSession {
    pub awaiting: Option<AskMode>,
    pub faq: Option<FaqContext>,
    pub last_answer: Option<LastAnswer>,
}

impl DialogueSession {
    fn is_empty(&self) -> bool {
        self.awaiting.is_none() && self.faq.is_none() && self.last_answer.is_none()
    }
}

#[derive(Debug, Default)]
pub struct SessionStore {
    inner: Mutex<HashMap<i64, DialogueSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, user_id: i64, f: impl FnOnce(&mut DialogueSession) -> R) -> R {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let session = map.entry(user_id).or_default();
        let out = f(session);
        if session.is_empty() {
            map.remove(&user_id);
        }
        out
    }

    pub fn get(&self, user_id: i64) -> DialogueSession {
        let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.get(&user_id).cloned().unwrap_or_default()
    }

    /// Arm `mode` for the user's next plain message.
    pub fn set_awaiting(&self, user_id: i64, mode: AskMode) {
        self.with(user_id, |s| s.awaiting = Some(mode));
    }

    /// Disarm and return the pending mode, if any.
    pub fn take_awaiting(&self, user_id: i64) -> Option<AskMode> {
        self.with(user_id, |s| s.awaiting.take())
    }

    pub fn set_faq(&self, user_id: i64, faq: FaqContext) {
        self.with(user_id, |s| s.faq = Some(faq));
    }

    pub fn faq(&self, user_id: i64) -> Option<FaqContext> {
        self.get(user_id).faq
    }

    pub fn set_last_answer(&self, user_id: i64, answer: LastAnswer) {
        self.with(user_id, |s| s.last_answer = Some(answer));
    }

    pub fn last_answer(&self, user_id: i64) -> Option<LastAnswer> {
        self.get(user_id).last_answer
    }

    pub fn clear(&self, user_id: i64) {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.remove(&user_id);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn faq(token: u32) -> FaqContext {
        FaqContext {
            user_question: "Кто проводит инструктаж?".into(),
            faq_question: "Кто проводит вводный инструктаж?".into(),
            context: "Вопрос: ...".into(),
            score: 0.8,
            token,
            mode: AskMode::Chat,
        }
    }

    #[test]
    fn awaiting_is_taken_once() {
        let store = SessionStore::new();
        store.set_awaiting(1, AskMode::Assistant);
        assert_eq!(store.take_awaiting(1), Some(AskMode::Assistant));
        assert_eq!(store.take_awaiting(1), None);
        assert!(store.is_empty());
    }

    #[test]
    fn faq_and_answer_are_independent() {
        let store = SessionStore::new();
        store.set_faq(7, faq(42));
        store.set_last_answer(7, LastAnswer { question: "q".into(), answer: "a".into(), mode: AskMode::Chat });
        assert_eq!(store.faq(7).map(|f| f.token), Some(42));
        assert_eq!(store.last_answer(7).map(|a| a.answer), Some("a".to_string()));
        assert!(store.faq(8).is_none());

        store.clear(7);
        assert_eq!(store.get(7), DialogueSession::default());
        assert!(store.is_empty());
    }

    #[test]
    fn newer_faq_replaces_older() {
        let store = SessionStore::new();
        store.set_faq(1, faq(1));
        store.set_faq(1, faq(2));
        assert_eq!(store.faq(1).map(|f| f.token), Some(2));
        assert_eq!(store.len(), 1);
    }
}

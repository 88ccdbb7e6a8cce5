//! Per-user sliding-window rate limiting.
//!
//! Every request is counted twice: once against its own kind and once against
//! the `global` budget. History lives in memory only and is pruned lazily on
//! each check plus hourly by [`RateLimitJanitor`].

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::privacy::masked_user_id;
use crate::subsystems::runtime::{Component, ComponentFuture};

// ── Limits ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    Question,
    AssistantQuestion,
    ExpandAnswer,
    Global,
}

impl LimitKind {
    pub const ALL: [LimitKind; 4] = [
        LimitKind::Question,
        LimitKind::AssistantQuestion,
        LimitKind::ExpandAnswer,
        LimitKind::Global,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LimitKind::Question => "question",
            LimitKind::AssistantQuestion => "assistant_question",
            LimitKind::ExpandAnswer => "expand_answer",
            LimitKind::Global => "global",
        }
    }

    pub fn limit(&self) -> Limit {
        match self {
            LimitKind::Question => Limit::new(10, 60, "обычные вопросы"),
            LimitKind::AssistantQuestion => Limit::new(5, 60, "вопросы к нейроассистенту"),
            LimitKind::ExpandAnswer => Limit::new(3, 60, "расширенные ответы"),
            LimitKind::Global => Limit::new(20, 300, "все запросы"),
        }
    }
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Limit {
    pub max_requests: usize,
    pub window_seconds: u64,
    pub display_name: &'static str,
}

impl Limit {
    const fn new(max_requests: usize, window_seconds: u64, display_name: &'static str) -> Self {
        Self { max_requests, window_seconds, display_name }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

/// Returned by [`RateLimiter::check`] when a budget is spent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitExceeded {
    pub kind: LimitKind,
    pub limit: Limit,
    pub wait_seconds: u64,
}

impl RateLimitExceeded {
    /// HTML notice for the chat user.
    pub fn message(&self) -> String {
        format!(
            "⏱ <b>Превышен лимит запросов!</b>\n\n\
             Тип: {}\n\
             Лимит: {} запросов за {} мин.\n\
             Попробуйте через: {} сек.",
            self.limit.display_name,
            self.limit.max_requests,
            self.limit.window_seconds / 60,
            self.wait_seconds,
        )
    }
}

// ── Limiter ──────────────────────────────────────────────────────────────────

type History = HashMap<i64, HashMap<LimitKind, VecDeque<Instant>>>;

#[derive(Debug, Default)]
pub struct RateLimiter {
    history: Mutex<History>,
}

impl RateLimiter {
    pub fn new() -> Self {
        info!("rate limiter initialized");
        Self::default()
    }

    pub fn limits(&self) -> Vec<(LimitKind, Limit)> {
        LimitKind::ALL.into_iter().map(|k| (k, k.limit())).collect()
    }

    /// Check the kind's own budget, then the global one. Does not record.
    pub fn check(&self, user_id: i64, kind: LimitKind) -> Result<(), RateLimitExceeded> {
        self.check_at(user_id, kind, Instant::now())
    }

    pub fn check_at(&self, user_id: i64, kind: LimitKind, now: Instant) -> Result<(), RateLimitExceeded> {
        let mut history = self.lock();
        check_one(&mut history, user_id, kind, now)?;
        if kind != LimitKind::Global {
            check_one(&mut history, user_id, LimitKind::Global, now)?;
        }
        Ok(())
    }

    /// Count a request against its kind and against `global`.
    pub fn record(&self, user_id: i64, kind: LimitKind) {
        self.record_at(user_id, kind, Instant::now());
    }

    pub fn record_at(&self, user_id: i64, kind: LimitKind, now: Instant) {
        let mut history = self.lock();
        let per_user = history.entry(user_id).or_default();
        per_user.entry(kind).or_default().push_back(now);
        if kind != LimitKind::Global {
            per_user.entry(LimitKind::Global).or_default().push_back(now);
        }
        debug!(user = %masked_user_id(user_id, None), kind = %kind, "request recorded");
    }

    pub fn remaining(&self, user_id: i64, kind: LimitKind) -> usize {
        self.remaining_at(user_id, kind, Instant::now())
    }

    pub fn remaining_at(&self, user_id: i64, kind: LimitKind, now: Instant) -> usize {
        kind.limit().max_requests.saturating_sub(self.used_at(user_id, kind, now))
    }

    /// Requests counted inside the current window.
    pub fn used(&self, user_id: i64, kind: LimitKind) -> usize {
        self.used_at(user_id, kind, Instant::now())
    }

    pub fn used_at(&self, user_id: i64, kind: LimitKind, now: Instant) -> usize {
        let mut history = self.lock();
        history
            .get_mut(&user_id)
            .and_then(|per_user| per_user.get_mut(&kind))
            .map(|q| {
                prune(q, now, kind.limit().window());
                q.len()
            })
            .unwrap_or(0)
    }

    /// Forget everything about a user. Returns whether they had any history.
    pub fn clear_user(&self, user_id: i64) -> bool {
        let removed = self.lock().remove(&user_id).is_some();
        if removed {
            info!(user = %masked_user_id(user_id, None), "rate limit history cleared");
        }
        removed
    }

    pub fn has_history(&self, user_id: i64) -> bool {
        self.lock().contains_key(&user_id)
    }

    /// Drop timestamps older than `horizon` and users left with nothing.
    pub fn cleanup_older_than(&self, horizon: Duration) -> usize {
        self.cleanup_at(horizon, Instant::now())
    }

    pub fn cleanup_at(&self, horizon: Duration, now: Instant) -> usize {
        let mut history = self.lock();
        let before = history.len();
        history.retain(|_, per_user| {
            for q in per_user.values_mut() {
                prune(q, now, horizon);
            }
            per_user.values().any(|q| !q.is_empty())
        });
        let removed = before - history.len();
        if removed > 0 {
            info!(users = removed, "cleaned up rate limit history");
        }
        removed
    }

    pub fn tracked_users(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, History> {
        // A poisoned map only means a panic mid-update; the data is still usable.
        self.history.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn prune(q: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while q.front().is_some_and(|ts| now.saturating_duration_since(*ts) >= window) {
        q.pop_front();
    }
}

fn check_one(history: &mut History, user_id: i64, kind: LimitKind, now: Instant) -> Result<(), RateLimitExceeded> {
    let limit = kind.limit();
    let Some(q) = history.get_mut(&user_id).and_then(|u| u.get_mut(&kind)) else {
        return Ok(());
    };
    prune(q, now, limit.window());
    if q.len() < limit.max_requests {
        return Ok(());
    }

    let oldest = q.front().copied().unwrap_or(now);
    let elapsed = now.saturating_duration_since(oldest);
    let wait_seconds = limit.window().saturating_sub(elapsed).as_secs() + 1;
    warn!(
        user = %masked_user_id(user_id, None),
        kind = %kind,
        wait_seconds,
        "rate limit exceeded"
    );
    Err(RateLimitExceeded { kind, limit, wait_seconds })
}

// ── Janitor ──────────────────────────────────────────────────────────────────

/// Background component that prunes stale history on a fixed interval.
pub struct RateLimitJanitor {
    limiter: Arc<RateLimiter>,
    interval: Duration,
    horizon: Duration,
}

impl RateLimitJanitor {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self {
            limiter,
            interval: Duration::from_secs(3600),
            horizon: Duration::from_secs(24 * 3600),
        }
    }

    pub fn with_timing(mut self, interval: Duration, horizon: Duration) -> Self {
        self.interval = interval;
        self.horizon = horizon;
        self
    }
}

impl Component for RateLimitJanitor {
    fn id(&self) -> &str {
        "rate-limit-janitor"
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(async move {
            let mut ticker = tokio::time::interval(self.interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        self.limiter.cleanup_older_than(self.horizon);
                    }
                }
            }
            debug!("rate limit janitor stopped");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER: i64 = 1001;

    fn fill(rl: &RateLimiter, kind: LimitKind, n: usize, at: Instant) {
        for _ in 0..n {
            rl.record_at(USER, kind, at);
        }
    }

    #[test]
    fn fresh_user_is_allowed() {
        let rl = RateLimiter::new();
        assert!(rl.check(USER, LimitKind::Question).is_ok());
        assert_eq!(rl.remaining(USER, LimitKind::Question), 10);
        assert_eq!(rl.tracked_users(), 0);
    }

    #[test]
    fn question_limit_denies_eleventh() {
        let rl = RateLimiter::new();
        let t0 = Instant::now();
        fill(&rl, LimitKind::Question, 10, t0);

        let err = rl.check_at(USER, LimitKind::Question, t0 + Duration::from_secs(20)).unwrap_err();
        assert_eq!(err.kind, LimitKind::Question);
        assert_eq!(err.wait_seconds, 41);
        let msg = err.message();
        assert!(msg.contains("обычные вопросы"));
        assert!(msg.contains("10 запросов за 1 мин."));
        assert!(msg.contains("41 сек."));
    }

    #[test]
    fn window_slides() {
        let rl = RateLimiter::new();
        let t0 = Instant::now();
        fill(&rl, LimitKind::ExpandAnswer, 3, t0);
        assert!(rl.check_at(USER, LimitKind::ExpandAnswer, t0 + Duration::from_secs(59)).is_err());
        assert!(rl.check_at(USER, LimitKind::ExpandAnswer, t0 + Duration::from_secs(60)).is_ok());
        assert_eq!(rl.used_at(USER, LimitKind::ExpandAnswer, t0 + Duration::from_secs(60)), 0);
    }

    #[test]
    fn global_budget_spans_kinds() {
        let rl = RateLimiter::new();
        let t0 = Instant::now();
        // Spread over minutes so the per-kind windows stay open.
        for i in 0..4u64 {
            fill(&rl, LimitKind::AssistantQuestion, 5, t0 + Duration::from_secs(i * 61));
        }
        let now = t0 + Duration::from_secs(4 * 61);
        assert_eq!(rl.used_at(USER, LimitKind::AssistantQuestion, now), 0);
        let err = rl.check_at(USER, LimitKind::Question, now).unwrap_err();
        assert_eq!(err.kind, LimitKind::Global);
        assert!(err.message().contains("20 запросов за 5 мин."));
        assert_eq!(rl.remaining_at(USER, LimitKind::Global, now), 0);
    }

    #[test]
    fn clear_user_resets() {
        let rl = RateLimiter::new();
        fill(&rl, LimitKind::Question, 10, Instant::now());
        assert!(rl.has_history(USER));
        assert!(rl.clear_user(USER));
        assert!(!rl.clear_user(USER));
        assert!(rl.check(USER, LimitKind::Question).is_ok());
    }

    #[test]
    fn cleanup_drops_idle_users() {
        let rl = RateLimiter::new();
        let t0 = Instant::now();
        rl.record_at(USER, LimitKind::Question, t0);
        rl.record_at(USER + 1, LimitKind::Question, t0 + Duration::from_secs(100));
        let removed = rl.cleanup_at(Duration::from_secs(50), t0 + Duration::from_secs(120));
        assert_eq!(removed, 1);
        assert_eq!(rl.tracked_users(), 1);
        assert!(!rl.has_history(USER));
    }

    #[test]
    fn limits_table() {
        let rl = RateLimiter::new();
        let limits = rl.limits();
        assert_eq!(limits.len(), 4);
        assert_eq!(LimitKind::Global.limit().window_seconds, 300);
        assert_eq!(LimitKind::AssistantQuestion.as_str(), "assistant_question");
    }

    #[tokio::test]
    async fn janitor_stops_on_cancel() {
        let limiter = Arc::new(RateLimiter::new());
        let janitor = RateLimitJanitor::new(limiter)
            .with_timing(Duration::from_millis(5), Duration::from_secs(1));
        let token = CancellationToken::new();
        let handle = tokio::spawn(Box::new(janitor).run(token.clone()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
        handle.await.unwrap().unwrap();
    }
}

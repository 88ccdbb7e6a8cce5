//! Who may talk to the bot.
//!
//! Every incoming event passes [`AccessGate::admit`] first. It registers
//! unknown users, promotes configured admins, turns away blocked accounts
//! and holds back everything except the consent flow until the user has
//! accepted personal-data processing.

use tracing::{info, warn};

use crate::error::AppError;
use crate::privacy::masked_user_id;
use crate::storage::{Database, NewUser, User, UserRole};

pub const CONSENT_READ: &str = "gdpr_read";
pub const CONSENT_ACCEPT: &str = "gdpr_accept";
pub const CONSENT_DECLINE: &str = "gdpr_decline";

/// Callback payloads reachable before consent.
pub const CONSENT_CALLBACKS: [&str; 3] = [CONSENT_ACCEPT, CONSENT_DECLINE, CONSENT_READ];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessEvent<'a> {
    /// A text message; `None` for stickers, photos and the like.
    Message(Option<&'a str>),
    /// An inline-button press with its payload.
    Callback(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    Blocked,
    /// Consent missing on a message.
    ConsentRequired,
    /// Consent missing on a button press; shown as an alert.
    ConsentRequiredAlert,
}

impl Denial {
    pub fn message(&self) -> &'static str {
        match self {
            Denial::Blocked => "❌ Ваш аккаунт заблокирован. Обратитесь к администратору.",
            Denial::ConsentRequired => {
                "⚠️ Для продолжения работы необходимо принять согласие на обработку персональных данных.\n\
                 Отправьте команду /start"
            }
            Denial::ConsentRequiredAlert => {
                "⚠️ Сначала примите согласие на обработку персональных данных"
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum Admission {
    Allowed(User),
    Denied(Denial),
}

fn is_start_command(text: &str) -> bool {
    let head = text.split_whitespace().next().unwrap_or_default();
    head == "/start" || head.starts_with("/start@")
}

#[derive(Debug, Clone)]
pub struct AccessGate {
    db: Database,
    admin_ids: Vec<i64>,
}

impl AccessGate {
    pub fn new(db: Database, admin_ids: Vec<i64>) -> Self {
        Self { db, admin_ids }
    }

    pub fn is_admin(user: &User) -> bool {
        user.role == UserRole::Admin
    }

    /// Load or register the sender, then decide whether `event` may proceed.
    pub async fn admit(&self, profile: NewUser, event: AccessEvent<'_>) -> Result<Admission, AppError> {
        let admin_ids = self.admin_ids.clone();
        let user = self
            .db
            .call("admit user", move |db| resolve_user(db, &profile, &admin_ids))
            .await?;

        if user.is_blocked {
            warn!(user = %masked_user_id(user.id, user.username.as_deref()), "blocked user attempted access");
            return Ok(Admission::Denied(Denial::Blocked));
        }

        if !user.gdpr_accepted {
            match event {
                AccessEvent::Callback(data) if !CONSENT_CALLBACKS.contains(&data) => {
                    return Ok(Admission::Denied(Denial::ConsentRequiredAlert));
                }
                AccessEvent::Message(text) if !text.is_some_and(is_start_command) => {
                    return Ok(Admission::Denied(Denial::ConsentRequired));
                }
                _ => {}
            }
        }

        Ok(Admission::Allowed(user))
    }
}

fn resolve_user(db: &Database, profile: &NewUser, admin_ids: &[i64]) -> Result<User, AppError> {
    let listed = admin_ids.contains(&profile.id);
    let Some(existing) = db.get_user(profile.id)? else {
        let role = if listed { UserRole::Admin } else { UserRole::Trial };
        info!(user = %masked_user_id(profile.id, profile.username.as_deref()), %role, "registering new user");
        return db.create_user(profile, role);
    };

    db.refresh_profile(profile)?;
    if listed && existing.role != UserRole::Admin {
        info!(user = %masked_user_id(profile.id, profile.username.as_deref()), "promoting listed id to admin");
        db.update_user_role(profile.id, UserRole::Admin)?;
    }
    db.get_user(profile.id)?
        .ok_or_else(|| AppError::Storage(format!("storage: user {} vanished during admission", profile.id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn gate(admins: Vec<i64>) -> (TempDir, AccessGate) {
        let dir = TempDir::new().unwrap();
        let db = Database::open(&dir.path().join("bot.db")).unwrap();
        (dir, AccessGate::new(db, admins))
    }

    fn profile(id: i64) -> NewUser {
        NewUser { id, username: Some("tester".into()), first_name: Some("Тест".into()), last_name: None }
    }

    #[test]
    fn start_command_variants() {
        assert!(is_start_command("/start"));
        assert!(is_start_command("/start@HseBot"));
        assert!(is_start_command("/start ref123"));
        assert!(!is_start_command("/stats"));
        assert!(!is_start_command("start"));
    }

    #[tokio::test]
    async fn new_user_gets_trial_and_needs_consent() {
        let (_d, gate) = gate(vec![]);
        let adm = gate.admit(profile(1), AccessEvent::Message(Some("привет"))).await.unwrap();
        assert!(matches!(adm, Admission::Denied(Denial::ConsentRequired)));

        let adm = gate.admit(profile(1), AccessEvent::Message(Some("/start"))).await.unwrap();
        let Admission::Allowed(user) = adm else { panic!("start must pass") };
        assert_eq!(user.role, UserRole::Trial);

        let adm = gate.admit(profile(1), AccessEvent::Callback("gdpr_accept")).await.unwrap();
        assert!(matches!(adm, Admission::Allowed(_)));
        let adm = gate.admit(profile(1), AccessEvent::Callback("admin_stats")).await.unwrap();
        assert!(matches!(adm, Admission::Denied(Denial::ConsentRequiredAlert)));
    }

    #[tokio::test]
    async fn consent_opens_everything() {
        let (_d, gate) = gate(vec![]);
        gate.admit(profile(2), AccessEvent::Message(Some("/start"))).await.unwrap();
        gate.db.accept_gdpr(2).unwrap();
        let adm = gate.admit(profile(2), AccessEvent::Message(None)).await.unwrap();
        assert!(matches!(adm, Admission::Allowed(_)));
    }

    #[tokio::test]
    async fn listed_ids_become_admin() {
        let (_d, gate) = gate(vec![3]);
        gate.db.create_user(&profile(3), UserRole::Employee).unwrap();
        let Admission::Allowed(user) = gate.admit(profile(3), AccessEvent::Message(Some("/start"))).await.unwrap() else {
            panic!("admin must pass");
        };
        assert!(AccessGate::is_admin(&user));

        let Admission::Allowed(fresh) = gate.admit(profile(4), AccessEvent::Message(Some("/start"))).await.unwrap() else {
            panic!("start must pass");
        };
        assert_eq!(fresh.role, UserRole::Trial);
    }

    #[tokio::test]
    async fn blocked_user_denied() {
        let (_d, gate) = gate(vec![]);
        gate.db.create_user(&profile(5), UserRole::Employee).unwrap();
        gate.db.block_user(5, true).unwrap();
        let adm = gate.admit(profile(5), AccessEvent::Message(Some("/start"))).await.unwrap();
        assert!(matches!(adm, Admission::Denied(Denial::Blocked)));
        assert!(Denial::Blocked.message().contains("заблокирован"));
    }
}

//! Row types returned by [`super::Database`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ── Roles ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    SpecialistOtDou,
    SpecialistOtOther,
    Employee,
    #[default]
    Trial,
}

impl UserRole {
    pub const ALL: [UserRole; 5] = [
        UserRole::Admin,
        UserRole::SpecialistOtDou,
        UserRole::SpecialistOtOther,
        UserRole::Employee,
        UserRole::Trial,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::SpecialistOtDou => "specialist_ot_dou",
            UserRole::SpecialistOtOther => "specialist_ot_other",
            UserRole::Employee => "employee",
            UserRole::Trial => "trial",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UserRole::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown role: {s}"))
    }
}

// ── Users ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: UserRole,
    pub is_active: bool,
    pub is_blocked: bool,
    pub assistant_thread_id: Option<String>,
    pub gdpr_accepted: bool,
    pub gdpr_accepted_at: Option<String>,
    pub total_requests: i64,
    pub last_request_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// Profile fields captured from the chat platform on first contact.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

// ── Messages ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }

    pub(super) fn parse(s: &str) -> Self {
        match s {
            "assistant" => MessageRole::Assistant,
            "system" => MessageRole::System,
            _ => MessageRole::User,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredMessage {
    pub id: i64,
    pub user_id: i64,
    pub role: MessageRole,
    pub content: String,
    pub created_at: String,
}

// ── Queries ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct NewQuery {
    pub user_id: i64,
    /// Always the anonymized question text.
    pub question: String,
    pub answer: String,
    pub ai_provider: String,
    pub ai_model: Option<String>,
    pub response_time: Option<f64>,
    pub tokens_used: Option<i64>,
    pub category: Option<String>,
    pub documents_used: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRecord {
    pub id: i64,
    pub user_id: i64,
    pub question: String,
    pub answer: String,
    pub ai_provider: String,
    pub ai_model: Option<String>,
    pub response_time: Option<f64>,
    pub tokens_used: Option<i64>,
    pub category: Option<String>,
    pub documents_used: Option<serde_json::Value>,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QueryStats {
    pub total_queries: i64,
    /// Seconds, rounded to two decimals.
    pub avg_response_time: f64,
}

// ── Documents ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub doc_type: String,
    pub url: Option<String>,
    pub file_path: Option<String>,
    pub openai_file_id: Option<String>,
    pub content: Option<String>,
    pub tags: Vec<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewDocument {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub doc_type: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub openai_file_id: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Partial update: `None` leaves the column untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub doc_type: Option<String>,
    pub url: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

// ── Settings & audit ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
    pub description: Option<String>,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub user_id: Option<i64>,
    pub action: String,
    pub details: serde_json::Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_str() {
        for role in UserRole::ALL {
            assert_eq!(role.as_str().parse::<UserRole>().unwrap(), role);
        }
        assert!("superuser".parse::<UserRole>().is_err());
        assert_eq!(UserRole::default(), UserRole::Trial);
    }

    #[test]
    fn role_serializes_snake_case() {
        let v = serde_json::to_value(UserRole::SpecialistOtDou).unwrap();
        assert_eq!(v, "specialist_ot_dou");
    }
}

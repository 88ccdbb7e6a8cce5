//! Integration tests for the SQLite store.
//!
//! Run with:
//!   cargo test --test test_storage

use serde_json::json;
use tempfile::TempDir;

use hse_consult_bot::storage::{
    Database, DocumentPatch, MessageRole, NewDocument, NewQuery, NewUser, UserRole, keys,
};

// ── helpers ──────────────────────────────────────────────────────────────────

fn open() -> (TempDir, Database) {
    let tmp = TempDir::new().expect("tempdir");
    let db = Database::open(&tmp.path().join("nested").join("bot.db")).expect("open should succeed");
    (tmp, db)
}

fn profile(id: i64, username: &str) -> NewUser {
    NewUser {
        id,
        username: Some(username.into()),
        first_name: Some("Иван".into()),
        last_name: None,
    }
}

fn query(user_id: i64, question: &str, provider: &str, category: &str, secs: f64) -> NewQuery {
    NewQuery {
        user_id,
        question: question.into(),
        answer: format!("ответ на «{question}»"),
        ai_provider: provider.into(),
        ai_model: Some("test-model".into()),
        response_time: Some(secs),
        tokens_used: Some(10),
        category: Some(category.into()),
        documents_used: None,
    }
}

// ── users ────────────────────────────────────────────────────────────────────

#[test]
fn user_lifecycle() {
    let (_tmp, db) = open();
    assert!(db.get_user(1).unwrap().is_none());

    let u = db.create_user(&profile(1, "ivan"), UserRole::Trial).unwrap();
    assert_eq!(u.role, UserRole::Trial);
    assert!(!u.gdpr_accepted);
    assert!(!u.is_blocked);
    assert_eq!(u.total_requests, 0);

    db.refresh_profile(&profile(1, "ivan_new")).unwrap();
    assert!(db.update_user_role(1, UserRole::SpecialistOtDou).unwrap());
    assert!(db.accept_gdpr(1).unwrap());
    db.set_user_thread_id(1, Some("thread_abc")).unwrap();
    db.increment_user_requests(1).unwrap();

    let u = db.get_user(1).unwrap().unwrap();
    assert_eq!(u.username.as_deref(), Some("ivan_new"));
    assert_eq!(u.role, UserRole::SpecialistOtDou);
    assert!(u.gdpr_accepted && u.gdpr_accepted_at.is_some());
    assert_eq!(u.assistant_thread_id.as_deref(), Some("thread_abc"));
    assert_eq!(u.total_requests, 1);
    assert!(u.last_request_at.is_some());

    db.set_user_thread_id(1, None).unwrap();
    assert!(db.get_user(1).unwrap().unwrap().assistant_thread_id.is_none());

    assert!(db.block_user(1, true).unwrap());
    assert!(db.get_user(1).unwrap().unwrap().is_blocked);
    assert!(!db.update_user_role(99, UserRole::Admin).unwrap());
}

#[test]
fn users_by_role_and_activity() {
    let (_tmp, db) = open();
    db.create_user(&profile(1, "a"), UserRole::Employee).unwrap();
    db.create_user(&profile(2, "b"), UserRole::Admin).unwrap();
    db.create_user(&profile(3, "c"), UserRole::Employee).unwrap();
    for _ in 0..3 {
        db.increment_user_requests(3).unwrap();
    }
    db.increment_user_requests(2).unwrap();

    assert_eq!(db.count_users().unwrap(), 3);
    assert_eq!(db.get_all_users(None).unwrap().len(), 3);
    let employees = db.get_all_users(Some(UserRole::Employee)).unwrap();
    assert_eq!(employees.len(), 2);
    assert!(employees.iter().all(|u| u.role == UserRole::Employee));

    let top: Vec<i64> = db.top_users(2).unwrap().iter().map(|u| u.id).collect();
    assert_eq!(top, vec![3, 2]);
}

#[test]
fn delete_cascades_but_keeps_audit() {
    let (_tmp, db) = open();
    db.create_user(&profile(7, "gone"), UserRole::Employee).unwrap();
    db.create_message(7, MessageRole::User, "вопрос").unwrap();
    db.create_query(&query(7, "вопрос", "openai", "Обучение", 1.0)).unwrap();
    db.create_audit_log(Some(7), "question_asked", &json!({ "n": 1 }), None, None)
        .unwrap();

    assert!(db.delete_user_data(7).unwrap());
    assert!(db.get_user(7).unwrap().is_none());
    assert!(db.get_user_messages(7, 10).unwrap().is_empty());
    assert!(db.get_user_queries(7, 10).unwrap().is_empty());

    let audit = db.get_user_audit_logs(7, 10).unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].details["n"], 1);

    assert!(!db.delete_user_data(7).unwrap());
}

// ── messages ─────────────────────────────────────────────────────────────────

#[test]
fn messages_return_latest_oldest_first() {
    let (_tmp, db) = open();
    db.create_user(&profile(1, "m"), UserRole::Employee).unwrap();
    for (i, role) in [MessageRole::User, MessageRole::Assistant, MessageRole::User].into_iter().enumerate() {
        db.create_message(1, role, &format!("m{i}")).unwrap();
    }
    let tail: Vec<String> = db.get_user_messages(1, 2).unwrap().into_iter().map(|m| m.content).collect();
    assert_eq!(tail, vec!["m1", "m2"]);

    assert_eq!(db.clear_user_messages(1).unwrap(), 3);
    assert!(db.get_user_messages(1, 10).unwrap().is_empty());
}

// ── queries & statistics ─────────────────────────────────────────────────────

#[test]
fn query_statistics() {
    let (_tmp, db) = open();
    db.create_user(&profile(1, "q"), UserRole::Employee).unwrap();
    db.create_query(&query(1, "СОУТ в офисе", "openai", "СОУТ", 1.0)).unwrap();
    db.create_query(&query(1, "Инструктаж", "gigachat", "Инструктажи", 2.0)).unwrap();
    db.create_query(&query(1, "Ещё СОУТ", "openai", "СОУТ", 3.0)).unwrap();

    let stats = db.get_queries_stats().unwrap();
    assert_eq!(stats.total_queries, 3);
    assert_eq!(stats.avg_response_time, 2.0);
    assert_eq!(db.total_tokens().unwrap(), 30);

    let cats = db.get_popular_categories(10).unwrap();
    assert_eq!(cats[0], ("СОУТ".to_string(), 2));
    assert_eq!(db.get_popular_categories(1).unwrap().len(), 1);
    let providers = db.provider_breakdown().unwrap();
    assert_eq!(
        providers,
        vec![("openai".to_string(), 2), ("gigachat".to_string(), 1)]
    );

    let recent = db.recent_queries(2).unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].question, "Ещё СОУТ");
    assert_eq!(db.get_user_queries(1, 10).unwrap().len(), 3);

    assert_eq!(db.queries_since("2000-01-01T00:00:00Z").unwrap(), 3);
    assert_eq!(db.queries_since("2999-01-01T00:00:00Z").unwrap(), 0);
}

#[test]
fn empty_statistics_are_zero() {
    let (_tmp, db) = open();
    let stats = db.get_queries_stats().unwrap();
    assert_eq!(stats.total_queries, 0);
    assert_eq!(stats.avg_response_time, 0.0);
    assert_eq!(db.total_tokens().unwrap(), 0);
    assert!(db.get_popular_categories(5).unwrap().is_empty());
}

// ── settings ─────────────────────────────────────────────────────────────────

#[test]
fn settings_upsert_keeps_description() {
    let (_tmp, db) = open();
    assert!(db.get_setting(keys::AI_PROVIDER).unwrap().is_none());
    db.set_setting(keys::AI_PROVIDER, "openai", Some("Текущий AI провайдер")).unwrap();
    db.set_setting(keys::AI_PROVIDER, "gigachat", None).unwrap();
    db.set_setting(keys::ASSISTANT_ID, "asst_1", None).unwrap();

    assert_eq!(db.get_setting(keys::AI_PROVIDER).unwrap().as_deref(), Some("gigachat"));
    let all = db.get_all_settings().unwrap();
    assert_eq!(all.len(), 2);
    let provider = all.iter().find(|s| s.key == keys::AI_PROVIDER).unwrap();
    assert_eq!(provider.description.as_deref(), Some("Текущий AI провайдер"));
}

// ── documents ────────────────────────────────────────────────────────────────

#[test]
fn document_crud_and_search() {
    let (_tmp, db) = open();
    let doc = db
        .create_document(&NewDocument {
            title: "Правила по охране труда при работе на высоте".into(),
            doc_type: "regulation".into(),
            content: Some("Работы на ВЫСОТЕ более 1,8 м".into()),
            tags: vec!["высота".into()],
            ..Default::default()
        })
        .unwrap();
    assert!(doc.is_active);
    assert_eq!(doc.tags, vec!["высота"]);
    db.create_document(&NewDocument {
        title: "Шаблон приказа".into(),
        doc_type: "template".into(),
        ..Default::default()
    })
    .unwrap();

    assert_eq!(db.search_documents("высоте", None, 10).unwrap().len(), 1);
    assert!(db.search_documents("высоте", Some("template"), 10).unwrap().is_empty());
    assert_eq!(db.get_all_documents(false, Some("template")).unwrap().len(), 1);

    let patched = db
        .update_document(doc.id, &DocumentPatch { is_active: Some(false), ..Default::default() })
        .unwrap()
        .unwrap();
    assert!(!patched.is_active);
    assert_eq!(patched.title, doc.title);
    assert_eq!(db.get_all_documents(true, None).unwrap().len(), 1);
    assert_eq!(db.get_all_documents(false, None).unwrap().len(), 2);
    assert!(db.search_documents("высоте", None, 10).unwrap().is_empty());

    assert!(db.delete_document(doc.id).unwrap());
    assert!(db.get_document(doc.id).unwrap().is_none());
    assert!(!db.delete_document(doc.id).unwrap());
    assert!(db.update_document(doc.id, &DocumentPatch::default()).unwrap().is_none());
}

#[tokio::test]
async fn call_moves_work_off_the_runtime() {
    let (_tmp, db) = open();
    db.call("create", |db| db.create_user(&profile(5, "async"), UserRole::Employee))
        .await
        .unwrap();
    let n = db.call("count", |db| db.count_users()).await.unwrap();
    assert_eq!(n, 1);
}

//! Admin HTTP panel: statistics, analytics, exports and settings over axum.
//!
//! Every route sits behind HTTP Basic auth (see [`auth`]). The panel is a
//! [`Component`]; `run()` drives the axum event loop and the shared
//! [`CancellationToken`] is wired to axum's graceful shutdown.
//!
//! ## URL layout
//!
//! ```text
//! GET    /                          → dashboard page
//! GET    /stats                     → statistics page
//! GET    /analytics                 → analytics page
//! GET    /api/health
//! GET    /api/stats
//! GET    /api/users?anonymize=
//! GET    /api/queries?limit=&user_id=
//! GET    /api/analytics/detailed
//! GET    /api/analytics/anonymized
//! GET    /api/export/queries?format=json|csv&anonymize=
//! GET    /api/settings
//! POST   /api/settings/{key}?value=
//! GET    /api/documents
//! POST   /api/documents
//! DELETE /api/documents/{id}
//! ```

mod api;
mod auth;
mod pages;

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{delete, get, post},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::state::CommsState;
use crate::error::AppError;
use crate::subsystems::runtime::{Component, ComponentFuture};
use crate::supervisor::health::ids;

// ── Shared request state ──────────────────────────────────────────────────────

/// Axum router state injected into every handler via [`axum::extract::State`].
///
/// Cheap to clone; all fields are reference-counted.
#[derive(Clone)]
pub struct AdminState {
    pub comms: Arc<CommsState>,
    /// Basic-auth password for user `admin`.
    pub password: Arc<str>,
}

// ── AdminPanel ────────────────────────────────────────────────────────────────

pub struct AdminPanel {
    state: Arc<CommsState>,
}

impl AdminPanel {
    pub fn new(state: Arc<CommsState>) -> Self {
        Self { state }
    }
}

impl Component for AdminPanel {
    fn id(&self) -> &str {
        ids::ADMIN
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(run_admin(self.state, shutdown))
    }
}

// ── Server loop ───────────────────────────────────────────────────────────────

async fn run_admin(comms: Arc<CommsState>, shutdown: CancellationToken) -> Result<(), AppError> {
    let health = comms.health().reporter(ids::ADMIN);
    let Some(password) = comms.config().secrets.admin_password() else {
        health.set_unhealthy("ADMIN_SECRET_KEY missing or placeholder").await;
        return Err(AppError::Config(
            "admin panel needs ADMIN_SECRET_KEY set to a real secret".into(),
        ));
    };
    let bind_addr = comms.config().admin.bind.clone();

    let router = build_router(AdminState { comms, password: Arc::from(password.as_str()) });

    let listener = match TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            health.set_unhealthy(format!("bind failed: {e}")).await;
            return Err(AppError::Comms(format!("admin bind failed on {bind_addr}: {e}")));
        }
    };

    info!(%bind_addr, "admin panel listening");
    health
        .set_healthy_with("listening", Some(serde_json::json!({ "bind": bind_addr })))
        .await;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AppError::Comms(format!("admin server error: {e}")))?;

    info!("admin panel shut down");
    Ok(())
}

// ── Router ────────────────────────────────────────────────────────────────────

pub fn build_router(state: AdminState) -> Router {
    Router::new()
        // Pages
        .route("/",                          get(pages::root))
        .route("/stats",                     get(pages::stats))
        .route("/analytics",                 get(pages::analytics))
        // API
        .route("/api/health",                get(api::health))
        .route("/api/stats",                 get(api::stats))
        .route("/api/users",                 get(api::users))
        .route("/api/queries",               get(api::queries))
        .route("/api/analytics/detailed",    get(api::detailed_analytics))
        .route("/api/analytics/anonymized",  get(api::anonymized_analytics))
        .route("/api/export/queries",        get(api::export_queries))
        .route("/api/settings",              get(api::settings))
        .route("/api/settings/{key}",        post(api::update_setting))
        .route("/api/documents",             get(api::documents).post(api::create_document))
        .route("/api/documents/{id}",        delete(api::delete_document))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_basic))
        .with_state(state)
}

pub mod ai;
pub mod auth;
pub mod categories;
pub mod chat;
pub mod config;
pub mod constants;
pub mod database;
pub mod deadlines;
pub mod error;
pub mod ledger;
pub mod models;
pub mod notification_target;
pub mod settings;
pub mod tasks;
pub mod telegram;
pub mod utils;

use std::sync::Arc;

use axum::{
    Json, Router, middleware,
    routing::{get, post},
};
use serde_json::{Value, json};

// Re-export types at crate root for convenient importing
pub use crate::database::Db;
pub use crate::error::{CoreError, CoreResult};

/// Application state shared across all request handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    /// Shared client for the AI providers and the Bot API
    pub http: reqwest::Client,
    pub config: Arc<config::Config>,
}

/// Every route, mounted under `/api`. Only `/health` and the Telegram
/// webhook are reachable without the API token.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/settings",
            get(settings::get_settings).put(settings::update_settings),
        )
        .route("/telegram/register", post(telegram::register))
        .route("/deadlines/notify", post(deadlines::trigger))
        .route("/ai/chat", post(chat::chat))
        .route(
            "/finance/categories",
            post(categories::create_category).get(categories::get_categories),
        )
        .route(
            "/finance/entries",
            post(ledger::create_entry_handler).get(ledger::get_entries),
        )
        .route("/finance/summary", get(ledger::get_summary))
        .route("/finance/ai-feedback", post(chat::ai_feedback))
        .route("/tasks", post(tasks::create_task).get(tasks::get_tasks))
        .route("/tasks/{id}/archive", post(tasks::archive_task))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_token,
        ));

    let api = Router::new()
        .route("/health", get(health))
        .route("/telegram/webhook", post(telegram::webhook))
        .merge(protected);

    Router::new().nest("/api", api).with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

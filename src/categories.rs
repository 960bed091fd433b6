use axum::{Json, extract::State, http::StatusCode};

use crate::constants::*;
use crate::error::CoreResult;
use crate::models::{Category, CreateCategoryPayload};
use crate::utils::{db_error_with_context, optional_text, trimmed, validate_string_length};
use crate::{AppState, Db};

pub fn validate_category_name(name: &str) -> Result<(), (StatusCode, String)> {
    validate_string_length(name, "Category name", MAX_CATEGORY_NAME_LENGTH)
}

fn extract_category_from_row(row: libsql::Row) -> CoreResult<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        color: row.get(2)?,
        icon: row.get(3)?,
    })
}

pub async fn list(db: &Db) -> CoreResult<Vec<Category>> {
    let conn = db.read().await;
    let mut rows = conn
        .query(
            "SELECT id, name, color, icon FROM finance_categories ORDER BY name ASC",
            (),
        )
        .await?;

    let mut categories = Vec::new();
    while let Some(row) = rows.next().await? {
        categories.push(extract_category_from_row(row)?);
    }
    Ok(categories)
}

pub async fn exists(db: &Db, category_id: i64) -> CoreResult<bool> {
    let conn = db.read().await;
    let mut rows = conn
        .query(
            "SELECT id FROM finance_categories WHERE id = ?",
            [category_id],
        )
        .await?;
    Ok(rows.next().await?.is_some())
}

pub async fn create(db: &Db, payload: &CreateCategoryPayload) -> CoreResult<Category> {
    let name = payload.name.trim().to_string();
    let color = trimmed(payload.color.as_deref());
    let icon = trimmed(payload.icon.as_deref());

    let conn = db.write().await;
    conn.execute(
        "INSERT INTO finance_categories (name, color, icon) VALUES (?, ?, ?)",
        (
            name.as_str(),
            optional_text(color.as_deref()),
            optional_text(icon.as_deref()),
        ),
    )
    .await?;

    Ok(Category {
        id: conn.last_insert_rowid(),
        name,
        color,
        icon,
    })
}

/// Case-insensitive exact match first, then the first case-insensitive
/// substring match. Done in Rust because SQLite's LOWER() only folds ASCII.
pub fn resolve<'a>(categories: &'a [Category], name: &str) -> Option<&'a Category> {
    let needle = name.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }

    categories
        .iter()
        .find(|category| category.name.to_lowercase() == needle)
        .or_else(|| {
            categories
                .iter()
                .find(|category| category.name.to_lowercase().contains(&needle))
        })
}

pub fn names(categories: &[Category]) -> String {
    categories
        .iter()
        .map(|category| category.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

// ---------------------------------------------------------------------------
// HTTP handlers
// ---------------------------------------------------------------------------

pub async fn create_category(
    State(app_state): State<AppState>,
    Json(payload): Json<CreateCategoryPayload>,
) -> Result<(StatusCode, Json<Category>), (StatusCode, String)> {
    validate_category_name(&payload.name)?;

    let category = create(&app_state.db, &payload)
        .await
        .map_err(|_| db_error_with_context("category creation failed"))?;

    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn get_categories(
    State(app_state): State<AppState>,
) -> Result<Json<Vec<Category>>, (StatusCode, String)> {
    let categories = list(&app_state.db)
        .await
        .map_err(|_| db_error_with_context("failed to query categories"))?;
    Ok(Json(categories))
}

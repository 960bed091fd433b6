use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::constants::MAX_TASK_TITLE_LENGTH;
use crate::error::CoreResult;
use crate::models::{CreateTaskPayload, Task};
use crate::utils::{db_error_with_context, optional_integer, optional_text, validate_string_length};
use crate::{AppState, Db};

const TASK_COLUMNS: &str = "id, title, description, deadline, archived";

fn extract_task_from_row(row: libsql::Row) -> CoreResult<Task> {
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        deadline: row.get(3)?,
        archived: row.get(4)?,
    })
}

async fn query_tasks(
    db: &Db,
    sql: &str,
    params: impl libsql::params::IntoParams + Send,
) -> CoreResult<Vec<Task>> {
    let conn = db.read().await;
    let mut rows = conn.query(sql, params).await?;

    let mut tasks = Vec::new();
    while let Some(row) = rows.next().await? {
        tasks.push(extract_task_from_row(row)?);
    }
    Ok(tasks)
}

pub async fn create(
    db: &Db,
    title: &str,
    description: Option<&str>,
    deadline: Option<OffsetDateTime>,
) -> CoreResult<Task> {
    let conn = db.write().await;
    let deadline = deadline.map(|value| value.unix_timestamp());
    conn.execute(
        "INSERT INTO tasks (title, description, deadline, archived, created_at) VALUES (?, ?, ?, FALSE, ?)",
        (
            title.trim(),
            optional_text(description),
            optional_integer(deadline),
            OffsetDateTime::now_utc().unix_timestamp(),
        ),
    )
    .await?;

    Ok(Task {
        id: conn.last_insert_rowid(),
        title: title.trim().to_string(),
        description: crate::utils::trimmed(description),
        deadline,
        archived: false,
    })
}

/// Returns `false` when no such task exists.
pub async fn archive(db: &Db, task_id: i64) -> CoreResult<bool> {
    let conn = db.write().await;
    let affected = conn
        .execute(
            "UPDATE tasks SET archived = TRUE, archived_at = ? WHERE id = ?",
            (OffsetDateTime::now_utc().unix_timestamp(), task_id),
        )
        .await?;
    Ok(affected > 0)
}

/// Non-archived tasks whose deadline lies in `[start, end]`, inclusive.
pub async fn due_between(
    db: &Db,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> CoreResult<Vec<Task>> {
    query_tasks(
        db,
        &format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE archived = FALSE AND deadline IS NOT NULL AND deadline BETWEEN ? AND ?"
        ),
        (start.unix_timestamp(), end.unix_timestamp()),
    )
    .await
}

pub async fn upcoming(db: &Db, after: OffsetDateTime, limit: u32) -> CoreResult<Vec<Task>> {
    query_tasks(
        db,
        &format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE archived = FALSE AND deadline IS NOT NULL AND deadline > ? \
             ORDER BY deadline ASC LIMIT ?"
        ),
        (after.unix_timestamp(), limit as i64),
    )
    .await
}

pub async fn active(db: &Db) -> CoreResult<Vec<Task>> {
    query_tasks(
        db,
        &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE archived = FALSE ORDER BY id ASC"),
        (),
    )
    .await
}

pub async fn active_ids(db: &Db) -> CoreResult<Vec<i64>> {
    Ok(active(db).await?.into_iter().map(|task| task.id).collect())
}

// ---------------------------------------------------------------------------
// HTTP handlers
// ---------------------------------------------------------------------------

pub async fn create_task(
    State(app_state): State<AppState>,
    Json(payload): Json<CreateTaskPayload>,
) -> Result<(StatusCode, Json<Task>), (StatusCode, String)> {
    validate_string_length(&payload.title, "Task title", MAX_TASK_TITLE_LENGTH)?;

    let deadline = match payload.deadline.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => Some(OffsetDateTime::parse(raw, &Rfc3339).map_err(|_| {
            (
                StatusCode::BAD_REQUEST,
                "Deadline must be an RFC 3339 timestamp".to_string(),
            )
        })?),
        _ => None,
    };

    let task = create(
        &app_state.db,
        &payload.title,
        payload.description.as_deref(),
        deadline,
    )
    .await
    .map_err(|_| db_error_with_context("task creation failed"))?;

    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn get_tasks(
    State(app_state): State<AppState>,
) -> Result<Json<Vec<Task>>, (StatusCode, String)> {
    let tasks = active(&app_state.db)
        .await
        .map_err(|_| db_error_with_context("failed to query tasks"))?;
    Ok(Json(tasks))
}

pub async fn archive_task(
    State(app_state): State<AppState>,
    Path(task_id): Path<i64>,
) -> Result<StatusCode, (StatusCode, String)> {
    let archived = archive(&app_state.db, task_id)
        .await
        .map_err(|_| db_error_with_context("failed to archive task"))?;

    if archived {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, "Task not found".to_string()))
    }
}

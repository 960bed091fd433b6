use anyhow::Result;
use libsql::{Builder, Connection};
use std::{path::Path, sync::Arc};
use tokio::sync::RwLock;

use crate::constants::DATABASE_FILE;

const CREATE_SETTINGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS settings (
    key    TEXT PRIMARY KEY,
    value  TEXT NULL
);
"#;

const CREATE_FINANCE_CATEGORIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS finance_categories (
    id     INTEGER PRIMARY KEY AUTOINCREMENT,
    name   TEXT    NOT NULL,
    color  TEXT    NULL,
    icon   TEXT    NULL
);
"#;

const CREATE_FINANCE_ENTRIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS finance_entries (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    amount       REAL    NOT NULL,
    description  TEXT    NULL,
    category_id  INTEGER NULL REFERENCES finance_categories(id) ON DELETE SET NULL,
    date         TEXT    NOT NULL,
    source       TEXT    NOT NULL DEFAULT 'web',
    type         TEXT    NOT NULL DEFAULT 'expense',
    created_at   INTEGER NOT NULL
);
"#;

const CREATE_TASKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS tasks (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    title        TEXT    NOT NULL,
    description  TEXT    NULL,
    deadline     INTEGER NULL,
    archived     BOOLEAN NOT NULL DEFAULT FALSE,
    archived_at  INTEGER NULL,
    created_at   INTEGER NOT NULL
);
"#;

const CREATE_ENTRIES_DATE_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_finance_entries_date ON finance_entries(date);
"#;

const CREATE_TASKS_DEADLINE_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_tasks_deadline ON tasks(archived, deadline);
"#;

pub type Db = Arc<RwLock<Connection>>;

/// Single application database (mydy.db) holding settings, finance and tasks.
pub async fn init_db(data_dir: &str) -> Result<Db> {
    tokio::fs::create_dir_all(data_dir).await?;
    let path = Path::new(data_dir).join(DATABASE_FILE);
    let db = Builder::new_local(path).build().await?;
    let conn = db.connect()?;

    conn.execute(CREATE_SETTINGS_TABLE, ()).await?;
    conn.execute(CREATE_FINANCE_CATEGORIES_TABLE, ()).await?;
    conn.execute(CREATE_FINANCE_ENTRIES_TABLE, ()).await?;
    conn.execute(CREATE_TASKS_TABLE, ()).await?;
    conn.execute(CREATE_ENTRIES_DATE_INDEX, ()).await?;
    conn.execute(CREATE_TASKS_DEADLINE_INDEX, ()).await?;

    Ok(Arc::new(RwLock::new(conn)))
}

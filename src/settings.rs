use std::collections::BTreeMap;

use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use time::UtcOffset;

use crate::ai::{AiConfig, AiProvider};
use crate::constants::*;
use crate::error::CoreResult;
use crate::utils::{db_error_with_context, parse_utc_offset, validate_string_length};
use crate::{AppState, Db};

// ---------------------------------------------------------------------------
// Key/value store
// ---------------------------------------------------------------------------

/// Absent keys read as `None`; that is "unset", never an error.
pub async fn get(db: &Db, key: &str) -> CoreResult<Option<String>> {
    let conn = db.read().await;
    let mut rows = conn
        .query("SELECT value FROM settings WHERE key = ?", [key])
        .await?;

    match rows.next().await? {
        Some(row) => Ok(row.get::<Option<String>>(0)?),
        None => Ok(None),
    }
}

pub async fn get_or(db: &Db, key: &str, default: &str) -> CoreResult<String> {
    Ok(get(db, key)
        .await?
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string()))
}

/// Writes a value; `None` deletes the key.
pub async fn set(db: &Db, key: &str, value: Option<&str>) -> CoreResult<()> {
    let Some(value) = value else {
        return delete(db, key).await;
    };

    let conn = db.write().await;
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?, ?) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        (key, value),
    )
    .await?;
    Ok(())
}

/// Returns `true` when this call created the key.
pub async fn insert_if_absent(db: &Db, key: &str, value: &str) -> CoreResult<bool> {
    let conn = db.write().await;
    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)",
            (key, value),
        )
        .await?;
    Ok(inserted > 0)
}

pub async fn delete(db: &Db, key: &str) -> CoreResult<()> {
    let conn = db.write().await;
    conn.execute("DELETE FROM settings WHERE key = ?", [key])
        .await?;
    Ok(())
}

pub async fn keys_with_prefix(db: &Db, prefix: &str) -> CoreResult<Vec<String>> {
    let conn = db.read().await;
    let mut rows = conn
        .query(
            "SELECT key FROM settings WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
            [prefix],
        )
        .await?;

    let mut keys = Vec::new();
    while let Some(row) = rows.next().await? {
        keys.push(row.get::<String>(0)?);
    }
    Ok(keys)
}

async fn all(db: &Db) -> CoreResult<BTreeMap<String, Option<String>>> {
    let conn = db.read().await;
    let mut rows = conn
        .query("SELECT key, value FROM settings ORDER BY key", ())
        .await?;

    let mut values = BTreeMap::new();
    while let Some(row) = rows.next().await? {
        values.insert(row.get::<String>(0)?, row.get::<Option<String>>(1)?);
    }
    Ok(values)
}

// ---------------------------------------------------------------------------
// Typed configuration views
// ---------------------------------------------------------------------------

/// Settings the Telegram dispatcher needs for one inbound update.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub bot_token: Option<String>,
    pub currency_symbol: String,
    pub utc_offset: UtcOffset,
    pub web_app_url: Option<String>,
}

/// Settings the deadline scheduler needs for one run.
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    pub enabled: bool,
    pub bot_token: Option<String>,
    pub target_chat: Option<i64>,
    pub utc_offset: UtcOffset,
}

pub async fn load_utc_offset(db: &Db) -> CoreResult<UtcOffset> {
    let raw = get_or(db, SETTING_USER_UTC_OFFSET, DEFAULT_UTC_OFFSET).await?;
    Ok(parse_utc_offset(&raw).unwrap_or(UtcOffset::UTC))
}

/// Opening balance added to all-time income minus expense. Unset or
/// unparsable values count as zero.
pub async fn load_initial_balance(db: &Db) -> CoreResult<f64> {
    let raw = get_or(db, SETTING_INITIAL_BALANCE, "0").await?;
    Ok(raw.trim().parse::<f64>().ok().filter(|value| value.is_finite()).unwrap_or(0.0))
}

pub async fn load_dispatch_config(db: &Db, app_url: Option<&str>) -> CoreResult<DispatchConfig> {
    Ok(DispatchConfig {
        bot_token: get(db, SETTING_TELEGRAM_BOT_TOKEN)
            .await?
            .filter(|token| !token.is_empty()),
        currency_symbol: get_or(db, SETTING_CURRENCY_SYMBOL, DEFAULT_CURRENCY_SYMBOL).await?,
        utc_offset: load_utc_offset(db).await?,
        web_app_url: app_url.map(|base| format!("{}/tma", base.trim_end_matches('/'))),
    })
}

pub async fn load_notify_config(db: &Db) -> CoreResult<NotifyConfig> {
    let enabled = get(db, SETTING_DEADLINE_NOTIFICATIONS).await?.as_deref() == Some("1");
    Ok(NotifyConfig {
        enabled,
        bot_token: get(db, SETTING_TELEGRAM_BOT_TOKEN)
            .await?
            .filter(|token| !token.is_empty()),
        target_chat: crate::notification_target::current(db).await?,
        utc_offset: load_utc_offset(db).await?,
    })
}

pub async fn load_ai_config(db: &Db) -> CoreResult<AiConfig> {
    let provider = AiProvider::parse(&get_or(db, SETTING_AI_PROVIDER, DEFAULT_AI_PROVIDER).await?)
        .unwrap_or(AiProvider::Anthropic);
    let api_key = match provider {
        AiProvider::Groq => match get(db, SETTING_GROQ_API_KEY).await? {
            Some(key) if !key.is_empty() => Some(key),
            _ => get(db, SETTING_AI_API_KEY).await?,
        },
        _ => get(db, SETTING_AI_API_KEY).await?,
    };

    Ok(AiConfig {
        provider,
        api_key: api_key.filter(|key| !key.is_empty()),
        model: get_or(db, SETTING_AI_MODEL, provider.default_model()).await?,
    })
}

// ---------------------------------------------------------------------------
// HTTP handlers
// ---------------------------------------------------------------------------

#[derive(Deserialize, Default)]
pub struct UpdateSettingsPayload {
    pub currency: Option<String>,
    pub currency_symbol: Option<String>,
    pub initial_balance: Option<f64>,
    pub ai_provider: Option<String>,
    pub ai_api_key: Option<String>,
    pub ai_model: Option<String>,
    pub groq_api_key: Option<String>,
    pub jina_api_key: Option<String>,
    pub user_utc_offset: Option<String>,
    pub deadline_notifications: Option<bool>,
}

pub fn validate_update(payload: &UpdateSettingsPayload) -> Result<(), (StatusCode, String)> {
    if let Some(currency) = &payload.currency {
        validate_string_length(currency, "Currency", MAX_CURRENCY_LENGTH)?;
    }
    if let Some(symbol) = &payload.currency_symbol {
        validate_string_length(symbol, "Currency symbol", MAX_CURRENCY_SYMBOL_LENGTH)?;
    }
    if let Some(balance) = payload.initial_balance
        && (!balance.is_finite() || balance < 0.0)
    {
        return Err((
            StatusCode::BAD_REQUEST,
            "Initial balance must be a non-negative number".to_string(),
        ));
    }
    if let Some(provider) = &payload.ai_provider
        && AiProvider::parse(provider).is_none()
    {
        return Err((
            StatusCode::BAD_REQUEST,
            "AI provider must be one of: anthropic, openai, groq".to_string(),
        ));
    }
    for (value, name) in [
        (&payload.ai_api_key, "AI API key"),
        (&payload.groq_api_key, "Groq API key"),
        (&payload.jina_api_key, "Jina API key"),
    ] {
        if let Some(value) = value {
            validate_string_length(value, name, MAX_API_KEY_LENGTH)?;
        }
    }
    if let Some(model) = &payload.ai_model {
        validate_string_length(model, "AI model", MAX_AI_MODEL_LENGTH)?;
    }
    if let Some(offset) = &payload.user_utc_offset
        && parse_utc_offset(offset).is_none()
    {
        return Err((
            StatusCode::BAD_REQUEST,
            "UTC offset must look like +05:00".to_string(),
        ));
    }
    Ok(())
}

pub async fn get_settings(
    State(app_state): State<AppState>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let values = all(&app_state.db)
        .await
        .map_err(|_| db_error_with_context("failed to read settings"))?;

    let mut body = serde_json::Map::new();
    for (key, value) in &values {
        if SECRET_SETTINGS.contains(&key.as_str())
            || key.starts_with(PENDING_TX_KEY_PREFIX)
            || key.starts_with(DEADLINE_FLAG_KEY_PREFIX)
        {
            continue;
        }
        body.insert(key.clone(), json!(value));
    }

    let is_set = |key: &str| values.get(key).is_some_and(|v| v.as_deref().is_some_and(|v| !v.is_empty()));
    body.insert("ai_api_key_set".to_string(), json!(is_set(SETTING_AI_API_KEY)));
    body.insert("groq_api_key_set".to_string(), json!(is_set(SETTING_GROQ_API_KEY)));
    body.insert("jina_api_key_set".to_string(), json!(is_set(SETTING_JINA_API_KEY)));
    body.insert(
        "telegram_connected".to_string(),
        json!(is_set(SETTING_TELEGRAM_BOT_TOKEN)),
    );

    Ok(Json(Value::Object(body)))
}

pub async fn update_settings(
    State(app_state): State<AppState>,
    Json(payload): Json<UpdateSettingsPayload>,
) -> Result<Json<Value>, (StatusCode, String)> {
    validate_update(&payload)?;

    let initial_balance = payload.initial_balance.map(|value| value.to_string());
    let notifications = payload
        .deadline_notifications
        .map(|enabled| if enabled { "1" } else { "0" }.to_string());
    let provider = payload
        .ai_provider
        .as_deref()
        .and_then(AiProvider::parse)
        .map(|provider| provider.as_str().to_string());

    let updates = [
        (SETTING_CURRENCY, payload.currency),
        (SETTING_CURRENCY_SYMBOL, payload.currency_symbol),
        (SETTING_INITIAL_BALANCE, initial_balance),
        (SETTING_AI_PROVIDER, provider),
        (SETTING_AI_API_KEY, payload.ai_api_key),
        (SETTING_AI_MODEL, payload.ai_model),
        (SETTING_GROQ_API_KEY, payload.groq_api_key),
        (SETTING_JINA_API_KEY, payload.jina_api_key),
        (SETTING_USER_UTC_OFFSET, payload.user_utc_offset),
        (SETTING_DEADLINE_NOTIFICATIONS, notifications),
    ];

    for (key, value) in updates {
        if let Some(value) = value {
            set(&app_state.db, key, Some(value.trim()))
                .await
                .map_err(|_| db_error_with_context("failed to save settings"))?;
        }
    }

    tracing::info!("Settings updated");
    Ok(Json(json!({ "ok": true, "message": "Настройки сохранены" })))
}

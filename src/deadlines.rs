use std::collections::HashSet;
use std::time::Duration as StdDuration;

use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use serde_json::{Value, json};
use teloxide::utils::html;
use time::{Duration, OffsetDateTime, UtcOffset, macros::format_description};

use crate::constants::*;
use crate::error::CoreResult;
use crate::models::Task;
use crate::settings::{self, NotifyConfig};
use crate::telegram::transport::{ChatTransport, TelegramTransport};
use crate::{AppState, Db, notification_target, tasks};

pub const TEST_NO_DEADLINES_TEXT: &str =
    "✅ Уведомления о дедлайнах работают! Активных дедлайнов нет.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Scheduled,
    /// Ignores windows and flags; previews the next few deadlines.
    Test,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Disabled,
    NotConfigured,
    Swept(SweepReport),
    TestSent(usize),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// `(task_id, threshold_hours)` pairs notified in this run.
    pub sent: Vec<(i64, i64)>,
    pub failed: usize,
    pub flags_removed: usize,
}

pub fn flag_key(task_id: i64, hours: i64) -> String {
    format!("{DEADLINE_FLAG_KEY_PREFIX}{task_id}_{hours}h")
}

fn task_id_from_flag(key: &str) -> Option<i64> {
    key.strip_prefix(DEADLINE_FLAG_KEY_PREFIX)?
        .split('_')
        .next()?
        .parse()
        .ok()
}

fn hours_label(hours: i64) -> String {
    match hours {
        1 => "1 час".to_string(),
        3 => "3 часа".to_string(),
        12 => "12 часов".to_string(),
        other => format!("{other} ч"),
    }
}

fn urgency_icon(hours: i64) -> &'static str {
    match hours {
        1 => "🔴",
        3 => "🟠",
        12 => "🟡",
        _ => "⏰",
    }
}

/// HTML notification for one task. Only the heading depends on `hours`.
pub fn notification_text(task: &Task, hours: i64, offset: UtcOffset) -> String {
    let deadline = task
        .deadline
        .and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok())
        .map(|deadline| {
            deadline
                .to_offset(offset)
                .format(format_description!("[day].[month].[year] [hour]:[minute]"))
                .unwrap_or_default()
        })
        .unwrap_or_default();

    let mut text = format!(
        "{} <b>Дедлайн через {}!</b>\n\n📋 {}\n🕐 {}",
        urgency_icon(hours),
        hours_label(hours),
        html::escape(&task.title),
        deadline
    );
    if let Some(description) = task.description.as_deref().filter(|d| !d.is_empty()) {
        text.push_str(&format!("\n📝 {}", html::escape(description)));
    }
    text
}

/// One pass over every threshold window around `now`.
///
/// A flag is claimed before sending so overlapping runs cannot notify twice.
/// If the send fails the claim is released and the next run retries.
pub async fn run_sweep(
    db: &Db,
    transport: &dyn ChatTransport,
    chat_id: i64,
    offset: UtcOffset,
    now: OffsetDateTime,
) -> CoreResult<SweepReport> {
    let mut report = SweepReport::default();
    let window = Duration::minutes(DEADLINE_WINDOW_MINUTES);

    for hours in DEADLINE_THRESHOLDS_HOURS {
        let target = now + Duration::hours(hours);
        let due = tasks::due_between(db, target - window, target + window).await?;

        for task in due {
            let key = flag_key(task.id, hours);
            if !settings::insert_if_absent(db, &key, "1").await? {
                continue;
            }

            match transport
                .send_html(chat_id, &notification_text(&task, hours, offset))
                .await
            {
                Ok(()) => {
                    tracing::info!(task_id = task.id, threshold = hours, "Deadline notification sent");
                    report.sent.push((task.id, hours));
                }
                Err(err) => {
                    tracing::error!(task_id = task.id, threshold = hours, error = %err, "Failed to send deadline notification");
                    if let Err(err) = settings::delete(db, &key).await {
                        tracing::error!(flag = %key, error = %err, "Failed to release deadline flag");
                    }
                    report.failed += 1;
                }
            }
        }
    }

    if now.to_offset(UtcOffset::UTC).hour() == DEADLINE_CLEANUP_HOUR {
        report.flags_removed = cleanup_flags(db).await?;
    }

    Ok(report)
}

/// Drops flags whose task is gone or archived.
pub async fn cleanup_flags(db: &Db) -> CoreResult<usize> {
    let active: HashSet<i64> = tasks::active_ids(db).await?.into_iter().collect();
    let mut removed = 0;

    for key in settings::keys_with_prefix(db, DEADLINE_FLAG_KEY_PREFIX).await? {
        let Some(task_id) = task_id_from_flag(&key) else {
            continue;
        };
        if !active.contains(&task_id) {
            settings::delete(db, &key).await?;
            removed += 1;
        }
    }

    if removed > 0 {
        tracing::info!(removed, "Cleaned up deadline notification flags");
    }
    Ok(removed)
}

/// Sends the next upcoming deadlines regardless of windows and flags.
pub async fn send_test(
    db: &Db,
    transport: &dyn ChatTransport,
    chat_id: i64,
    offset: UtcOffset,
    now: OffsetDateTime,
) -> CoreResult<usize> {
    let upcoming = tasks::upcoming(db, now, DEADLINE_TEST_TASK_LIMIT).await?;

    if upcoming.is_empty() {
        if let Err(err) = transport
            .send_message(chat_id, TEST_NO_DEADLINES_TEXT, None)
            .await
        {
            tracing::error!(error = %err, "Failed to send test notification");
            return Ok(0);
        }
        return Ok(1);
    }

    let mut sent = 0;
    for task in &upcoming {
        let hours = task
            .deadline
            .map(|deadline| (deadline - now.unix_timestamp()) / 3600)
            .unwrap_or_default();
        match transport
            .send_html(chat_id, &notification_text(task, hours, offset))
            .await
        {
            Ok(()) => sent += 1,
            Err(err) => {
                tracing::error!(task_id = task.id, error = %err, "Failed to send test notification")
            }
        }
    }
    Ok(sent)
}

/// Scheduler run against an already-built transport.
pub async fn run_with(
    db: &Db,
    config: &NotifyConfig,
    transport: &dyn ChatTransport,
    now: OffsetDateTime,
    mode: RunMode,
) -> CoreResult<RunOutcome> {
    if !config.enabled {
        return Ok(RunOutcome::Disabled);
    }

    let chat_id = match config.target_chat {
        Some(chat_id) => chat_id,
        None => match transport.latest_chat_id().await {
            Ok(Some(chat_id)) => {
                notification_target::record(db, chat_id).await?;
                tracing::info!(chat_id, "Resolved notification chat from recent updates");
                chat_id
            }
            Ok(None) => {
                tracing::info!("Notification chat unknown and no recent updates, skipping");
                return Ok(RunOutcome::NotConfigured);
            }
            Err(err) => {
                tracing::warn!(error = %err, "getUpdates failed");
                return Ok(RunOutcome::NotConfigured);
            }
        },
    };

    match mode {
        RunMode::Test => Ok(RunOutcome::TestSent(
            send_test(db, transport, chat_id, config.utc_offset, now).await?,
        )),
        RunMode::Scheduled => Ok(RunOutcome::Swept(
            run_sweep(db, transport, chat_id, config.utc_offset, now).await?,
        )),
    }
}

/// Loads settings, builds the Telegram transport and runs once.
pub async fn run(
    db: &Db,
    http: &reqwest::Client,
    now: OffsetDateTime,
    mode: RunMode,
) -> CoreResult<RunOutcome> {
    let config = settings::load_notify_config(db).await?;
    if !config.enabled {
        return Ok(RunOutcome::Disabled);
    }
    let Some(token) = config.bot_token.as_deref() else {
        tracing::info!("Bot token not set, skipping deadline check");
        return Ok(RunOutcome::NotConfigured);
    };

    let transport = TelegramTransport::new(token, http.clone());
    run_with(db, &config, &transport, now, mode).await
}

/// Background loop checking deadlines every `interval_secs`.
pub fn spawn_scheduler(db: Db, http: reqwest::Client, interval_secs: u64) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(StdDuration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            match run(&db, &http, OffsetDateTime::now_utc(), RunMode::Scheduled).await {
                Ok(RunOutcome::Swept(report)) if !report.sent.is_empty() || report.failed > 0 => {
                    tracing::info!(sent = report.sent.len(), failed = report.failed, "Deadline check finished");
                }
                Ok(_) => {}
                Err(err) => tracing::error!(error = %err, "Deadline check failed"),
            }
        }
    })
}

// ---------------------------------------------------------------------------
// HTTP handlers
// ---------------------------------------------------------------------------

#[derive(Deserialize, Default)]
pub struct NotifyQuery {
    #[serde(default)]
    pub test: bool,
}

/// Manual trigger. Always answers `ok`; the outcome is informational.
pub async fn trigger(
    State(app_state): State<AppState>,
    Query(query): Query<NotifyQuery>,
) -> Json<Value> {
    let mode = if query.test { RunMode::Test } else { RunMode::Scheduled };
    let result = match run(&app_state.db, &app_state.http, OffsetDateTime::now_utc(), mode).await {
        Ok(RunOutcome::Disabled) => json!("disabled"),
        Ok(RunOutcome::NotConfigured) => json!("not_configured"),
        Ok(RunOutcome::Swept(report)) => json!({ "sent": report.sent.len(), "failed": report.failed }),
        Ok(RunOutcome::TestSent(sent)) => json!({ "sent": sent }),
        Err(err) => {
            tracing::error!(error = %err, "Manual deadline check failed");
            json!("error")
        }
    };
    Json(json!({ "ok": true, "result": result }))
}

//! The chat that deadline notifications go to.
//!
//! Every inbound Telegram update records its chat here, so the scheduler
//! learns its destination without a separate registration step. Last write
//! wins.

use crate::Db;
use crate::constants::SETTING_TELEGRAM_CHAT_ID;
use crate::error::CoreResult;
use crate::settings;

pub async fn record(db: &Db, chat_id: i64) -> CoreResult<()> {
    settings::set(db, SETTING_TELEGRAM_CHAT_ID, Some(&chat_id.to_string())).await
}

pub async fn current(db: &Db) -> CoreResult<Option<i64>> {
    Ok(settings::get(db, SETTING_TELEGRAM_CHAT_ID)
        .await?
        .and_then(|value| value.trim().parse().ok()))
}

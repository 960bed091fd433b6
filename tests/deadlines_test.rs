mod common;

use common::{MockTransport, Sent, test_db};
use mydy_server::deadlines::{self, RunMode, RunOutcome, SweepReport, TEST_NO_DEADLINES_TEXT};
use mydy_server::models::Task;
use mydy_server::settings::{self, NotifyConfig};
use mydy_server::{notification_target, tasks};
use time::macros::{datetime, offset};
use time::{Duration, OffsetDateTime, UtcOffset};

const CHAT: i64 = 9001;

fn now() -> OffsetDateTime {
    datetime!(2026-03-10 10:00 UTC)
}

fn notify_config(target_chat: Option<i64>) -> NotifyConfig {
    NotifyConfig {
        enabled: true,
        bot_token: Some("123:test".to_string()),
        target_chat,
        utc_offset: UtcOffset::UTC,
    }
}

#[tokio::test]
async fn test_task_in_window_is_notified_once() -> anyhow::Result<()> {
    let db = test_db().await?;
    let inside = tasks::create(
        &db,
        "Сдать отчёт",
        Some("квартальный"),
        Some(now() + Duration::hours(12) + Duration::minutes(4)),
    )
    .await?;
    let after = tasks::create(
        &db,
        "Позже",
        None,
        Some(now() + Duration::hours(12) + Duration::minutes(6)),
    )
    .await?;
    let transport = MockTransport::new();

    let report = deadlines::run_sweep(&db, &transport, CHAT, UtcOffset::UTC, now()).await?;
    assert_eq!(report.sent, vec![(inside.id, 12)]);
    assert_eq!(report.failed, 0);

    let texts = transport.html_texts();
    assert_eq!(texts.len(), 1);
    assert!(texts[0].starts_with("🟡 <b>Дедлайн через 12 часов!</b>"));
    assert!(texts[0].contains("📋 Сдать отчёт"));
    assert!(texts[0].contains("📝 квартальный"));
    assert_eq!(
        settings::get(&db, &deadlines::flag_key(inside.id, 12)).await?.as_deref(),
        Some("1")
    );

    // Five minutes later the first task is still in its window but flagged,
    // while the second one has just entered it
    let later = now() + Duration::minutes(5);
    let report = deadlines::run_sweep(&db, &transport, CHAT, UtcOffset::UTC, later).await?;
    assert_eq!(report.sent, vec![(after.id, 12)]);
    assert!(report.sent.iter().all(|(task_id, _)| *task_id != inside.id));
    assert_eq!(transport.html_texts().len(), 2);

    let report = deadlines::run_sweep(&db, &transport, CHAT, UtcOffset::UTC, later).await?;
    assert_eq!(report, SweepReport::default());
    assert_eq!(transport.html_texts().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_each_threshold_is_independent() -> anyhow::Result<()> {
    let db = test_db().await?;
    let task = tasks::create(&db, "Созвон", None, Some(now() + Duration::hours(3))).await?;
    let transport = MockTransport::new();

    let report = deadlines::run_sweep(&db, &transport, CHAT, UtcOffset::UTC, now()).await?;
    assert_eq!(report.sent, vec![(task.id, 3)]);

    let two_hours_later = now() + Duration::hours(2);
    let report =
        deadlines::run_sweep(&db, &transport, CHAT, UtcOffset::UTC, two_hours_later).await?;
    assert_eq!(report.sent, vec![(task.id, 1)]);

    let texts = transport.html_texts();
    assert!(texts[0].starts_with("🟠 <b>Дедлайн через 3 часа!</b>"));
    assert!(texts[1].starts_with("🔴 <b>Дедлайн через 1 час!</b>"));
    Ok(())
}

#[tokio::test]
async fn test_archived_and_undated_tasks_are_skipped() -> anyhow::Result<()> {
    let db = test_db().await?;
    let archived = tasks::create(&db, "Старое", None, Some(now() + Duration::hours(1))).await?;
    tasks::archive(&db, archived.id).await?;
    tasks::create(&db, "Без срока", None, None).await?;
    let transport = MockTransport::new();

    let report = deadlines::run_sweep(&db, &transport, CHAT, UtcOffset::UTC, now()).await?;
    assert!(report.sent.is_empty());
    assert!(transport.sent().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_failed_send_is_retried_next_run() -> anyhow::Result<()> {
    let db = test_db().await?;
    let task = tasks::create(&db, "Оплатить", None, Some(now() + Duration::hours(1))).await?;
    let other = tasks::create(&db, "Позвонить", None, Some(now() + Duration::hours(3))).await?;

    // One failure does not stop the sweep
    let failing = MockTransport::failing();
    let report = deadlines::run_sweep(&db, &failing, CHAT, UtcOffset::UTC, now()).await?;
    assert!(report.sent.is_empty());
    assert_eq!(report.failed, 2);
    assert_eq!(settings::get(&db, &deadlines::flag_key(task.id, 1)).await?, None);
    assert_eq!(settings::get(&db, &deadlines::flag_key(other.id, 3)).await?, None);

    let transport = MockTransport::new();
    let report = deadlines::run_sweep(&db, &transport, CHAT, UtcOffset::UTC, now()).await?;
    assert_eq!(report.sent, vec![(other.id, 3), (task.id, 1)]);
    Ok(())
}

#[tokio::test]
async fn test_cleanup_runs_at_three_utc() -> anyhow::Result<()> {
    let db = test_db().await?;
    let active = tasks::create(&db, "Активная", None, None).await?;
    let archived = tasks::create(&db, "Архив", None, None).await?;
    tasks::archive(&db, archived.id).await?;

    for key in [
        deadlines::flag_key(active.id, 12),
        deadlines::flag_key(archived.id, 3),
        deadlines::flag_key(999, 1),
    ] {
        settings::set(&db, &key, Some("1")).await?;
    }
    let transport = MockTransport::new();

    // Outside the cleanup hour flags stay
    let report = deadlines::run_sweep(&db, &transport, CHAT, UtcOffset::UTC, now()).await?;
    assert_eq!(report.flags_removed, 0);

    let three_am = datetime!(2026-03-11 03:00 UTC);
    let report = deadlines::run_sweep(&db, &transport, CHAT, UtcOffset::UTC, three_am).await?;
    assert_eq!(report.flags_removed, 2);

    assert!(settings::get(&db, &deadlines::flag_key(active.id, 12)).await?.is_some());
    assert!(settings::get(&db, &deadlines::flag_key(archived.id, 3)).await?.is_none());
    assert!(settings::get(&db, &deadlines::flag_key(999, 1)).await?.is_none());

    // Nothing left to remove
    assert_eq!(deadlines::cleanup_flags(&db).await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_test_mode_without_deadlines() -> anyhow::Result<()> {
    let db = test_db().await?;
    let transport = MockTransport::new();

    let sent = deadlines::send_test(&db, &transport, CHAT, UtcOffset::UTC, now()).await?;
    assert_eq!(sent, 1);
    assert_eq!(
        transport.last_message().map(|(text, _)| text).as_deref(),
        Some(TEST_NO_DEADLINES_TEXT)
    );
    Ok(())
}

#[tokio::test]
async fn test_test_mode_previews_next_deadlines() -> anyhow::Result<()> {
    let db = test_db().await?;
    for (title, hours) in [("Четвёртая", 40), ("Первая", 2), ("Третья", 30), ("Вторая", 12)] {
        tasks::create(&db, title, None, Some(now() + Duration::hours(hours))).await?;
    }
    tasks::create(&db, "Прошедшая", None, Some(now() - Duration::hours(1))).await?;
    let transport = MockTransport::new();

    let sent = deadlines::send_test(&db, &transport, CHAT, UtcOffset::UTC, now()).await?;
    assert_eq!(sent, 3);

    let texts = transport.html_texts();
    assert_eq!(texts.len(), 3);
    assert!(texts[0].contains("Дедлайн через 2 ч!"));
    assert!(texts[0].contains("📋 Первая"));
    assert!(texts[1].contains("Дедлайн через 12 часов!"));
    assert!(texts[2].contains("📋 Третья"));

    // Test runs leave no flags behind
    assert!(
        settings::keys_with_prefix(&db, mydy_server::constants::DEADLINE_FLAG_KEY_PREFIX)
            .await?
            .is_empty()
    );
    Ok(())
}

#[tokio::test]
async fn test_run_with_respects_disabled() -> anyhow::Result<()> {
    let db = test_db().await?;
    tasks::create(&db, "Срочно", None, Some(now() + Duration::hours(1))).await?;
    let transport = MockTransport::new();
    let config = NotifyConfig {
        enabled: false,
        ..notify_config(Some(CHAT))
    };

    let outcome = deadlines::run_with(&db, &config, &transport, now(), RunMode::Scheduled).await?;
    assert_eq!(outcome, RunOutcome::Disabled);
    assert!(transport.sent().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_run_with_discovers_chat_from_updates() -> anyhow::Result<()> {
    let db = test_db().await?;
    let task = tasks::create(&db, "Срочно", None, Some(now() + Duration::hours(1))).await?;
    let transport = MockTransport::with_latest_chat(4242);

    let outcome =
        deadlines::run_with(&db, &notify_config(None), &transport, now(), RunMode::Scheduled)
            .await?;
    let RunOutcome::Swept(report) = outcome else {
        panic!("expected a sweep, got {outcome:?}");
    };
    assert_eq!(report.sent, vec![(task.id, 1)]);
    assert!(matches!(
        transport.sent().first(),
        Some(Sent::Html { chat_id: 4242, .. })
    ));
    assert_eq!(notification_target::current(&db).await?, Some(4242));
    Ok(())
}

#[tokio::test]
async fn test_run_with_without_any_chat() -> anyhow::Result<()> {
    let db = test_db().await?;
    tasks::create(&db, "Срочно", None, Some(now() + Duration::hours(1))).await?;
    let transport = MockTransport::new();

    let outcome =
        deadlines::run_with(&db, &notify_config(None), &transport, now(), RunMode::Test).await?;
    assert_eq!(outcome, RunOutcome::NotConfigured);
    assert!(transport.sent().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_run_without_token_is_not_configured() -> anyhow::Result<()> {
    let db = test_db().await?;
    settings::set(&db, "deadline_notifications", Some("1")).await?;

    let outcome =
        deadlines::run(&db, &reqwest::Client::new(), now(), RunMode::Scheduled).await?;
    assert_eq!(outcome, RunOutcome::NotConfigured);

    settings::set(&db, "deadline_notifications", Some("0")).await?;
    let outcome =
        deadlines::run(&db, &reqwest::Client::new(), now(), RunMode::Scheduled).await?;
    assert_eq!(outcome, RunOutcome::Disabled);
    Ok(())
}

#[test]
fn test_notification_text_escapes_and_localizes() {
    let task = Task {
        id: 1,
        title: "<Отчёт> & план".to_string(),
        description: None,
        deadline: Some(datetime!(2026-03-10 22:04 UTC).unix_timestamp()),
        archived: false,
    };

    let text = deadlines::notification_text(&task, 1, offset!(+5));
    assert_eq!(
        text,
        "🔴 <b>Дедлайн через 1 час!</b>\n\n📋 &lt;Отчёт&gt; &amp; план\n🕐 11.03.2026 03:04"
    );
}

mod common;

use common::{create_category, test_db, today};
use mydy_server::CoreError;
use mydy_server::constants::PENDING_TX_KEY_PREFIX;
use mydy_server::ledger;
use mydy_server::models::{EntrySource, TxKind};
use mydy_server::settings;
use mydy_server::telegram::draft::{AMOUNT_HINT, DraftFields, DraftStore, EditField, EditOutcome};
use time::macros::date;

fn fields(amount: f64, description: &str) -> DraftFields {
    DraftFields {
        kind: TxKind::Expense,
        amount,
        description: description.to_string(),
        category: "Без категории".to_string(),
        category_id: None,
        date: today(),
    }
}

#[tokio::test]
async fn test_start_draft_is_persisted_as_typed_record() -> anyhow::Result<()> {
    let db = test_db().await?;
    let store = DraftStore::new(&db);

    let draft = store.start(42, fields(60_000.0, "еда")).await?;
    assert_eq!(draft.chat_id, 42);
    assert_eq!(draft.editing_field, None);
    assert_eq!(draft.outbound_message_id, None);

    let loaded = store.load(42).await?.expect("draft stored");
    assert_eq!(loaded, draft);

    // Other chats are independent
    assert!(store.load(43).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_second_start_replaces_first_entirely() -> anyhow::Result<()> {
    let db = test_db().await?;
    let store = DraftStore::new(&db);

    let first = store.start(42, fields(100.0, "кофе")).await?;
    store.bind_message(42, first.id, 7).await?;
    store.begin_edit(42, EditField::Amount, 7).await?;

    let second = store.start(42, fields(250.0, "такси")).await?;
    let loaded = store.load(42).await?.expect("draft stored");

    assert_eq!(loaded.id, second.id);
    assert_eq!(loaded.amount, 250.0);
    assert_eq!(loaded.description, "такси");
    // Nothing carried over from the first draft
    assert_eq!(loaded.editing_field, None);
    assert_eq!(loaded.outbound_message_id, None);
    Ok(())
}

#[tokio::test]
async fn test_bind_message_ignores_replaced_draft() -> anyhow::Result<()> {
    let db = test_db().await?;
    let store = DraftStore::new(&db);

    let stale = store.start(42, fields(100.0, "кофе")).await?;
    store.start(42, fields(250.0, "такси")).await?;

    assert!(!store.bind_message(42, stale.id, 9).await?);
    assert_eq!(store.load(42).await?.expect("draft").outbound_message_id, None);
    Ok(())
}

#[tokio::test]
async fn test_begin_edit_without_draft_is_noop() -> anyhow::Result<()> {
    let db = test_db().await?;
    let store = DraftStore::new(&db);

    assert!(store.begin_edit(42, EditField::Date, 5).await?.is_none());
    assert!(store.load(42).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_apply_edit_value_without_active_edit_returns_unchanged() -> anyhow::Result<()> {
    let db = test_db().await?;
    let store = DraftStore::new(&db);

    assert_eq!(
        store.apply_edit_value(42, "2млн", today()).await?,
        EditOutcome::NoDraft
    );

    let draft = store.start(42, fields(100.0, "кофе")).await?;
    assert_eq!(
        store.apply_edit_value(42, "2млн", today()).await?,
        EditOutcome::NotEditing(draft.clone())
    );
    assert_eq!(store.load(42).await?, Some(draft));
    Ok(())
}

#[tokio::test]
async fn test_apply_edit_value_per_field() -> anyhow::Result<()> {
    let db = test_db().await?;
    let transport_id = create_category(&db, "Транспорт").await?;
    let store = DraftStore::new(&db);
    store.start(42, fields(100.0, "кофе")).await?;

    store.begin_edit(42, EditField::Amount, 11).await?;
    let EditOutcome::Applied(draft) = store.apply_edit_value(42, "2млн", today()).await? else {
        panic!("amount edit should apply");
    };
    assert_eq!(draft.amount, 2_000_000.0);
    assert_eq!(draft.editing_field, None);
    assert_eq!(draft.outbound_message_id, Some(11));

    store.begin_edit(42, EditField::Type, 11).await?;
    let EditOutcome::Applied(draft) = store.apply_edit_value(42, "доход", today()).await? else {
        panic!("type edit should apply");
    };
    assert_eq!(draft.kind, TxKind::Income);

    store.begin_edit(42, EditField::Date, 11).await?;
    let EditOutcome::Applied(draft) = store.apply_edit_value(42, "вчера", today()).await? else {
        panic!("date edit should apply");
    };
    assert_eq!(draft.date, date!(2026 - 03 - 09));

    store.begin_edit(42, EditField::Category, 11).await?;
    let EditOutcome::Applied(draft) = store.apply_edit_value(42, "транс", today()).await? else {
        panic!("category edit should apply");
    };
    assert_eq!(draft.category, "Транспорт");
    assert_eq!(draft.category_id, Some(transport_id));

    store.begin_edit(42, EditField::Category, 11).await?;
    let EditOutcome::Applied(draft) = store.apply_edit_value(42, " Подарки ", today()).await? else {
        panic!("unknown category should still apply");
    };
    assert_eq!(draft.category, "Подарки");
    assert_eq!(draft.category_id, None);

    store.begin_edit(42, EditField::Desc, 11).await?;
    let EditOutcome::Applied(draft) = store.apply_edit_value(42, "  такси домой ", today()).await? else {
        panic!("description edit should apply");
    };
    assert_eq!(draft.description, "такси домой");
    Ok(())
}

#[tokio::test]
async fn test_rejected_amount_keeps_waiting() -> anyhow::Result<()> {
    let db = test_db().await?;
    let store = DraftStore::new(&db);
    store.start(42, fields(100.0, "кофе")).await?;
    store.begin_edit(42, EditField::Amount, 11).await?;

    let outcome = store.apply_edit_value(42, "ноль", today()).await?;
    let EditOutcome::Rejected { draft, hint } = outcome else {
        panic!("garbage amount should be rejected");
    };
    assert_eq!(hint, AMOUNT_HINT);
    assert_eq!(draft.amount, 100.0);

    let stored = store.load(42).await?.expect("draft");
    assert_eq!(stored.editing_field, Some(EditField::Amount));
    Ok(())
}

#[tokio::test]
async fn test_end_edit_returns_to_drafted() -> anyhow::Result<()> {
    let db = test_db().await?;
    let store = DraftStore::new(&db);
    store.start(42, fields(100.0, "кофе")).await?;
    store.begin_edit(42, EditField::Desc, 3).await?;

    let draft = store.end_edit(42).await?.expect("draft");
    assert_eq!(draft.editing_field, None);
    assert_eq!(draft.description, "кофе");
    Ok(())
}

#[tokio::test]
async fn test_confirm_writes_telegram_entry_and_clears() -> anyhow::Result<()> {
    let db = test_db().await?;
    let food_id = create_category(&db, "Еда").await?;
    let store = DraftStore::new(&db);
    store
        .start(
            42,
            DraftFields {
                category: "Еда".to_string(),
                category_id: Some(food_id),
                ..fields(60_000.0, "еда")
            },
        )
        .await?;

    let confirmed = store.confirm(42).await?;
    assert_eq!(confirmed.entry.amount, 60_000.0);
    assert_eq!(confirmed.entry.source, EntrySource::Telegram);
    assert_eq!(confirmed.entry.kind, TxKind::Expense);
    assert_eq!(confirmed.entry.category_id, Some(food_id));
    assert_eq!(confirmed.draft.description, "еда");
    assert!(store.load(42).await?.is_none());

    let entries = ledger::entries_on(&db, today()).await?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].category_name.as_deref(), Some("Еда"));
    Ok(())
}

#[tokio::test]
async fn test_confirm_after_cancel_is_no_draft() -> anyhow::Result<()> {
    let db = test_db().await?;
    let store = DraftStore::new(&db);
    store.start(42, fields(100.0, "кофе")).await?;

    store.cancel(42).await?;
    assert!(matches!(store.confirm(42).await, Err(CoreError::NoDraft(42))));
    assert!(ledger::entries_on(&db, today()).await?.is_empty());

    // Cancelling again is harmless
    store.cancel(42).await?;
    Ok(())
}

#[tokio::test]
async fn test_unreadable_draft_reads_as_absent() -> anyhow::Result<()> {
    let db = test_db().await?;
    settings::set(&db, &format!("{PENDING_TX_KEY_PREFIX}42"), Some("{not json")).await?;

    let store = DraftStore::new(&db);
    assert!(store.load(42).await?.is_none());
    Ok(())
}

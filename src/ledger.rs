use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use std::collections::{BTreeMap, HashMap};

use time::{Date, Duration, OffsetDateTime};

use crate::categories;
use crate::constants::*;
use crate::error::{CoreError, CoreResult};
use crate::models::{
    Category, CategoryTotal, CreateEntryPayload, DaySummary, DayTotals, EntrySource,
    FinanceSummary, GetEntriesQuery, LedgerEntry, NewLedgerEntry, SummaryPeriod, SummaryQuery,
    TxKind,
};
use crate::utils::{
    db_error_with_context, format_iso_date, local_today, optional_integer, optional_text,
    parse_iso_date, round_cents, validate_date,
};
use crate::{AppState, Db, settings};

pub fn validate_amount(amount: f64) -> Result<f64, String> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err("Amount must be a positive number".to_string());
    }
    let rounded = round_cents(amount);
    if rounded <= 0.0 || rounded > MAX_AMOUNT {
        return Err(format!("Amount must be between 0.01 and {}", MAX_AMOUNT));
    }
    Ok(rounded)
}

fn extract_entry_from_row(row: libsql::Row) -> CoreResult<LedgerEntry> {
    let date: String = row.get(5)?;
    let source: String = row.get(6)?;
    let kind: String = row.get(7)?;

    Ok(LedgerEntry {
        id: row.get(0)?,
        amount: row.get(1)?,
        description: row.get(2)?,
        category_id: row.get(3)?,
        category_name: row.get(4)?,
        date: parse_iso_date(&date)
            .ok_or_else(|| CoreError::Validation(format!("invalid stored date '{date}'")))?,
        source: EntrySource::from_db(&source),
        kind: TxKind::from_db(&kind),
        created_at: row.get(8)?,
    })
}

/// Materializes one ledger entry. Positivity and category existence are
/// enforced here, not by callers.
pub async fn create_entry(db: &Db, entry: NewLedgerEntry) -> CoreResult<LedgerEntry> {
    let amount = validate_amount(entry.amount).map_err(CoreError::Validation)?;
    let description = entry.description.trim().to_string();
    if description.chars().count() > MAX_DESCRIPTION_LENGTH {
        return Err(CoreError::Validation(format!(
            "Description must be less than {} characters",
            MAX_DESCRIPTION_LENGTH
        )));
    }

    if let Some(category_id) = entry.category_id
        && !categories::exists(db, category_id).await?
    {
        return Err(CoreError::Validation("Category does not exist".to_string()));
    }

    let created_at = OffsetDateTime::now_utc().unix_timestamp();
    let date = format_iso_date(entry.date);

    let id = {
        let conn = db.write().await;
        conn.execute(
            "INSERT INTO finance_entries (amount, description, category_id, date, source, type, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            (
                amount,
                optional_text(Some(description.as_str())),
                optional_integer(entry.category_id),
                date.as_str(),
                entry.source.as_str(),
                entry.kind.as_str(),
                created_at,
            ),
        )
        .await?;
        conn.last_insert_rowid()
    };

    entry_by_id(db, id)
        .await?
        .ok_or(CoreError::Storage(libsql::Error::QueryReturnedNoRows))
}

const ENTRY_SELECT: &str = "SELECT e.id, e.amount, e.description, e.category_id, c.name, e.date, e.source, e.type, e.created_at \
     FROM finance_entries e LEFT JOIN finance_categories c ON c.id = e.category_id";

async fn entry_by_id(db: &Db, id: i64) -> CoreResult<Option<LedgerEntry>> {
    let conn = db.read().await;
    let mut rows = conn
        .query(&format!("{ENTRY_SELECT} WHERE e.id = ?"), [id])
        .await?;
    rows.next().await?.map(extract_entry_from_row).transpose()
}

pub async fn entries_on(db: &Db, date: Date) -> CoreResult<Vec<LedgerEntry>> {
    let conn = db.read().await;
    let mut rows = conn
        .query(
            &format!("{ENTRY_SELECT} WHERE e.date = ? ORDER BY e.id ASC"),
            [format_iso_date(date)],
        )
        .await?;

    let mut entries = Vec::new();
    while let Some(row) = rows.next().await? {
        entries.push(extract_entry_from_row(row)?);
    }
    Ok(entries)
}

pub async fn entries_between(db: &Db, from: Date, to: Date) -> CoreResult<Vec<LedgerEntry>> {
    let conn = db.read().await;
    let mut rows = conn
        .query(
            &format!("{ENTRY_SELECT} WHERE e.date BETWEEN ? AND ? ORDER BY e.date ASC, e.id ASC"),
            (format_iso_date(from), format_iso_date(to)),
        )
        .await?;

    let mut entries = Vec::new();
    while let Some(row) = rows.next().await? {
        entries.push(extract_entry_from_row(row)?);
    }
    Ok(entries)
}

pub async fn all_time_totals(db: &Db) -> CoreResult<DayTotals> {
    let conn = db.read().await;
    let mut rows = conn
        .query(
            "SELECT type, TOTAL(amount) FROM finance_entries GROUP BY type",
            (),
        )
        .await?;

    let mut totals = DayTotals::default();
    while let Some(row) = rows.next().await? {
        let kind: String = row.get(0)?;
        let sum: f64 = row.get(1)?;
        match TxKind::from_db(&kind) {
            TxKind::Expense => totals.expense += sum,
            TxKind::Income => totals.income += sum,
        }
    }
    totals.expense = round_cents(totals.expense);
    totals.income = round_cents(totals.income);
    Ok(totals)
}

pub fn totals(entries: &[LedgerEntry]) -> DayTotals {
    let mut totals = entries
        .iter()
        .fold(DayTotals::default(), |mut acc, entry| {
            match entry.kind {
                TxKind::Expense => acc.expense += entry.amount,
                TxKind::Income => acc.income += entry.amount,
            }
            acc
        });
    totals.expense = round_cents(totals.expense);
    totals.income = round_cents(totals.income);
    totals
}

pub async fn totals_on(db: &Db, date: Date) -> CoreResult<DayTotals> {
    Ok(totals(&entries_on(db, date).await?))
}

/// First and last day of the period containing `today`. Weeks start on
/// Monday.
pub fn period_range(period: SummaryPeriod, today: Date) -> (Date, Date) {
    match period {
        SummaryPeriod::Today => (today, today),
        SummaryPeriod::Week => {
            let back = i64::from(today.weekday().number_days_from_monday());
            let start = today.checked_sub(Duration::days(back)).unwrap_or(today);
            let end = start.checked_add(Duration::days(6)).unwrap_or(today);
            (start, end)
        }
        SummaryPeriod::Month => {
            let start = today.replace_day(1).unwrap_or(today);
            let end = (28..=31)
                .rev()
                .find_map(|day| today.replace_day(day).ok())
                .unwrap_or(today);
            (start, end)
        }
    }
}

/// Expense totals per category name, largest first.
pub fn expenses_by_category(
    entries: &[LedgerEntry],
    categories: &[Category],
) -> Vec<CategoryTotal> {
    let by_id: HashMap<i64, &Category> = categories
        .iter()
        .map(|category| (category.id, category))
        .collect();

    let mut groups: BTreeMap<String, CategoryTotal> = BTreeMap::new();
    for entry in entries.iter().filter(|entry| entry.kind == TxKind::Expense) {
        let name = entry
            .category_name
            .clone()
            .unwrap_or_else(|| UNCATEGORIZED_LABEL.to_string());
        let color = entry
            .category_id
            .and_then(|id| by_id.get(&id))
            .and_then(|category| category.color.clone());
        let group = groups.entry(name.clone()).or_insert(CategoryTotal {
            name,
            total: 0.0,
            count: 0,
            color,
        });
        group.total += entry.amount;
        group.count += 1;
    }

    let mut totals: Vec<CategoryTotal> = groups
        .into_values()
        .map(|mut group| {
            group.total = round_cents(group.total);
            group
        })
        .collect();
    totals.sort_by(|a, b| b.total.total_cmp(&a.total).then_with(|| a.name.cmp(&b.name)));
    totals
}

fn by_day(entries: &[LedgerEntry]) -> Vec<DaySummary> {
    let mut days: BTreeMap<Date, DayTotals> = BTreeMap::new();
    for entry in entries {
        let day = days.entry(entry.date).or_default();
        match entry.kind {
            TxKind::Expense => day.expense += entry.amount,
            TxKind::Income => day.income += entry.amount,
        }
    }
    days.into_iter()
        .map(|(date, totals)| DaySummary {
            date,
            income: round_cents(totals.income),
            expense: round_cents(totals.expense),
        })
        .collect()
}

pub async fn summary(db: &Db, period: SummaryPeriod, today: Date) -> CoreResult<FinanceSummary> {
    let (from, to) = period_range(period, today);
    let entries = entries_between(db, from, to).await?;
    let categories = categories::list(db).await?;
    let period_totals = totals(&entries);
    let all_time = all_time_totals(db).await?;
    let initial_balance = settings::load_initial_balance(db).await?;

    let count_expense = entries
        .iter()
        .filter(|entry| entry.kind == TxKind::Expense)
        .count();

    Ok(FinanceSummary {
        period,
        from,
        to,
        total_expense: period_totals.expense,
        total_income: period_totals.income,
        net: round_cents(period_totals.income - period_totals.expense),
        count: entries.len(),
        count_expense,
        count_income: entries.len() - count_expense,
        by_category: expenses_by_category(&entries, &categories),
        by_day: by_day(&entries),
        initial_balance,
        overall_balance: round_cents(initial_balance + all_time.income - all_time.expense),
    })
}

// ---------------------------------------------------------------------------
// HTTP handlers
// ---------------------------------------------------------------------------

pub async fn create_entry_handler(
    State(app_state): State<AppState>,
    Json(payload): Json<CreateEntryPayload>,
) -> Result<(StatusCode, Json<LedgerEntry>), (StatusCode, String)> {
    let date = validate_date(&payload.date)?;

    let entry = NewLedgerEntry {
        amount: payload.amount,
        description: payload.description.unwrap_or_default(),
        category_id: payload.category_id,
        date,
        source: EntrySource::Web,
        kind: payload.kind.unwrap_or(TxKind::Expense),
    };

    match create_entry(&app_state.db, entry).await {
        Ok(entry) => Ok((StatusCode::CREATED, Json(entry))),
        Err(CoreError::Validation(message)) => Err((StatusCode::BAD_REQUEST, message)),
        Err(_) => Err(db_error_with_context("entry creation failed")),
    }
}

pub async fn get_entries(
    State(app_state): State<AppState>,
    Query(query): Query<GetEntriesQuery>,
) -> Result<Json<Vec<LedgerEntry>>, (StatusCode, String)> {
    let date = match query.date.as_deref() {
        Some(raw) => validate_date(raw)?,
        None => {
            let offset = settings::load_utc_offset(&app_state.db)
                .await
                .map_err(|_| db_error_with_context("failed to read settings"))?;
            local_today(offset)
        }
    };

    let entries = entries_on(&app_state.db, date)
        .await
        .map_err(|_| db_error_with_context("failed to query entries"))?;
    Ok(Json(entries))
}

pub async fn get_summary(
    State(app_state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<FinanceSummary>, (StatusCode, String)> {
    let period = query
        .period
        .as_deref()
        .map(SummaryPeriod::parse)
        .unwrap_or_default();
    let offset = settings::load_utc_offset(&app_state.db)
        .await
        .map_err(|_| db_error_with_context("failed to read settings"))?;

    let report = summary(&app_state.db, period, local_today(offset))
        .await
        .map_err(|_| db_error_with_context("failed to build summary"))?;
    Ok(Json(report))
}

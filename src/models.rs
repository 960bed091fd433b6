use serde::{Deserialize, Serialize};
use time::Date;

use crate::utils::iso_date;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    Expense,
    Income,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::Expense => "expense",
            TxKind::Income => "income",
        }
    }

    pub fn from_db(value: &str) -> Self {
        if value == "income" {
            TxKind::Income
        } else {
            TxKind::Expense
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntrySource {
    Web,
    Telegram,
}

impl EntrySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntrySource::Web => "web",
            EntrySource::Telegram => "telegram",
        }
    }

    pub fn from_db(value: &str) -> Self {
        if value == "telegram" {
            EntrySource::Telegram
        } else {
            EntrySource::Web
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub color: Option<String>,
    pub icon: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateCategoryPayload {
    pub name: String,
    pub color: Option<String>,
    pub icon: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub id: i64,
    pub amount: f64,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub category_name: Option<String>,
    #[serde(with = "iso_date")]
    pub date: Date,
    pub source: EntrySource,
    #[serde(rename = "type")]
    pub kind: TxKind,
    pub created_at: i64,
}

/// Entry submitted to the ledger; positivity and category existence are
/// checked by `ledger::create_entry`.
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub amount: f64,
    pub description: String,
    pub category_id: Option<i64>,
    pub date: Date,
    pub source: EntrySource,
    pub kind: TxKind,
}

#[derive(Deserialize)]
pub struct CreateEntryPayload {
    pub amount: f64,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub date: String,
    #[serde(rename = "type")]
    pub kind: Option<TxKind>,
}

#[derive(Deserialize)]
pub struct GetEntriesQuery {
    pub date: Option<String>,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct DayTotals {
    pub expense: f64,
    pub income: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SummaryPeriod {
    #[default]
    Today,
    Week,
    Month,
}

impl SummaryPeriod {
    /// Unknown periods fall back to today.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "week" => SummaryPeriod::Week,
            "month" => SummaryPeriod::Month,
            _ => SummaryPeriod::Today,
        }
    }
}

#[derive(Deserialize)]
pub struct SummaryQuery {
    pub period: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CategoryTotal {
    pub name: String,
    pub total: f64,
    pub count: usize,
    pub color: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DaySummary {
    #[serde(with = "iso_date")]
    pub date: Date,
    pub income: f64,
    pub expense: f64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct FinanceSummary {
    pub period: SummaryPeriod,
    #[serde(with = "iso_date")]
    pub from: Date,
    #[serde(with = "iso_date")]
    pub to: Date,
    pub total_expense: f64,
    pub total_income: f64,
    pub net: f64,
    pub count: usize,
    pub count_expense: usize,
    pub count_income: usize,
    /// Expenses only, largest first.
    pub by_category: Vec<CategoryTotal>,
    /// Days with at least one entry, oldest first.
    pub by_day: Vec<DaySummary>,
    pub initial_balance: f64,
    pub overall_balance: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    /// Unix seconds, UTC.
    pub deadline: Option<i64>,
    pub archived: bool,
}

#[derive(Deserialize)]
pub struct CreateTaskPayload {
    pub title: String,
    pub description: Option<String>,
    /// RFC 3339 timestamp.
    pub deadline: Option<String>,
}

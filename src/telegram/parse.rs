//! Free-text coercion for amounts, dates and transaction types.
//!
//! None of these functions fail loudly: amounts come back as `None` for the
//! caller to turn into a hint, dates always resolve to something.

use std::sync::LazyLock;

use regex::Regex;
use time::{Date, Duration, Month};

use crate::models::TxKind;
use crate::utils::parse_iso_date;

static DAY_MONTH_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})[./-](\d{1,2})[./-](\d{4})$").unwrap());
static DAY_MONTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})[./-](\d{1,2})$").unwrap());
static DAY_ONLY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{1,2})$").unwrap());
static DAY_MONTH_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2})\s+(янв|фев|мар|апр|май|мая|июн|июл|авг|сен|окт|ноя|дек)").unwrap()
});
static ISO_DATE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

const MILLION_SUFFIXES: [&str; 3] = ["млн", "м", "m"];
const THOUSAND_SUFFIXES: [&str; 2] = ["к", "k"];

/// Accepts `60000`, `60 000`, `60,000`, `60к`, `60k`, `2млн`, `2.5m`.
/// Returns `None` unless the result is a positive finite number.
pub fn parse_amount(text: &str) -> Option<f64> {
    let clean: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect::<String>()
        .to_lowercase();

    let (number, multiplier) = split_multiplier(&clean);
    let value: f64 = number.parse().ok()?;
    let amount = value * multiplier;

    (amount.is_finite() && amount > 0.0).then_some(amount)
}

fn split_multiplier(clean: &str) -> (&str, f64) {
    for suffix in MILLION_SUFFIXES {
        if let Some(number) = clean.strip_suffix(suffix) {
            return (number, 1_000_000.0);
        }
    }
    for suffix in THOUSAND_SUFFIXES {
        if let Some(number) = clean.strip_suffix(suffix) {
            return (number, 1_000.0);
        }
    }
    (clean, 1.0)
}

/// Resolves a user-typed date relative to `today`. Never fails: anything
/// unrecognised, including impossible calendar dates, becomes `today`.
pub fn parse_date(text: &str, today: Date) -> Date {
    let text = text.trim().to_lowercase();

    match text.as_str() {
        "" | "сегодня" | "today" => return today,
        "вчера" | "yesterday" => return days_before(today, 1),
        "позавчера" | "два дня назад" => return days_before(today, 2),
        _ => {}
    }

    if let Some(caps) = DAY_MONTH_YEAR.captures(&text)
        && let Some(date) = calendar_date(&caps[3], &caps[2], &caps[1])
    {
        return date;
    }

    let year = today.year().to_string();
    if let Some(caps) = DAY_MONTH.captures(&text)
        && let Some(date) = calendar_date(&year, &caps[2], &caps[1])
    {
        return date;
    }

    if let Some(caps) = DAY_ONLY.captures(&text)
        && let Ok(day) = caps[1].parse::<u8>()
        && (1..=31).contains(&day)
        && let Ok(date) = Date::from_calendar_date(today.year(), today.month(), day)
    {
        return date;
    }

    if let Some(caps) = DAY_MONTH_NAME.captures(&text)
        && let Some(month) = month_from_abbreviation(&caps[2])
        && let Ok(day) = caps[1].parse::<u8>()
        && let Ok(date) = Date::from_calendar_date(today.year(), month, day)
    {
        return date;
    }

    if ISO_DATE.is_match(&text)
        && let Some(date) = parse_iso_date(&text)
    {
        return date;
    }

    today
}

/// Income only when the text says so; everything else is an expense.
pub fn parse_kind(text: &str) -> TxKind {
    let lower = text.trim().to_lowercase();
    if lower.contains("доход") || lower.contains("income") || lower == "+" {
        TxKind::Income
    } else {
        TxKind::Expense
    }
}

fn days_before(today: Date, days: i64) -> Date {
    today.checked_sub(Duration::days(days)).unwrap_or(today)
}

fn calendar_date(year: &str, month: &str, day: &str) -> Option<Date> {
    let year: i32 = year.parse().ok()?;
    let month = Month::try_from(month.parse::<u8>().ok()?).ok()?;
    let day: u8 = day.parse().ok()?;
    Date::from_calendar_date(year, month, day).ok()
}

fn month_from_abbreviation(abbr: &str) -> Option<Month> {
    let month = match abbr {
        "янв" => Month::January,
        "фев" => Month::February,
        "мар" => Month::March,
        "апр" => Month::April,
        "май" | "мая" => Month::May,
        "июн" => Month::June,
        "июл" => Month::July,
        "авг" => Month::August,
        "сен" => Month::September,
        "окт" => Month::October,
        "ноя" => Month::November,
        "дек" => Month::December,
        _ => return None,
    };
    Some(month)
}

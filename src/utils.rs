use axum::http::StatusCode;
use time::{Date, OffsetDateTime, UtcOffset, format_description::BorrowedFormatItem, macros::format_description};

const ISO_DATE: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");
const UTC_OFFSET: &[BorrowedFormatItem<'static>] =
    format_description!("[offset_hour sign:mandatory]:[offset_minute]");

pub fn db_error_with_context(context: &str) -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Database error: {}", context),
    )
}

pub fn validate_string_length(
    value: &str,
    field_name: &str,
    max_length: usize,
) -> Result<(), (StatusCode, String)> {
    if value.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("{} cannot be empty", field_name),
        ));
    }
    if value.chars().count() > max_length {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("{} must be less than {} characters", field_name, max_length),
        ));
    }
    Ok(())
}

pub fn validate_date(value: &str) -> Result<Date, (StatusCode, String)> {
    if value.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Date cannot be empty".to_string()));
    }

    parse_iso_date(value)
        .ok_or_else(|| (StatusCode::BAD_REQUEST, "Invalid date format".to_string()))
}

pub fn parse_iso_date(value: &str) -> Option<Date> {
    Date::parse(value.trim(), ISO_DATE).ok()
}

pub fn format_iso_date(date: Date) -> String {
    date.format(ISO_DATE).unwrap_or_else(|_| date.to_string())
}

/// Parses `+05:00` / `-03:30` style offsets.
pub fn parse_utc_offset(value: &str) -> Option<UtcOffset> {
    UtcOffset::parse(value.trim(), UTC_OFFSET).ok()
}

pub fn local_now(offset: UtcOffset) -> OffsetDateTime {
    OffsetDateTime::now_utc().to_offset(offset)
}

pub fn local_today(offset: UtcOffset) -> Date {
    local_now(offset).date()
}

pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

pub fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub fn optional_text(value: Option<&str>) -> libsql::Value {
    match trimmed(value) {
        Some(value) => libsql::Value::Text(value),
        None => libsql::Value::Null,
    }
}

pub fn optional_integer(value: Option<i64>) -> libsql::Value {
    value.map(libsql::Value::Integer).unwrap_or(libsql::Value::Null)
}

// Serde adapter storing a `Date` as `YYYY-MM-DD`
time::serde::format_description!(pub iso_date, Date, "[year]-[month]-[day]");

//! Month arithmetic and money rounding shared by the billing core.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};

/// Day of month after which payments incur the penalty.
pub const DUE_DAY: u32 = 20;

/// First day of the month containing `date`.
pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// First day of the month after `date`'s month.
pub fn next_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(date)
}

/// Due date of a bill issued for `month_year`.
pub fn due_date(month_year: NaiveDate) -> NaiveDate {
    month_year.with_day(DUE_DAY).unwrap_or(month_year)
}

/// Parse `YYYY-MM` or `YYYY-MM-DD` into the first day of that month.
pub fn parse_month(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{}-01", value), "%Y-%m-%d"))
        .ok()
        .map(first_of_month)
}

/// UTC instants bounding the month containing `date`, end exclusive.
pub fn month_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = first_of_month(date);
    (
        start.and_time(NaiveTime::MIN).and_utc(),
        next_month(start).and_time(NaiveTime::MIN).and_utc(),
    )
}

/// Round a peso amount to centavos, halves away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

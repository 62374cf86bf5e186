//! HTTP handlers for water-billing-service.

pub mod bills;
pub mod health;
pub mod payments;
pub mod reports;

use chrono::NaiveDate;
use service_core::error::AppError;

use crate::billing::month::parse_month;

/// Parse a `YYYY-MM` or `YYYY-MM-DD` month from a path or body.
pub(crate) fn month_param(value: &str) -> Result<NaiveDate, AppError> {
    parse_month(value).ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!(
            "Invalid month '{}', expected YYYY-MM or YYYY-MM-DD",
            value
        ))
    })
}

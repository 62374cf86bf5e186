//! Rates configuration model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One version of the utility's rates. Rows are append-only; the newest
/// `updated_utc` is the rate in effect.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RatesInfo {
    pub rates_id: Uuid,
    /// Price per cubic meter charged to consumers.
    pub consumer_rate: Decimal,
    /// Price per cubic meter drawn through the mother meter.
    pub mother_meter_rate: Decimal,
    /// Flat penalty for late or carried-over bills.
    pub penalty_rate: Decimal,
    /// Credit per cubic meter on the first subsidised cubic meters.
    pub subsidy_rate: Decimal,
    pub updated_utc: DateTime<Utc>,
}

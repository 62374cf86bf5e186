//! Meter reading models.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A consumer's meter reading for one month.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Reading {
    pub reading_id: Uuid,
    pub consumer_id: Uuid,
    pub month_year: NaiveDate,
    pub present_reading: Decimal,
    pub previous_reading: Decimal,
    pub created_utc: DateTime<Utc>,
}

impl Reading {
    /// Cubic meters consumed during the month.
    pub fn cubic_used(&self) -> Decimal {
        self.present_reading - self.previous_reading
    }
}

/// The shared supply meter's reading for one month.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MotherMeterReading {
    pub mother_reading_id: Uuid,
    pub month_year: NaiveDate,
    pub present_reading: Decimal,
    pub previous_reading: Decimal,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl MotherMeterReading {
    pub fn used(&self) -> Decimal {
        self.present_reading - self.previous_reading
    }
}

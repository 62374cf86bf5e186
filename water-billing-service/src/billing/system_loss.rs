//! System loss: water drawn through the mother meter but not billed to any
//! consumer, priced at the mother-meter rate and spread over consumer usage.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{MotherMeterReading, RatesInfo, Reading};

/// Result of a system-loss calculation for one month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemLoss {
    pub mother_used: Decimal,
    pub consumer_used: Decimal,
    pub mother_rate: Decimal,
    /// Loss charged per cubic meter of consumer usage. Negative when
    /// consumers reported more than the mother meter supplied.
    pub loss_fraction: Decimal,
}

impl SystemLoss {
    /// Compute the month's loss from the mother reading and every consumer
    /// reading of the same month.
    ///
    /// Returns `None` when consumers used nothing in total; the fraction is
    /// undefined then and generation must not proceed.
    pub fn compute(
        mother: &MotherMeterReading,
        readings: &[Reading],
        rates: &RatesInfo,
    ) -> Option<Self> {
        let consumer_used: Decimal = readings.iter().map(Reading::cubic_used).sum();
        if consumer_used.is_zero() {
            return None;
        }

        let mother_used = mother.used();
        let loss_fraction =
            ((mother_used - consumer_used) * rates.mother_meter_rate).checked_div(consumer_used)?;

        Some(Self {
            mother_used,
            consumer_used,
            mother_rate: rates.mother_meter_rate,
            loss_fraction,
        })
    }

    /// Loss allocated to a consumer who used `cubic_used`.
    pub fn allocate(&self, cubic_used: Decimal) -> Decimal {
        self.loss_fraction * cubic_used
    }
}

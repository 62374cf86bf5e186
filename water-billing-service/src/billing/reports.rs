//! Collection reports built from stored bills and payments.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::models::{BillStatus, ConsumerHistory, Payment, PaymentType};

/// Payments collected in one month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncomeSummary {
    pub month_year: NaiveDate,
    pub payment_count: usize,
    pub total_collected: Decimal,
    pub total_penalties: Decimal,
    pub by_type: BTreeMap<PaymentType, Decimal>,
}

/// Summarise `payments`, which the caller has already restricted to the month.
pub fn income_summary(month_year: NaiveDate, payments: &[Payment]) -> IncomeSummary {
    let mut by_type = BTreeMap::new();
    for payment in payments {
        *by_type.entry(payment.payment_type).or_insert(Decimal::ZERO) += payment.amount_paid;
    }

    IncomeSummary {
        month_year,
        payment_count: payments.len(),
        total_collected: payments.iter().map(|p| p.amount_paid).sum(),
        total_penalties: payments.iter().map(|p| p.penalty).sum(),
        by_type,
    }
}

/// An active consumer whose latest bill is overdue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisconnectionCandidate {
    pub consumer_id: Uuid,
    pub name: String,
    pub meter_number: String,
    pub overdue_bills: usize,
    /// Total of the latest bill, which already carries earlier arrears.
    pub outstanding: Decimal,
}

/// Consumers to consider for disconnection, largest outstanding amount first.
pub fn disconnection_candidates(histories: &[ConsumerHistory]) -> Vec<DisconnectionCandidate> {
    let mut candidates: Vec<DisconnectionCandidate> = histories
        .iter()
        .filter(|h| h.consumer.is_active())
        .filter_map(|h| {
            let latest = h.latest_bill()?;
            if latest.bill.status != BillStatus::Overdue {
                return None;
            }
            Some(DisconnectionCandidate {
                consumer_id: h.consumer.consumer_id,
                name: h.consumer.name.clone(),
                meter_number: h.consumer.meter_number.clone(),
                overdue_bills: h
                    .bills
                    .iter()
                    .filter(|b| b.bill.status == BillStatus::Overdue)
                    .count(),
                outstanding: latest.bill.total_amount - latest.amount_paid(),
            })
        })
        .collect();

    candidates.sort_by(|a, b| b.outstanding.cmp(&a.outstanding));
    candidates
}

//! Payment ledger: records and reverses payments and drives bill status.
//!
//! Status transitions:
//!
//! - `Unpaid`, `Partial`, `Overdue` -> `Paid` when a payment covers the amount due
//! - `Unpaid`, `Overdue` -> `Partial` when it does not
//! - any status -> `Unpaid` when a payment is reversed
//!
//! Only the payment being recorded is compared against the amount due;
//! earlier payments on the same bill are not accumulated.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::month::DUE_DAY;
use super::BillingError;
use crate::models::{Bill, BillStatus, Payment, PaymentType, RatesInfo};
use crate::services::metrics::{record_payment, record_payment_reversal};
use crate::services::BillingStore;

/// Fee charged on e-wallet payments: one peso per started hundred.
pub fn service_fee(total_amount: Decimal) -> Decimal {
    (total_amount / Decimal::ONE_HUNDRED).ceil()
}

/// What a payment owes and the status it leaves the bill in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentAssessment {
    pub penalty: Decimal,
    pub service_fee: Decimal,
    pub total_due: Decimal,
    pub resulting_status: BillStatus,
}

/// Assess a payment of `amount_paid` made on `paid_on` against `bill`.
pub fn assess_payment(
    bill: &Bill,
    amount_paid: Decimal,
    payment_type: PaymentType,
    rates: &RatesInfo,
    paid_on: NaiveDate,
) -> PaymentAssessment {
    let penalty = if paid_on.day() > DUE_DAY {
        rates.penalty_rate
    } else {
        Decimal::ZERO
    };
    let service_fee = if payment_type.is_electronic() {
        service_fee(bill.total_amount)
    } else {
        Decimal::ZERO
    };
    let total_due = bill.total_amount + penalty + service_fee;
    let resulting_status = if amount_paid >= total_due {
        BillStatus::Paid
    } else {
        BillStatus::Partial
    };

    PaymentAssessment {
        penalty,
        service_fee,
        total_due,
        resulting_status,
    }
}

/// Input for recording a payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordPayment {
    pub bill_id: Uuid,
    pub amount_paid: Decimal,
    pub payment_type: PaymentType,
    pub processed_by: Uuid,
}

/// A recorded payment and its effect on the bill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub payment: Payment,
    pub previous_status: BillStatus,
    pub bill_status: BillStatus,
    pub assessment: PaymentAssessment,
}

pub struct PaymentLedger {
    store: Arc<dyn BillingStore>,
}

impl PaymentLedger {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self { store }
    }

    /// Record a payment made at `paid_at`.
    ///
    /// The bill status update and the payment insert are committed together;
    /// a concurrent status change on the same bill surfaces as a conflict.
    #[instrument(skip(self, input), fields(bill_id = %input.bill_id, payment_type = %input.payment_type))]
    pub async fn record_payment(
        &self,
        input: RecordPayment,
        paid_at: DateTime<Utc>,
    ) -> Result<PaymentReceipt, BillingError> {
        if input.amount_paid <= Decimal::ZERO {
            return Err(BillingError::InvalidAmount);
        }

        let bill = self
            .store
            .get_bill(input.bill_id)
            .await?
            .ok_or(BillingError::InvalidBill(input.bill_id))?;
        let rates = self
            .store
            .current_rates()
            .await?
            .ok_or(BillingError::RatesMissing)?;

        let assessment = assess_payment(
            &bill,
            input.amount_paid,
            input.payment_type,
            &rates,
            paid_at.date_naive(),
        );

        let payment = Payment {
            payment_id: Uuid::new_v4(),
            bill_id: bill.bill_id,
            consumer_id: bill.consumer_id,
            processed_by: input.processed_by,
            payment_date: paid_at,
            amount_paid: input.amount_paid,
            penalty: assessment.penalty,
            payment_type: input.payment_type,
        };

        self.store
            .apply_payment(&payment, bill.status, assessment.resulting_status)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to apply payment");
                record_payment(input.payment_type.as_str(), "error", Decimal::ZERO);
                e
            })?;

        record_payment(
            input.payment_type.as_str(),
            assessment.resulting_status.as_str(),
            input.amount_paid,
        );
        info!(
            payment_id = %payment.payment_id,
            amount_paid = %payment.amount_paid,
            total_due = %assessment.total_due,
            from_status = %bill.status,
            to_status = %assessment.resulting_status,
            "Payment recorded"
        );

        Ok(PaymentReceipt {
            payment,
            previous_status: bill.status,
            bill_status: assessment.resulting_status,
            assessment,
        })
    }

    /// Delete a payment and reset its bill to `Unpaid` in one unit of work.
    #[instrument(skip(self), fields(payment_id = %payment_id))]
    pub async fn reverse_payment(&self, payment_id: Uuid) -> Result<(Payment, Bill), BillingError> {
        let (payment, bill) = self
            .store
            .reverse_payment(payment_id)
            .await?
            .ok_or(BillingError::PaymentNotFound(payment_id))?;

        record_payment_reversal();
        info!(bill_id = %bill.bill_id, "Payment reversed, bill reset to unpaid");

        Ok((payment, bill))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotifStatus;
    use rust_decimal_macros::dec;

    fn bill(total: Decimal) -> Bill {
        Bill {
            bill_id: Uuid::new_v4(),
            consumer_id: Uuid::new_v4(),
            reading_id: Uuid::new_v4(),
            mother_reading_id: Uuid::new_v4(),
            month_year: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            billing_date: Utc::now(),
            system_loss: Decimal::ZERO,
            subsidy: Decimal::ZERO,
            balance: Decimal::ZERO,
            total_amount: total,
            status: BillStatus::Unpaid,
            notif_status: NotifStatus::Sent,
            created_utc: Utc::now(),
            updated_utc: Utc::now(),
        }
    }

    fn rates() -> RatesInfo {
        RatesInfo {
            rates_id: Uuid::new_v4(),
            consumer_rate: dec!(25),
            mother_meter_rate: dec!(20),
            penalty_rate: dec!(50),
            subsidy_rate: dec!(2),
            updated_utc: Utc::now(),
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn late_cash_payment_covering_penalty_is_paid() {
        let a = assess_payment(&bill(dec!(1000)), dec!(1050), PaymentType::Cash, &rates(), day(25));
        assert_eq!(a.penalty, dec!(50));
        assert_eq!(a.service_fee, dec!(0));
        assert_eq!(a.total_due, dec!(1050));
        assert_eq!(a.resulting_status, BillStatus::Paid);
    }

    #[test]
    fn late_cash_payment_short_of_penalty_is_partial() {
        let a = assess_payment(&bill(dec!(1000)), dec!(1000), PaymentType::Cash, &rates(), day(25));
        assert_eq!(a.resulting_status, BillStatus::Partial);
    }

    #[test]
    fn no_penalty_on_the_due_day() {
        let a = assess_payment(&bill(dec!(1000)), dec!(1000), PaymentType::Cash, &rates(), day(20));
        assert_eq!(a.penalty, dec!(0));
        assert_eq!(a.resulting_status, BillStatus::Paid);
    }

    #[test]
    fn e_wallet_payments_add_service_fee() {
        let a = assess_payment(&bill(dec!(1000)), dec!(1000), PaymentType::GCash, &rates(), day(5));
        assert_eq!(a.service_fee, dec!(10));
        assert_eq!(a.total_due, dec!(1010));
        assert_eq!(a.resulting_status, BillStatus::Partial);

        let a = assess_payment(&bill(dec!(1000)), dec!(1010), PaymentType::Maya, &rates(), day(5));
        assert_eq!(a.resulting_status, BillStatus::Paid);
    }

    #[test]
    fn service_fee_rounds_up() {
        assert_eq!(service_fee(dec!(250.01)), dec!(3));
        assert_eq!(service_fee(dec!(300)), dec!(3));
        assert_eq!(service_fee(dec!(0.5)), dec!(1));
    }
}

//! Storage contracts used by the billing core.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use uuid::Uuid;

use crate::billing::GenerationPlan;
use crate::models::{
    Bill, BillStatus, BillWithPayments, ConsumerHistory, MotherMeterReading, NotifStatus, Payment,
    RatesInfo, Reading,
};

#[async_trait]
pub trait RatesProvider: Send + Sync {
    /// The newest rates version, if any has been configured.
    async fn current_rates(&self) -> Result<Option<RatesInfo>, AppError>;
}

#[async_trait]
pub trait MeterReadingStore: Send + Sync {
    async fn mother_reading(
        &self,
        month_year: NaiveDate,
    ) -> Result<Option<MotherMeterReading>, AppError>;

    async fn consumer_readings(&self, month_year: NaiveDate) -> Result<Vec<Reading>, AppError>;

    /// Create the mother reading placeholder for `month_year` with
    /// `previous_reading` and a zero present reading. When the month already
    /// has a reading only its previous reading is replaced.
    async fn upsert_next_mother_reading(
        &self,
        month_year: NaiveDate,
        previous_reading: Decimal,
    ) -> Result<MotherMeterReading, AppError>;
}

#[async_trait]
pub trait ConsumerStore: Send + Sync {
    /// Active consumers with every reading and bill on record.
    async fn active_consumers_with_history(&self) -> Result<Vec<ConsumerHistory>, AppError>;
}

#[async_trait]
pub trait BillStore: Send + Sync {
    async fn get_bill(&self, bill_id: Uuid) -> Result<Option<Bill>, AppError>;

    async fn month_bills(&self, month_year: NaiveDate) -> Result<Vec<BillWithPayments>, AppError>;

    /// Write a planned month in one transaction: insert the drafted bills,
    /// promote the predecessors of the inserted ones from `Unpaid` to
    /// `Overdue` and upsert next month's mother reading placeholder. A draft
    /// whose consumer already has a bill for the month is skipped. Fails with
    /// `Conflict`, writing nothing, when a draft's previous bill no longer has
    /// the status and payments it was planned from. Returns the ids of the
    /// bills actually inserted.
    async fn commit_generation(&self, plan: &GenerationPlan) -> Result<Vec<Uuid>, AppError>;

    async fn update_notif_status(&self, bill_id: Uuid, status: NotifStatus)
        -> Result<(), AppError>;

    /// Delete every bill of the month and next month's mother reading in one
    /// transaction. Fails with `Conflict` if any of the bills has a payment.
    async fn delete_month_bills(&self, month_year: NaiveDate) -> Result<u64, AppError>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Insert `payment` and move its bill from `expected` to `new_status`.
    /// Fails with `Conflict` when the bill is no longer in `expected`.
    async fn apply_payment(
        &self,
        payment: &Payment,
        expected: BillStatus,
        new_status: BillStatus,
    ) -> Result<(), AppError>;

    /// Delete a payment and reset its bill to `Unpaid`.
    async fn reverse_payment(&self, payment_id: Uuid) -> Result<Option<(Payment, Bill)>, AppError>;

    /// Payments with `start <= payment_date < end`.
    async fn payments_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Payment>, AppError>;
}

/// Everything the billing service needs from storage.
#[async_trait]
pub trait BillingStore:
    RatesProvider + MeterReadingStore + ConsumerStore + BillStore + PaymentStore
{
    async fn health_check(&self) -> Result<(), AppError>;
}

//! In-memory store for tests and local runs without PostgreSQL.
//!
//! A single lock guards all tables, so every operation is atomic and the
//! uniqueness rules of the PostgreSQL schema hold here too.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::store::{
    BillStore, BillingStore, ConsumerStore, MeterReadingStore, PaymentStore, RatesProvider,
};
use crate::billing::month::next_month;
use crate::billing::{GenerationPlan, PriorBillState};
use crate::models::{
    Bill, BillStatus, BillWithPayments, Consumer, ConsumerHistory, MotherMeterReading, NotifStatus,
    Payment, RatesInfo, Reading,
};

#[derive(Default)]
struct Tables {
    rates: Vec<RatesInfo>,
    consumers: Vec<Consumer>,
    readings: Vec<Reading>,
    mother_readings: Vec<MotherMeterReading>,
    bills: Vec<Bill>,
    payments: Vec<Payment>,
}

impl Tables {
    fn with_payments(&self, bill: &Bill) -> BillWithPayments {
        BillWithPayments {
            bill: bill.clone(),
            payments: self
                .payments
                .iter()
                .filter(|p| p.bill_id == bill.bill_id)
                .cloned()
                .collect(),
        }
    }

    fn bill_mut(&mut self, bill_id: Uuid) -> Option<&mut Bill> {
        self.bills.iter_mut().find(|b| b.bill_id == bill_id)
    }

    fn prior_state(&self, bill_id: Uuid) -> Option<PriorBillState> {
        self.bills
            .iter()
            .find(|b| b.bill_id == bill_id)
            .map(|b| PriorBillState::of(&self.with_payments(b)))
    }

    // An entered present reading survives a re-run.
    fn upsert_mother_placeholder(
        &mut self,
        month_year: NaiveDate,
        previous_reading: Decimal,
    ) -> MotherMeterReading {
        let now = Utc::now();

        if let Some(existing) = self
            .mother_readings
            .iter_mut()
            .find(|m| m.month_year == month_year)
        {
            existing.previous_reading = previous_reading;
            existing.updated_utc = now;
            return existing.clone();
        }

        let reading = MotherMeterReading {
            mother_reading_id: Uuid::new_v4(),
            month_year,
            present_reading: Decimal::ZERO,
            previous_reading,
            created_utc: now,
            updated_utc: now,
        };
        self.mother_readings.push(reading.clone());
        reading
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_rates(&self, rates: RatesInfo) {
        self.tables.write().await.rates.push(rates);
    }

    pub async fn insert_consumer(&self, consumer: Consumer) {
        self.tables.write().await.consumers.push(consumer);
    }

    /// Insert a reading, replacing the consumer's reading for the same month.
    pub async fn insert_reading(&self, reading: Reading) {
        let mut tables = self.tables.write().await;
        tables
            .readings
            .retain(|r| !(r.consumer_id == reading.consumer_id && r.month_year == reading.month_year));
        tables.readings.push(reading);
    }

    /// Remove a consumer's reading for a month, as a disconnection does.
    pub async fn remove_reading(&self, consumer_id: Uuid, month_year: NaiveDate) {
        self.tables
            .write()
            .await
            .readings
            .retain(|r| !(r.consumer_id == consumer_id && r.month_year == month_year));
    }

    /// Insert a mother reading, replacing the one for the same month.
    pub async fn insert_mother_reading(&self, reading: MotherMeterReading) {
        let mut tables = self.tables.write().await;
        tables
            .mother_readings
            .retain(|m| m.month_year != reading.month_year);
        tables.mother_readings.push(reading);
    }

    pub async fn insert_bill(&self, bill: Bill) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        if tables
            .bills
            .iter()
            .any(|b| b.consumer_id == bill.consumer_id && b.month_year == bill.month_year)
        {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Bill already exists for consumer {} in {}",
                bill.consumer_id,
                bill.month_year
            )));
        }
        tables.bills.push(bill);
        Ok(())
    }

    pub async fn insert_payment(&self, payment: Payment) {
        self.tables.write().await.payments.push(payment);
    }

    pub async fn bill(&self, bill_id: Uuid) -> Option<Bill> {
        self.tables
            .read()
            .await
            .bills
            .iter()
            .find(|b| b.bill_id == bill_id)
            .cloned()
    }

    pub async fn bills(&self) -> Vec<Bill> {
        self.tables.read().await.bills.clone()
    }

    pub async fn payments(&self) -> Vec<Payment> {
        self.tables.read().await.payments.clone()
    }

    pub async fn readings(&self) -> Vec<Reading> {
        self.tables.read().await.readings.clone()
    }
}

#[async_trait]
impl RatesProvider for InMemoryStore {
    async fn current_rates(&self) -> Result<Option<RatesInfo>, AppError> {
        Ok(self
            .tables
            .read()
            .await
            .rates
            .iter()
            .max_by_key(|r| r.updated_utc)
            .cloned())
    }
}

#[async_trait]
impl MeterReadingStore for InMemoryStore {
    async fn mother_reading(
        &self,
        month_year: NaiveDate,
    ) -> Result<Option<MotherMeterReading>, AppError> {
        Ok(self
            .tables
            .read()
            .await
            .mother_readings
            .iter()
            .find(|m| m.month_year == month_year)
            .cloned())
    }

    async fn consumer_readings(&self, month_year: NaiveDate) -> Result<Vec<Reading>, AppError> {
        Ok(self
            .tables
            .read()
            .await
            .readings
            .iter()
            .filter(|r| r.month_year == month_year)
            .cloned()
            .collect())
    }

    async fn upsert_next_mother_reading(
        &self,
        month_year: NaiveDate,
        previous_reading: Decimal,
    ) -> Result<MotherMeterReading, AppError> {
        Ok(self
            .tables
            .write()
            .await
            .upsert_mother_placeholder(month_year, previous_reading))
    }
}

#[async_trait]
impl ConsumerStore for InMemoryStore {
    async fn active_consumers_with_history(&self) -> Result<Vec<ConsumerHistory>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .consumers
            .iter()
            .filter(|c| c.is_active())
            .map(|consumer| ConsumerHistory {
                consumer: consumer.clone(),
                readings: tables
                    .readings
                    .iter()
                    .filter(|r| r.consumer_id == consumer.consumer_id)
                    .cloned()
                    .collect(),
                bills: tables
                    .bills
                    .iter()
                    .filter(|b| b.consumer_id == consumer.consumer_id)
                    .map(|b| tables.with_payments(b))
                    .collect(),
            })
            .collect())
    }
}

#[async_trait]
impl BillStore for InMemoryStore {
    async fn get_bill(&self, bill_id: Uuid) -> Result<Option<Bill>, AppError> {
        Ok(self.bill(bill_id).await)
    }

    async fn month_bills(&self, month_year: NaiveDate) -> Result<Vec<BillWithPayments>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .bills
            .iter()
            .filter(|b| b.month_year == month_year)
            .map(|b| tables.with_payments(b))
            .collect())
    }

    async fn commit_generation(&self, plan: &GenerationPlan) -> Result<Vec<Uuid>, AppError> {
        let mut tables = self.tables.write().await;

        // Nothing is written unless every previous bill is still as planned.
        for prior in plan.drafts.iter().filter_map(|d| d.prior.as_ref()) {
            if tables.prior_state(prior.bill_id).as_ref() != Some(prior) {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Bill {} changed since the month was planned",
                    prior.bill_id
                )));
            }
        }

        let mut inserted = Vec::with_capacity(plan.drafts.len());
        for draft in &plan.drafts {
            let bill = &draft.bill;
            let exists = tables
                .bills
                .iter()
                .any(|b| b.consumer_id == bill.consumer_id && b.month_year == bill.month_year);
            if exists {
                continue;
            }
            tables.bills.push(bill.clone());
            inserted.push(bill.bill_id);

            if let Some(previous) = draft.promote {
                if let Some(prev) = tables.bill_mut(previous) {
                    if prev.status == BillStatus::Unpaid {
                        prev.status = BillStatus::Overdue;
                        prev.updated_utc = Utc::now();
                    }
                }
            }
        }

        let next = plan.next_mother;
        tables.upsert_mother_placeholder(next.month_year, next.previous_reading);

        Ok(inserted)
    }

    async fn update_notif_status(
        &self,
        bill_id: Uuid,
        status: NotifStatus,
    ) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        let bill = tables
            .bill_mut(bill_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Bill {} not found", bill_id)))?;
        bill.notif_status = status;
        bill.updated_utc = Utc::now();
        Ok(())
    }

    async fn delete_month_bills(&self, month_year: NaiveDate) -> Result<u64, AppError> {
        let mut tables = self.tables.write().await;

        let bill_ids: Vec<Uuid> = tables
            .bills
            .iter()
            .filter(|b| b.month_year == month_year)
            .map(|b| b.bill_id)
            .collect();
        if tables.payments.iter().any(|p| bill_ids.contains(&p.bill_id)) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Bills for {} have payments",
                month_year
            )));
        }

        let next = next_month(month_year);
        tables.mother_readings.retain(|m| m.month_year != next);
        tables.bills.retain(|b| b.month_year != month_year);

        Ok(bill_ids.len() as u64)
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn apply_payment(
        &self,
        payment: &Payment,
        expected: BillStatus,
        new_status: BillStatus,
    ) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        let bill = tables.bill_mut(payment.bill_id).ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Bill {} not found", payment.bill_id))
        })?;

        if bill.status != expected {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Bill {} changed status from {} to {}",
                payment.bill_id,
                expected,
                bill.status
            )));
        }
        bill.status = new_status;
        bill.updated_utc = Utc::now();
        tables.payments.push(payment.clone());
        Ok(())
    }

    async fn reverse_payment(&self, payment_id: Uuid) -> Result<Option<(Payment, Bill)>, AppError> {
        let mut tables = self.tables.write().await;

        let Some(index) = tables.payments.iter().position(|p| p.payment_id == payment_id) else {
            return Ok(None);
        };
        let bill_id = tables.payments[index].bill_id;
        let Some(bill) = tables.bill_mut(bill_id) else {
            return Ok(None);
        };
        bill.status = BillStatus::Unpaid;
        bill.updated_utc = Utc::now();
        let bill = bill.clone();

        let payment = tables.payments.remove(index);
        Ok(Some((payment, bill)))
    }

    async fn payments_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Payment>, AppError> {
        Ok(self
            .tables
            .read()
            .await
            .payments
            .iter()
            .filter(|p| p.payment_date >= start && p.payment_date < end)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl BillingStore for InMemoryStore {
    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}

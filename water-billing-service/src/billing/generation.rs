//! Monthly bill generation.
//!
//! A run for one month computes the month's system loss, drafts one bill per
//! active consumer with a reading and carries over what the previous bill left
//! unpaid. The bills, the promotion of unpaid predecessors to `Overdue` and
//! next month's mother meter placeholder are committed in one transaction.
//! Consumers are notified afterwards on a best-effort basis.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use service_core::error::AppError;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::month::{first_of_month, next_month, round_money};
use super::{BillNotice, BillingError, SystemLoss};
use crate::models::{
    Bill, BillStatus, BillWithPayments, Consumer, ConsumerHistory, MotherMeterReading,
    NotifStatus, RatesInfo,
};
use crate::services::metrics::{
    record_bills_generated, record_error, record_generation_run, record_notification,
};
use crate::services::{BillingStore, NotificationGateway};

/// Cubic meters of each bill that receive the subsidy.
pub const SUBSIDIZED_CUBIC_METERS: Decimal = dec!(5);

/// Plan-and-commit attempts before a run gives up on previous bills that keep
/// changing underneath it.
const COMMIT_ATTEMPTS: u32 = 3;

/// Balance carried from a consumer's previous bill, and the status change the
/// previous bill undergoes because of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarryOver {
    pub balance: Decimal,
    /// Previous bill to promote from `Unpaid` to `Overdue`.
    pub promote: Option<Uuid>,
}

impl CarryOver {
    pub fn none() -> Self {
        Self {
            balance: Decimal::ZERO,
            promote: None,
        }
    }

    /// Carry-over rules by the previous bill's status:
    ///
    /// - `Partial`: what remains after its payments
    /// - `Unpaid`: its total plus the penalty, and it becomes `Overdue`
    /// - `Overdue`: its total plus the penalty
    /// - `Paid` or no previous bill: nothing
    pub fn from_previous(previous: Option<&BillWithPayments>, rates: &RatesInfo) -> Self {
        let Some(prev) = previous else {
            return Self::none();
        };

        match prev.bill.status {
            BillStatus::Partial => Self {
                balance: prev.bill.total_amount - prev.amount_paid(),
                promote: None,
            },
            BillStatus::Unpaid => Self {
                balance: prev.bill.total_amount + rates.penalty_rate,
                promote: Some(prev.bill.bill_id),
            },
            BillStatus::Overdue => Self {
                balance: prev.bill.total_amount + rates.penalty_rate,
                promote: None,
            },
            BillStatus::Paid => Self::none(),
        }
    }
}

/// Why a consumer did not get a bill in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyBilled,
    NoReading,
    /// Another run inserted the consumer's bill for the month first.
    ConflictOnInsert,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedConsumer {
    pub consumer_id: Uuid,
    pub reason: SkipReason,
}

/// The previous bill a carry-over was computed from, as it stood when the
/// month was planned. The commit refuses to go ahead if it no longer matches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorBillState {
    pub bill_id: Uuid,
    pub status: BillStatus,
    pub amount_paid: Decimal,
}

impl PriorBillState {
    pub fn of(previous: &BillWithPayments) -> Self {
        Self {
            bill_id: previous.bill.bill_id,
            status: previous.bill.status,
            amount_paid: previous.amount_paid(),
        }
    }
}

/// A bill ready to be committed.
#[derive(Debug, Clone)]
pub struct BillDraft {
    pub bill: Bill,
    pub consumer: Consumer,
    pub cubic_used: Decimal,
    pub prior: Option<PriorBillState>,
    pub promote: Option<Uuid>,
}

/// Next month's mother meter placeholder, seeded with this month's present
/// reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NextMotherReading {
    pub month_year: NaiveDate,
    pub previous_reading: Decimal,
}

/// Everything a month's run writes, drafted before anything is written.
#[derive(Debug, Clone)]
pub struct GenerationPlan {
    pub month_year: NaiveDate,
    pub drafts: Vec<BillDraft>,
    pub skipped: Vec<SkippedConsumer>,
    pub next_mother: NextMotherReading,
}

/// Draft the month's bills. Pure: nothing is read from or written to storage.
pub fn plan_generation(
    month_year: NaiveDate,
    mother: &MotherMeterReading,
    rates: &RatesInfo,
    loss: &SystemLoss,
    histories: &[ConsumerHistory],
    now: DateTime<Utc>,
) -> GenerationPlan {
    let mut drafts = Vec::new();
    let mut skipped = Vec::new();

    for history in histories.iter().filter(|h| h.consumer.is_active()) {
        let consumer_id = history.consumer.consumer_id;

        if history.bill_for(month_year).is_some() {
            skipped.push(SkippedConsumer {
                consumer_id,
                reason: SkipReason::AlreadyBilled,
            });
            continue;
        }

        let Some(reading) = history.reading_for(month_year) else {
            skipped.push(SkippedConsumer {
                consumer_id,
                reason: SkipReason::NoReading,
            });
            continue;
        };

        let cubic_used = reading.cubic_used();
        let subsidy = cubic_used.min(SUBSIDIZED_CUBIC_METERS) * rates.subsidy_rate;
        let previous = history.latest_bill_before(month_year);
        let carry = CarryOver::from_previous(previous, rates);
        let system_loss = round_money(loss.allocate(cubic_used));
        let total_amount =
            round_money(cubic_used * rates.consumer_rate + carry.balance + system_loss - subsidy);

        drafts.push(BillDraft {
            bill: Bill {
                bill_id: Uuid::new_v4(),
                consumer_id,
                reading_id: reading.reading_id,
                mother_reading_id: mother.mother_reading_id,
                month_year,
                billing_date: now,
                system_loss,
                subsidy: round_money(subsidy),
                balance: round_money(carry.balance),
                total_amount,
                status: BillStatus::Unpaid,
                notif_status: NotifStatus::Pending,
                created_utc: now,
                updated_utc: now,
            },
            consumer: history.consumer.clone(),
            cubic_used,
            prior: previous.map(PriorBillState::of),
            promote: carry.promote,
        });
    }

    GenerationPlan {
        month_year,
        drafts,
        skipped,
        next_mother: NextMotherReading {
            month_year: next_month(month_year),
            previous_reading: mother.present_reading,
        },
    }
}

/// Result of a generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOutcome {
    pub month_year: NaiveDate,
    pub system_loss: SystemLoss,
    pub bills: Vec<Bill>,
    pub skipped: Vec<SkippedConsumer>,
    /// Previous bills promoted to `Overdue`.
    pub promoted: Vec<Uuid>,
}

pub struct BillGenerationEngine {
    store: Arc<dyn BillingStore>,
    notifier: Arc<dyn NotificationGateway>,
}

impl BillGenerationEngine {
    pub fn new(store: Arc<dyn BillingStore>, notifier: Arc<dyn NotificationGateway>) -> Self {
        Self { store, notifier }
    }

    /// Mother reading, rates and system loss for a month, or the precondition
    /// that is not met.
    async fn month_inputs(
        &self,
        month_year: NaiveDate,
    ) -> Result<(MotherMeterReading, RatesInfo, SystemLoss), BillingError> {
        let mother = self
            .store
            .mother_reading(month_year)
            .await?
            .ok_or(BillingError::MotherReadingMissing(month_year))?;
        let rates = self
            .store
            .current_rates()
            .await?
            .ok_or(BillingError::RatesMissing)?;
        let readings = self.store.consumer_readings(month_year).await?;

        let loss = SystemLoss::compute(&mother, &readings, &rates)
            .ok_or(BillingError::SystemLossNotComputable(month_year))?;

        Ok((mother, rates, loss))
    }

    /// System loss for the month containing `month_year`.
    #[instrument(skip(self))]
    pub async fn system_loss(&self, month_year: NaiveDate) -> Result<SystemLoss, BillingError> {
        let (_, _, loss) = self.month_inputs(first_of_month(month_year)).await?;
        Ok(loss)
    }

    /// Generate bills for the month containing `month_year`.
    ///
    /// Safe to re-run: consumers already billed for the month are skipped, and
    /// a bill inserted concurrently by another run is reported as a conflict
    /// skip rather than an error. When a previous bill is paid or reversed
    /// between planning and commit, the month is planned again.
    #[instrument(skip(self))]
    pub async fn generate_bills(
        &self,
        month_year: NaiveDate,
    ) -> Result<GenerationOutcome, BillingError> {
        let month_year = first_of_month(month_year);
        info!(month_year = %month_year, "Starting bill generation");

        let result = self.run_generation(month_year).await;
        match &result {
            Ok(outcome) => {
                record_generation_run("completed");
                record_bills_generated(outcome.bills.len() as u64);
                info!(
                    month_year = %month_year,
                    bills_created = outcome.bills.len(),
                    skipped = outcome.skipped.len(),
                    promoted = outcome.promoted.len(),
                    loss_fraction = %outcome.system_loss.loss_fraction,
                    "Bill generation completed"
                );
            }
            Err(e) => {
                record_generation_run("failed");
                record_error(e.kind(), "generate_bills");
                error!(month_year = %month_year, error = %e, "Bill generation failed");
            }
        }
        result
    }

    async fn run_generation(&self, month_year: NaiveDate) -> Result<GenerationOutcome, BillingError> {
        let (mother, rates, loss) = self.month_inputs(month_year).await?;

        let mut attempt = 1;
        let (plan, inserted) = loop {
            let histories = self.store.active_consumers_with_history().await?;
            let plan = plan_generation(month_year, &mother, &rates, &loss, &histories, Utc::now());
            debug!(
                attempt,
                drafted = plan.drafts.len(),
                skipped = plan.skipped.len(),
                "Bills drafted"
            );

            match self.store.commit_generation(&plan).await {
                Ok(ids) => break (plan, ids.into_iter().collect::<HashSet<Uuid>>()),
                Err(AppError::Conflict(e)) if attempt < COMMIT_ATTEMPTS => {
                    warn!(attempt, error = %e, "Previous bill changed while generating, planning again");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        };

        let mut skipped = plan.skipped;
        let mut promoted = Vec::new();
        let mut bills = Vec::with_capacity(inserted.len());

        for draft in plan.drafts {
            if !inserted.contains(&draft.bill.bill_id) {
                warn!(
                    consumer_id = %draft.consumer.consumer_id,
                    "Bill already generated by a concurrent run, skipping"
                );
                skipped.push(SkippedConsumer {
                    consumer_id: draft.consumer.consumer_id,
                    reason: SkipReason::ConflictOnInsert,
                });
                continue;
            }
            if let Some(previous) = draft.promote {
                promoted.push(previous);
            }

            let mut bill = draft.bill;
            bill.notif_status = self.notify(&draft.consumer, &bill, &rates, draft.cubic_used).await;
            bills.push(bill);
        }

        Ok(GenerationOutcome {
            month_year,
            system_loss: loss,
            bills,
            skipped,
            promoted,
        })
    }

    /// Send the bill notice and record the outcome on the bill. Never fails.
    async fn notify(
        &self,
        consumer: &Consumer,
        bill: &Bill,
        rates: &RatesInfo,
        cubic_used: Decimal,
    ) -> NotifStatus {
        let notice = BillNotice::compose(consumer, bill, rates, cubic_used);

        let status = match self.notifier.notify(consumer, &notice).await {
            Ok(receipt) => {
                debug!(
                    bill_id = %bill.bill_id,
                    channels = ?receipt.channels,
                    "Bill notice sent"
                );
                NotifStatus::Sent
            }
            Err(e) => {
                warn!(
                    bill_id = %bill.bill_id,
                    consumer_id = %consumer.consumer_id,
                    error = %e,
                    "Bill notice failed"
                );
                NotifStatus::Failed
            }
        };
        record_notification(status.as_str());

        if let Err(e) = self.store.update_notif_status(bill.bill_id, status).await {
            warn!(bill_id = %bill.bill_id, error = %e, "Failed to record notice status");
        }

        status
    }

    /// Bills of one month with their payments.
    pub async fn month_bills(
        &self,
        month_year: NaiveDate,
    ) -> Result<Vec<BillWithPayments>, BillingError> {
        Ok(self.store.month_bills(first_of_month(month_year)).await?)
    }

    /// Roll back a month's generation: delete every bill of the month and the
    /// next month's mother meter placeholder. Refused once any bill of the
    /// month has a payment. Readings are kept.
    #[instrument(skip(self))]
    pub async fn delete_bills(&self, month_year: NaiveDate) -> Result<u64, BillingError> {
        let month_year = first_of_month(month_year);

        let bills = self.store.month_bills(month_year).await?;
        if bills.is_empty() {
            return Err(BillingError::NothingToDelete(month_year));
        }
        if bills.iter().any(BillWithPayments::has_payments) {
            record_error("payments_exist", "delete_bills");
            return Err(BillingError::PaymentsExist(month_year));
        }

        let deleted = self
            .store
            .delete_month_bills(month_year)
            .await
            .map_err(|e| match e {
                // A payment landed between the check and the delete.
                AppError::Conflict(_) => {
                    BillingError::PaymentsExist(month_year)
                }
                other => BillingError::Store(other),
            })?;

        info!(month_year = %month_year, deleted, "Month bills deleted");
        Ok(deleted)
    }
}

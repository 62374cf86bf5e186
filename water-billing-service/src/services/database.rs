//! PostgreSQL store for water-billing-service.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgExecutor, PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::store::{
    BillStore, BillingStore, ConsumerStore, MeterReadingStore, PaymentStore, RatesProvider,
};
use crate::billing::month::next_month;
use crate::billing::GenerationPlan;
use crate::models::{
    Bill, BillStatus, BillWithPayments, Consumer, ConsumerHistory, ConsumerStatus,
    MotherMeterReading, NotifStatus, NotificationPreference, Payment, PaymentType, RatesInfo,
    Reading,
};
use crate::services::metrics::DB_QUERY_DURATION;

const BILL_COLUMNS: &str = "bill_id, consumer_id, reading_id, mother_reading_id, month_year, \
     billing_date, system_loss, subsidy, balance, total_amount, status, notif_status, \
     created_utc, updated_utc";

const PAYMENT_COLUMNS: &str =
    "payment_id, bill_id, consumer_id, processed_by, payment_date, amount_paid, penalty, payment_type";

const MOTHER_COLUMNS: &str =
    "mother_reading_id, month_year, present_reading, previous_reading, created_utc, updated_utc";

const READING_COLUMNS: &str =
    "reading_id, consumer_id, month_year, present_reading, previous_reading, created_utc";

#[derive(FromRow)]
struct BillRow {
    bill_id: Uuid,
    consumer_id: Uuid,
    reading_id: Uuid,
    mother_reading_id: Uuid,
    month_year: NaiveDate,
    billing_date: DateTime<Utc>,
    system_loss: Decimal,
    subsidy: Decimal,
    balance: Decimal,
    total_amount: Decimal,
    status: String,
    notif_status: String,
    created_utc: DateTime<Utc>,
    updated_utc: DateTime<Utc>,
}

impl From<BillRow> for Bill {
    fn from(row: BillRow) -> Self {
        Self {
            bill_id: row.bill_id,
            consumer_id: row.consumer_id,
            reading_id: row.reading_id,
            mother_reading_id: row.mother_reading_id,
            month_year: row.month_year,
            billing_date: row.billing_date,
            system_loss: row.system_loss,
            subsidy: row.subsidy,
            balance: row.balance,
            total_amount: row.total_amount,
            status: BillStatus::from_string(&row.status),
            notif_status: NotifStatus::from_string(&row.notif_status),
            created_utc: row.created_utc,
            updated_utc: row.updated_utc,
        }
    }
}

#[derive(FromRow)]
struct PaymentRow {
    payment_id: Uuid,
    bill_id: Uuid,
    consumer_id: Uuid,
    processed_by: Uuid,
    payment_date: DateTime<Utc>,
    amount_paid: Decimal,
    penalty: Decimal,
    payment_type: String,
}

impl From<PaymentRow> for Payment {
    fn from(row: PaymentRow) -> Self {
        Self {
            payment_id: row.payment_id,
            bill_id: row.bill_id,
            consumer_id: row.consumer_id,
            processed_by: row.processed_by,
            payment_date: row.payment_date,
            amount_paid: row.amount_paid,
            penalty: row.penalty,
            payment_type: PaymentType::from_string(&row.payment_type),
        }
    }
}

#[derive(FromRow)]
struct ConsumerRow {
    consumer_id: Uuid,
    name: String,
    meter_number: String,
    status: String,
    notification_preference: String,
    email: Option<String>,
    phone: Option<String>,
    created_utc: DateTime<Utc>,
}

impl From<ConsumerRow> for Consumer {
    fn from(row: ConsumerRow) -> Self {
        Self {
            consumer_id: row.consumer_id,
            name: row.name,
            meter_number: row.meter_number,
            status: ConsumerStatus::from_string(&row.status),
            notification_preference: NotificationPreference::from_string(
                &row.notification_preference,
            ),
            email: row.email,
            phone: row.phone,
            created_utc: row.created_utc,
        }
    }
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "water-billing-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Payments of the given bills, grouped by bill.
    async fn payments_by_bill(
        &self,
        bill_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<Payment>>, AppError> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE bill_id = ANY($1) ORDER BY payment_date",
            PAYMENT_COLUMNS
        ))
        .bind(bill_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load payments: {}", e)))?;

        let mut grouped: HashMap<Uuid, Vec<Payment>> = HashMap::new();
        for row in rows {
            grouped.entry(row.bill_id).or_default().push(row.into());
        }
        Ok(grouped)
    }

    async fn attach_payments(&self, rows: Vec<BillRow>) -> Result<Vec<BillWithPayments>, AppError> {
        let bill_ids: Vec<Uuid> = rows.iter().map(|r| r.bill_id).collect();
        let mut payments = self.payments_by_bill(&bill_ids).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let payments = payments.remove(&row.bill_id).unwrap_or_default();
                BillWithPayments {
                    bill: row.into(),
                    payments,
                }
            })
            .collect())
    }
}

#[async_trait]
impl RatesProvider for Database {
    #[instrument(skip(self))]
    async fn current_rates(&self) -> Result<Option<RatesInfo>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["current_rates"])
            .start_timer();

        let rates = sqlx::query_as::<_, RatesInfo>(
            r#"
            SELECT rates_id, consumer_rate, mother_meter_rate, penalty_rate, subsidy_rate, updated_utc
            FROM rates_info
            ORDER BY updated_utc DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load rates: {}", e)))?;

        timer.observe_duration();
        Ok(rates)
    }
}

#[async_trait]
impl MeterReadingStore for Database {
    #[instrument(skip(self))]
    async fn mother_reading(
        &self,
        month_year: NaiveDate,
    ) -> Result<Option<MotherMeterReading>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mother_reading"])
            .start_timer();

        let reading = sqlx::query_as::<_, MotherMeterReading>(&format!(
            "SELECT {} FROM mother_meter_readings WHERE month_year = $1",
            MOTHER_COLUMNS
        ))
        .bind(month_year)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load mother reading: {}", e))
        })?;

        timer.observe_duration();
        Ok(reading)
    }

    #[instrument(skip(self))]
    async fn consumer_readings(&self, month_year: NaiveDate) -> Result<Vec<Reading>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["consumer_readings"])
            .start_timer();

        let readings = sqlx::query_as::<_, Reading>(&format!(
            "SELECT {} FROM readings WHERE month_year = $1",
            READING_COLUMNS
        ))
        .bind(month_year)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load readings: {}", e)))?;

        timer.observe_duration();
        Ok(readings)
    }

    #[instrument(skip(self))]
    async fn upsert_next_mother_reading(
        &self,
        month_year: NaiveDate,
        previous_reading: Decimal,
    ) -> Result<MotherMeterReading, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["upsert_next_mother_reading"])
            .start_timer();

        let reading = upsert_mother_placeholder(&self.pool, month_year, previous_reading).await?;

        timer.observe_duration();
        Ok(reading)
    }
}

/// Upsert a month's mother reading placeholder. An already entered present
/// reading survives a re-run.
async fn upsert_mother_placeholder<'e, E: PgExecutor<'e>>(
    executor: E,
    month_year: NaiveDate,
    previous_reading: Decimal,
) -> Result<MotherMeterReading, AppError> {
    sqlx::query_as::<_, MotherMeterReading>(&format!(
        r#"
        INSERT INTO mother_meter_readings (mother_reading_id, month_year, present_reading, previous_reading)
        VALUES ($1, $2, 0, $3)
        ON CONFLICT (month_year)
        DO UPDATE SET previous_reading = EXCLUDED.previous_reading, updated_utc = NOW()
        RETURNING {}
        "#,
        MOTHER_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(month_year)
    .bind(previous_reading)
    .fetch_one(executor)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to upsert mother reading: {}", e)))
}

#[async_trait]
impl ConsumerStore for Database {
    #[instrument(skip(self))]
    async fn active_consumers_with_history(&self) -> Result<Vec<ConsumerHistory>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["active_consumers_with_history"])
            .start_timer();

        let consumers = sqlx::query_as::<_, ConsumerRow>(
            r#"
            SELECT consumer_id, name, meter_number, status, notification_preference, email, phone, created_utc
            FROM consumers
            WHERE status = 'active'
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load consumers: {}", e)))?;

        let consumer_ids: Vec<Uuid> = consumers.iter().map(|c| c.consumer_id).collect();

        let readings = sqlx::query_as::<_, Reading>(&format!(
            "SELECT {} FROM readings WHERE consumer_id = ANY($1)",
            READING_COLUMNS
        ))
        .bind(&consumer_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load readings: {}", e)))?;

        let bill_rows = sqlx::query_as::<_, BillRow>(&format!(
            "SELECT {} FROM bills WHERE consumer_id = ANY($1) ORDER BY month_year",
            BILL_COLUMNS
        ))
        .bind(&consumer_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load bills: {}", e)))?;
        let bills = self.attach_payments(bill_rows).await?;

        let mut readings_by_consumer: HashMap<Uuid, Vec<Reading>> = HashMap::new();
        for reading in readings {
            readings_by_consumer
                .entry(reading.consumer_id)
                .or_default()
                .push(reading);
        }
        let mut bills_by_consumer: HashMap<Uuid, Vec<BillWithPayments>> = HashMap::new();
        for bill in bills {
            bills_by_consumer
                .entry(bill.bill.consumer_id)
                .or_default()
                .push(bill);
        }

        let histories = consumers
            .into_iter()
            .map(|row| {
                let consumer: Consumer = row.into();
                ConsumerHistory {
                    readings: readings_by_consumer
                        .remove(&consumer.consumer_id)
                        .unwrap_or_default(),
                    bills: bills_by_consumer
                        .remove(&consumer.consumer_id)
                        .unwrap_or_default(),
                    consumer,
                }
            })
            .collect();

        timer.observe_duration();
        Ok(histories)
    }
}

#[async_trait]
impl BillStore for Database {
    #[instrument(skip(self))]
    async fn get_bill(&self, bill_id: Uuid) -> Result<Option<Bill>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_bill"])
            .start_timer();

        let row = sqlx::query_as::<_, BillRow>(&format!(
            "SELECT {} FROM bills WHERE bill_id = $1",
            BILL_COLUMNS
        ))
        .bind(bill_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get bill: {}", e)))?;

        timer.observe_duration();
        Ok(row.map(Bill::from))
    }

    #[instrument(skip(self))]
    async fn month_bills(&self, month_year: NaiveDate) -> Result<Vec<BillWithPayments>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["month_bills"])
            .start_timer();

        let rows = sqlx::query_as::<_, BillRow>(&format!(
            "SELECT {} FROM bills WHERE month_year = $1 ORDER BY created_utc",
            BILL_COLUMNS
        ))
        .bind(month_year)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list bills: {}", e)))?;
        let bills = self.attach_payments(rows).await?;

        timer.observe_duration();
        Ok(bills)
    }

    #[instrument(skip(self, plan), fields(month_year = %plan.month_year, drafts = plan.drafts.len()))]
    async fn commit_generation(&self, plan: &GenerationPlan) -> Result<Vec<Uuid>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["commit_generation"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let mut inserted = Vec::with_capacity(plan.drafts.len());
        for draft in &plan.drafts {
            let bill = &draft.bill;

            // Lock the previous bill; its payments cannot change while it is held.
            if let Some(prior) = &draft.prior {
                let status = sqlx::query_scalar::<_, String>(
                    "SELECT status FROM bills WHERE bill_id = $1 FOR UPDATE",
                )
                .bind(prior.bill_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock bill: {}", e)))?;
                let amount_paid = sqlx::query_scalar::<_, Decimal>(
                    "SELECT COALESCE(SUM(amount_paid), 0) FROM payments WHERE bill_id = $1",
                )
                .bind(prior.bill_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to sum payments: {}", e))
                })?;

                let unchanged = status.as_deref() == Some(prior.status.as_str())
                    && amount_paid == prior.amount_paid;
                if !unchanged {
                    tx.rollback().await.ok();
                    return Err(AppError::Conflict(anyhow::anyhow!(
                        "Bill {} changed since the month was planned",
                        prior.bill_id
                    )));
                }
            }

            // A concurrent run that already billed this consumer wins; no row comes back.
            let bill_id = sqlx::query_scalar::<_, Uuid>(
                r#"
                INSERT INTO bills (bill_id, consumer_id, reading_id, mother_reading_id, month_year, billing_date,
                                   system_loss, subsidy, balance, total_amount, status, notif_status)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                ON CONFLICT (consumer_id, month_year) DO NOTHING
                RETURNING bill_id
                "#,
            )
            .bind(bill.bill_id)
            .bind(bill.consumer_id)
            .bind(bill.reading_id)
            .bind(bill.mother_reading_id)
            .bind(bill.month_year)
            .bind(bill.billing_date)
            .bind(bill.system_loss)
            .bind(bill.subsidy)
            .bind(bill.balance)
            .bind(bill.total_amount)
            .bind(bill.status.as_str())
            .bind(bill.notif_status.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert bill: {}", e)))?;

            let Some(bill_id) = bill_id else {
                debug!(consumer_id = %bill.consumer_id, "Bill insert skipped on conflict");
                continue;
            };
            inserted.push(bill_id);

            if let Some(previous) = draft.promote {
                sqlx::query(
                    "UPDATE bills SET status = 'overdue', updated_utc = NOW() WHERE bill_id = $1 AND status = 'unpaid'",
                )
                .bind(previous)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to promote bill: {}", e))
                })?;
            }
        }

        upsert_mother_placeholder(
            &mut *tx,
            plan.next_mother.month_year,
            plan.next_mother.previous_reading,
        )
        .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit generation: {}", e))
        })?;

        timer.observe_duration();
        Ok(inserted)
    }

    #[instrument(skip(self))]
    async fn update_notif_status(
        &self,
        bill_id: Uuid,
        status: NotifStatus,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_notif_status"])
            .start_timer();

        let result = sqlx::query(
            "UPDATE bills SET notif_status = $2, updated_utc = NOW() WHERE bill_id = $1",
        )
        .bind(bill_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update notice status: {}", e))
        })?;

        timer.observe_duration();
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!("Bill {} not found", bill_id)));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_month_bills(&self, month_year: NaiveDate) -> Result<u64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_month_bills"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        // Locking the bills keeps payments out until the delete commits.
        let bill_ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT bill_id FROM bills WHERE month_year = $1 FOR UPDATE",
        )
        .bind(month_year)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock bills: {}", e)))?;

        let has_payments = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM payments WHERE bill_id = ANY($1))",
        )
        .bind(&bill_ids)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to check payments: {}", e)))?;

        if has_payments {
            tx.rollback().await.ok();
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Bills for {} have payments",
                month_year
            )));
        }

        sqlx::query("DELETE FROM mother_meter_readings WHERE month_year = $1")
            .bind(next_month(month_year))
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete mother reading: {}", e))
            })?;

        let deleted = sqlx::query("DELETE FROM bills WHERE month_year = $1")
            .bind(month_year)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete bills: {}", e)))?
            .rows_affected();

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit delete: {}", e))
        })?;

        timer.observe_duration();
        Ok(deleted)
    }
}

#[async_trait]
impl PaymentStore for Database {
    #[instrument(skip(self, payment), fields(bill_id = %payment.bill_id))]
    async fn apply_payment(
        &self,
        payment: &Payment,
        expected: BillStatus,
        new_status: BillStatus,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["apply_payment"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let current = sqlx::query_scalar::<_, String>(
            "SELECT status FROM bills WHERE bill_id = $1 FOR UPDATE",
        )
        .bind(payment.bill_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock bill: {}", e)))?
        .map(|s| BillStatus::from_string(&s))
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Bill {} not found", payment.bill_id)))?;

        if current != expected {
            tx.rollback().await.ok();
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Bill {} changed status from {} to {}",
                payment.bill_id,
                expected,
                current
            )));
        }

        sqlx::query("UPDATE bills SET status = $2, updated_utc = NOW() WHERE bill_id = $1")
            .bind(payment.bill_id)
            .bind(new_status.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to update bill status: {}", e))
            })?;

        sqlx::query(
            r#"
            INSERT INTO payments (payment_id, bill_id, consumer_id, processed_by, payment_date, amount_paid, penalty, payment_type)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(payment.payment_id)
        .bind(payment.bill_id)
        .bind(payment.consumer_id)
        .bind(payment.processed_by)
        .bind(payment.payment_date)
        .bind(payment.amount_paid)
        .bind(payment.penalty)
        .bind(payment.payment_type.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert payment: {}", e)))?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit payment: {}", e))
        })?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn reverse_payment(&self, payment_id: Uuid) -> Result<Option<(Payment, Bill)>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["reverse_payment"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let payment = sqlx::query_as::<_, PaymentRow>(&format!(
            "DELETE FROM payments WHERE payment_id = $1 RETURNING {}",
            PAYMENT_COLUMNS
        ))
        .bind(payment_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete payment: {}", e)))?;

        let Some(payment) = payment else {
            tx.rollback().await.ok();
            return Ok(None);
        };

        let bill = sqlx::query_as::<_, BillRow>(&format!(
            "UPDATE bills SET status = 'unpaid', updated_utc = NOW() WHERE bill_id = $1 RETURNING {}",
            BILL_COLUMNS
        ))
        .bind(payment.bill_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to reset bill: {}", e)))?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit reversal: {}", e))
        })?;

        timer.observe_duration();
        Ok(Some((payment.into(), bill.into())))
    }

    #[instrument(skip(self))]
    async fn payments_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["payments_between"])
            .start_timer();

        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE payment_date >= $1 AND payment_date < $2 ORDER BY payment_date",
            PAYMENT_COLUMNS
        ))
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list payments: {}", e)))?;

        timer.observe_duration();
        Ok(rows.into_iter().map(Payment::from).collect())
    }
}

#[async_trait]
impl BillingStore for Database {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }
}

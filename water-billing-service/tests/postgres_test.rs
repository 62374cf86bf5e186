//! PostgreSQL store tests.
//!
//! These need a running database (TEST_DATABASE_URL) and are ignored by
//! default: `cargo test -- --ignored`.

mod common;

use chrono::{NaiveDate, Utc};
use common::{at, month, PgTestDb};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use uuid::Uuid;
use water_billing_service::billing::{
    plan_generation, BillGenerationEngine, BillingError, PaymentLedger, RecordPayment, SystemLoss,
};
use water_billing_service::models::{BillStatus, NotifStatus, PaymentType};
use water_billing_service::services::{
    BillStore, ConsumerStore, Database, MeterReadingStore, MockNotificationGateway, PaymentStore,
    RatesProvider,
};

async fn seed_rates(db: &Database) {
    sqlx::query(
        "INSERT INTO rates_info (rates_id, consumer_rate, mother_meter_rate, penalty_rate, subsidy_rate, updated_utc)
         VALUES ($1, 25, 20, 50, 2, $2)",
    )
    .bind(Uuid::new_v4())
    .bind(Utc::now())
    .execute(db.pool())
    .await
    .unwrap();
}

async fn seed_consumer(db: &Database, name: &str, status: &str) -> Uuid {
    let consumer_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO consumers (consumer_id, name, meter_number, status, notification_preference, phone)
         VALUES ($1, $2, $3, $4, 'sms', '+639171234567')",
    )
    .bind(consumer_id)
    .bind(name)
    .bind(format!("MTR-{}", name))
    .bind(status)
    .execute(db.pool())
    .await
    .unwrap();
    consumer_id
}

async fn seed_reading(
    db: &Database,
    consumer_id: Uuid,
    month_year: NaiveDate,
    previous: Decimal,
    present: Decimal,
) {
    sqlx::query(
        "INSERT INTO readings (reading_id, consumer_id, month_year, previous_reading, present_reading)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(Uuid::new_v4())
    .bind(consumer_id)
    .bind(month_year)
    .bind(previous)
    .bind(present)
    .execute(db.pool())
    .await
    .unwrap();
}

async fn seed_mother(db: &Database, month_year: NaiveDate, previous: Decimal, present: Decimal) {
    sqlx::query(
        "INSERT INTO mother_meter_readings (mother_reading_id, month_year, previous_reading, present_reading)
         VALUES ($1, $2, $3, $4)",
    )
    .bind(Uuid::new_v4())
    .bind(month_year)
    .bind(previous)
    .bind(present)
    .execute(db.pool())
    .await
    .unwrap();
}

struct Seeded {
    small: Uuid,
    large: Uuid,
}

async fn seed_march(db: &Database) -> Seeded {
    seed_rates(db).await;
    let small = seed_consumer(db, "small", "active").await;
    let large = seed_consumer(db, "large", "active").await;
    seed_consumer(db, "unread", "active").await;
    let cut = seed_consumer(db, "cut", "disconnected").await;

    seed_reading(db, small, month(2024, 3), dec!(100), dec!(110)).await;
    seed_reading(db, large, month(2024, 3), dec!(200), dec!(230)).await;
    seed_reading(db, cut, month(2024, 3), dec!(0), dec!(5)).await;
    seed_mother(db, month(2024, 3), dec!(1000), dec!(1055)).await;

    Seeded { small, large }
}

#[tokio::test]
#[ignore]
async fn generation_is_idempotent_in_postgres() {
    let pg = PgTestDb::create().await;
    let seeded = seed_march(&pg.db).await;
    let store = Arc::new(pg.db.clone());
    let engine = BillGenerationEngine::new(store.clone(), Arc::new(MockNotificationGateway::new()));

    let first = engine.generate_bills(month(2024, 3)).await.unwrap();
    let second = engine.generate_bills(month(2024, 3)).await.unwrap();

    assert_eq!(first.bills.len(), 2);
    assert!(second.bills.is_empty());

    let bills = store.month_bills(month(2024, 3)).await.unwrap();
    assert_eq!(bills.len(), 2);
    assert!(bills
        .iter()
        .all(|b| b.bill.notif_status == NotifStatus::Sent && b.bill.status == BillStatus::Unpaid));
    assert!(bills.iter().any(|b| b.bill.consumer_id == seeded.small));
    assert!(bills.iter().any(|b| b.bill.consumer_id == seeded.large));

    let april = store.mother_reading(month(2024, 4)).await.unwrap().unwrap();
    assert_eq!(april.previous_reading, dec!(1055));

    pg.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn payments_block_deletion_until_reversed() {
    let pg = PgTestDb::create().await;
    seed_march(&pg.db).await;
    let store = Arc::new(pg.db.clone());
    let engine = BillGenerationEngine::new(store.clone(), Arc::new(MockNotificationGateway::new()));
    let ledger = PaymentLedger::new(store.clone());

    let outcome = engine.generate_bills(month(2024, 3)).await.unwrap();
    let bill = &outcome.bills[0];

    let receipt = ledger
        .record_payment(
            RecordPayment {
                bill_id: bill.bill_id,
                amount_paid: bill.total_amount,
                payment_type: PaymentType::Cash,
                processed_by: Uuid::new_v4(),
            },
            at(2024, 3, 10),
        )
        .await
        .unwrap();
    assert_eq!(receipt.bill_status, BillStatus::Paid);
    assert_eq!(
        store.get_bill(bill.bill_id).await.unwrap().unwrap().status,
        BillStatus::Paid
    );

    let err = engine.delete_bills(month(2024, 3)).await.unwrap_err();
    assert!(matches!(err, BillingError::PaymentsExist(_)));
    assert_eq!(store.month_bills(month(2024, 3)).await.unwrap().len(), 2);

    let (_, reset) = ledger.reverse_payment(receipt.payment.payment_id).await.unwrap();
    assert_eq!(reset.status, BillStatus::Unpaid);

    let deleted = engine.delete_bills(month(2024, 3)).await.unwrap();
    assert_eq!(deleted, 2);
    assert!(store.mother_reading(month(2024, 4)).await.unwrap().is_none());

    pg.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn stale_payment_is_rejected_by_the_row_lock_check() {
    let pg = PgTestDb::create().await;
    seed_march(&pg.db).await;
    let store = Arc::new(pg.db.clone());
    let engine = BillGenerationEngine::new(store.clone(), Arc::new(MockNotificationGateway::new()));
    let outcome = engine.generate_bills(month(2024, 3)).await.unwrap();
    let bill = &outcome.bills[0];

    let payment = water_billing_service::models::Payment {
        payment_id: Uuid::new_v4(),
        bill_id: bill.bill_id,
        consumer_id: bill.consumer_id,
        processed_by: Uuid::new_v4(),
        payment_date: at(2024, 3, 5),
        amount_paid: dec!(10),
        penalty: Decimal::ZERO,
        payment_type: PaymentType::Cash,
    };

    let err = store
        .apply_payment(&payment, BillStatus::Partial, BillStatus::Paid)
        .await
        .unwrap_err();

    assert!(matches!(err, service_core::error::AppError::Conflict(_)));
    assert!(store
        .payments_between(at(2024, 3, 1), at(2024, 3, 31))
        .await
        .unwrap()
        .is_empty());

    pg.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn failed_placeholder_write_rolls_back_the_bills() {
    let pg = PgTestDb::create().await;
    seed_march(&pg.db).await;
    sqlx::query(
        "CREATE FUNCTION reject_april() RETURNS trigger AS $$
         BEGIN RAISE EXCEPTION 'april is closed'; END
         $$ LANGUAGE plpgsql",
    )
    .execute(pg.db.pool())
    .await
    .unwrap();
    sqlx::query(
        "CREATE TRIGGER reject_april BEFORE INSERT OR UPDATE ON mother_meter_readings
         FOR EACH ROW WHEN (NEW.month_year = DATE '2024-04-01') EXECUTE FUNCTION reject_april()",
    )
    .execute(pg.db.pool())
    .await
    .unwrap();
    let store = Arc::new(pg.db.clone());
    let notifier = Arc::new(MockNotificationGateway::new());
    let engine = BillGenerationEngine::new(store.clone(), notifier.clone());

    let err = engine.generate_bills(month(2024, 3)).await.unwrap_err();

    assert!(matches!(
        err,
        BillingError::Store(service_core::error::AppError::DatabaseError(_))
    ));
    assert!(store.month_bills(month(2024, 3)).await.unwrap().is_empty());
    assert!(store.mother_reading(month(2024, 4)).await.unwrap().is_none());
    assert_eq!(notifier.send_count(), 0);

    pg.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn commit_rejects_a_plan_made_before_a_payment() {
    let pg = PgTestDb::create().await;
    seed_march(&pg.db).await;
    let store = Arc::new(pg.db.clone());
    let engine = BillGenerationEngine::new(store.clone(), Arc::new(MockNotificationGateway::new()));
    let ledger = PaymentLedger::new(store.clone());
    let march = engine.generate_bills(month(2024, 3)).await.unwrap();
    let bill = &march.bills[0];
    sqlx::query("UPDATE mother_meter_readings SET present_reading = 1100 WHERE month_year = $1")
        .bind(month(2024, 4))
        .execute(pg.db.pool())
        .await
        .unwrap();
    seed_reading(&pg.db, bill.consumer_id, month(2024, 4), dec!(0), dec!(10)).await;

    let mother = store.mother_reading(month(2024, 4)).await.unwrap().unwrap();
    let rates = store.current_rates().await.unwrap().unwrap();
    let readings = store.consumer_readings(month(2024, 4)).await.unwrap();
    let loss = SystemLoss::compute(&mother, &readings, &rates).unwrap();
    let histories = store.active_consumers_with_history().await.unwrap();
    let plan = plan_generation(month(2024, 4), &mother, &rates, &loss, &histories, Utc::now());

    ledger
        .record_payment(
            RecordPayment {
                bill_id: bill.bill_id,
                amount_paid: bill.total_amount,
                payment_type: PaymentType::Cash,
                processed_by: Uuid::new_v4(),
            },
            at(2024, 3, 10),
        )
        .await
        .unwrap();

    let err = store.commit_generation(&plan).await.unwrap_err();

    assert!(matches!(err, service_core::error::AppError::Conflict(_)));
    assert!(store.month_bills(month(2024, 4)).await.unwrap().is_empty());
    assert_eq!(
        store.get_bill(bill.bill_id).await.unwrap().unwrap().status,
        BillStatus::Paid
    );

    pg.cleanup().await;
}

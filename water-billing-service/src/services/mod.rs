//! Services module for water-billing-service.

pub mod database;
pub mod memory;
pub mod metrics;
pub mod notifier;
pub mod store;

pub use database::Database;
pub use memory::InMemoryStore;
pub use metrics::{get_metrics, init_metrics};
pub use notifier::{
    Channel, HttpNotificationGateway, MockNotificationGateway, NotificationError,
    NotificationGateway, NotificationReceipt,
};
pub use store::{
    BillStore, BillingStore, ConsumerStore, MeterReadingStore, PaymentStore, RatesProvider,
};

//! Domain models for water-billing-service.

mod bill;
mod consumer;
mod payment;
mod rates;
mod reading;

pub use bill::{Bill, BillStatus, BillWithPayments, NotifStatus};
pub use consumer::{Consumer, ConsumerHistory, ConsumerStatus, NotificationPreference};
pub use payment::{Payment, PaymentType};
pub use rates::RatesInfo;
pub use reading::{MotherMeterReading, Reading};

//! Payment model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a payment was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    Cash,
    GCash,
    Maya,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Cash => "cash",
            PaymentType::GCash => "gcash",
            PaymentType::Maya => "maya",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "gcash" => PaymentType::GCash,
            "maya" => PaymentType::Maya,
            _ => PaymentType::Cash,
        }
    }

    /// E-wallet payments carry a service fee.
    pub fn is_electronic(&self) -> bool {
        !matches!(self, PaymentType::Cash)
    }
}

impl std::fmt::Display for PaymentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A payment recorded against a bill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub payment_id: Uuid,
    pub bill_id: Uuid,
    pub consumer_id: Uuid,
    /// User who processed the payment.
    pub processed_by: Uuid,
    pub payment_date: DateTime<Utc>,
    pub amount_paid: Decimal,
    pub penalty: Decimal,
    pub payment_type: PaymentType,
}

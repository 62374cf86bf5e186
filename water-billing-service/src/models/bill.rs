//! Bill model.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Payment;

/// Collection status of a bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillStatus {
    Unpaid,
    Partial,
    Paid,
    Overdue,
}

impl BillStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillStatus::Unpaid => "unpaid",
            BillStatus::Partial => "partial",
            BillStatus::Paid => "paid",
            BillStatus::Overdue => "overdue",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "partial" => BillStatus::Partial,
            "paid" => BillStatus::Paid,
            "overdue" => BillStatus::Overdue,
            _ => BillStatus::Unpaid,
        }
    }
}

impl std::fmt::Display for BillStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Delivery status of the bill notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotifStatus {
    Pending,
    Sent,
    Failed,
}

impl NotifStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifStatus::Pending => "Pending",
            NotifStatus::Sent => "Sent",
            NotifStatus::Failed => "Failed",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "Sent" => NotifStatus::Sent,
            "Failed" => NotifStatus::Failed,
            _ => NotifStatus::Pending,
        }
    }
}

/// A consumer's bill for one month.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bill {
    pub bill_id: Uuid,
    pub consumer_id: Uuid,
    pub reading_id: Uuid,
    pub mother_reading_id: Uuid,
    /// First day of the billed month.
    pub month_year: NaiveDate,
    pub billing_date: DateTime<Utc>,
    pub system_loss: Decimal,
    pub subsidy: Decimal,
    /// Amount carried over from the previous bill.
    pub balance: Decimal,
    pub total_amount: Decimal,
    pub status: BillStatus,
    pub notif_status: NotifStatus,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// A bill with the payments recorded against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillWithPayments {
    #[serde(flatten)]
    pub bill: Bill,
    pub payments: Vec<Payment>,
}

impl BillWithPayments {
    /// Sum of every payment's `amount_paid`.
    pub fn amount_paid(&self) -> Decimal {
        self.payments.iter().map(|p| p.amount_paid).sum()
    }

    pub fn has_payments(&self) -> bool {
        !self.payments.is_empty()
    }
}

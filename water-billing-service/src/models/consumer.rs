//! Consumer model.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{BillWithPayments, Reading};

/// Service status of a consumer's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerStatus {
    Active,
    Disconnected,
    Cut,
}

impl ConsumerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsumerStatus::Active => "active",
            ConsumerStatus::Disconnected => "disconnected",
            ConsumerStatus::Cut => "cut",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "disconnected" => ConsumerStatus::Disconnected,
            "cut" => ConsumerStatus::Cut,
            _ => ConsumerStatus::Active,
        }
    }
}

/// Channels a consumer wants bill notices on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPreference {
    Sms,
    Email,
    Both,
}

impl NotificationPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationPreference::Sms => "sms",
            NotificationPreference::Email => "email",
            NotificationPreference::Both => "both",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "email" => NotificationPreference::Email,
            "both" => NotificationPreference::Both,
            _ => NotificationPreference::Sms,
        }
    }

    pub fn wants_sms(&self) -> bool {
        matches!(self, NotificationPreference::Sms | NotificationPreference::Both)
    }

    pub fn wants_email(&self) -> bool {
        matches!(self, NotificationPreference::Email | NotificationPreference::Both)
    }
}

/// A metered household or establishment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consumer {
    pub consumer_id: Uuid,
    pub name: String,
    pub meter_number: String,
    pub status: ConsumerStatus,
    pub notification_preference: NotificationPreference,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl Consumer {
    pub fn is_active(&self) -> bool {
        self.status == ConsumerStatus::Active
    }
}

/// A consumer together with every reading and bill on record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerHistory {
    pub consumer: Consumer,
    pub readings: Vec<Reading>,
    pub bills: Vec<BillWithPayments>,
}

impl ConsumerHistory {
    /// Reading recorded for exactly `month_year`.
    pub fn reading_for(&self, month_year: NaiveDate) -> Option<&Reading> {
        self.readings.iter().find(|r| r.month_year == month_year)
    }

    /// Bill issued for exactly `month_year`.
    pub fn bill_for(&self, month_year: NaiveDate) -> Option<&BillWithPayments> {
        self.bills.iter().find(|b| b.bill.month_year == month_year)
    }

    /// Most recent bill strictly before `month_year`.
    pub fn latest_bill_before(&self, month_year: NaiveDate) -> Option<&BillWithPayments> {
        self.bills
            .iter()
            .filter(|b| b.bill.month_year < month_year)
            .max_by_key(|b| b.bill.month_year)
    }

    /// Most recent bill overall.
    pub fn latest_bill(&self) -> Option<&BillWithPayments> {
        self.bills.iter().max_by_key(|b| b.bill.month_year)
    }
}

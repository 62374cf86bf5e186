//! Errors raised by the billing core.

use chrono::NaiveDate;
use service_core::error::AppError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Mother meter reading missing for {0}")]
    MotherReadingMissing(NaiveDate),

    #[error("Rates are not configured")]
    RatesMissing,

    #[error("System loss not computable for {0}: no consumer usage recorded")]
    SystemLossNotComputable(NaiveDate),

    #[error("Invalid bill {0}")]
    InvalidBill(Uuid),

    #[error("Payment {0} not found")]
    PaymentNotFound(Uuid),

    #[error("No bills to delete for {0}")]
    NothingToDelete(NaiveDate),

    #[error("Bills for {0} have payments and cannot be deleted")]
    PaymentsExist(NaiveDate),

    #[error("Payment amount must be greater than zero")]
    InvalidAmount,

    #[error(transparent)]
    Store(#[from] AppError),
}

impl BillingError {
    /// Short label used for error metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            BillingError::MotherReadingMissing(_) => "mother_reading_missing",
            BillingError::RatesMissing => "rates_missing",
            BillingError::SystemLossNotComputable(_) => "system_loss_not_computable",
            BillingError::InvalidBill(_) => "invalid_bill",
            BillingError::PaymentNotFound(_) => "payment_not_found",
            BillingError::NothingToDelete(_) => "nothing_to_delete",
            BillingError::PaymentsExist(_) => "payments_exist",
            BillingError::InvalidAmount => "invalid_amount",
            BillingError::Store(e) => e.kind(),
        }
    }
}

impl From<BillingError> for AppError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::MotherReadingMissing(_)
            | BillingError::RatesMissing
            | BillingError::SystemLossNotComputable(_) => {
                AppError::FailedPrecondition(anyhow::anyhow!(err.to_string()))
            }
            BillingError::InvalidBill(_)
            | BillingError::PaymentNotFound(_)
            | BillingError::NothingToDelete(_) => AppError::NotFound(anyhow::anyhow!(err.to_string())),
            BillingError::PaymentsExist(_) => AppError::Conflict(anyhow::anyhow!(err.to_string())),
            BillingError::InvalidAmount => AppError::BadRequest(anyhow::anyhow!(err.to_string())),
            BillingError::Store(e) => e,
        }
    }
}

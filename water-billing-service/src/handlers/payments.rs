//! Payment recording and reversal.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::billing::{PaymentReceipt, RecordPayment};
use crate::middleware::ProcessorId;
use crate::models::{Bill, Payment, PaymentType};
use crate::startup::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct RecordPaymentRequest {
    pub bill_id: Uuid,
    #[validate(custom(function = "positive_amount"))]
    pub amount_paid: Decimal,
    pub payment_type: PaymentType,
}

fn positive_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if *amount > Decimal::ZERO {
        Ok(())
    } else {
        Err(ValidationError::new("amount_must_be_positive"))
    }
}

#[derive(Debug, Serialize)]
pub struct ReversalResponse {
    pub payment: Payment,
    pub bill: Bill,
}

pub async fn record_payment(
    State(state): State<AppState>,
    ProcessorId(processed_by): ProcessorId,
    Json(payload): Json<RecordPaymentRequest>,
) -> Result<(StatusCode, Json<PaymentReceipt>), AppError> {
    payload.validate()?;

    let receipt = state
        .ledger
        .record_payment(
            RecordPayment {
                bill_id: payload.bill_id,
                amount_paid: payload.amount_paid,
                payment_type: payload.payment_type,
                processed_by,
            },
            Utc::now(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(receipt)))
}

pub async fn reverse_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<ReversalResponse>, AppError> {
    let (payment, bill) = state.ledger.reverse_payment(payment_id).await?;
    Ok(Json(ReversalResponse { payment, bill }))
}

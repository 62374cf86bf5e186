//! Bill generation and month rollback.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use validator::Validate;

use super::month_param;
use crate::billing::GenerationOutcome;
use crate::models::BillWithPayments;
use crate::startup::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct GenerateBillsRequest {
    /// Any date in the month to bill, `YYYY-MM` or `YYYY-MM-DD`.
    #[validate(length(min = 7, max = 10))]
    pub month_year: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteBillsResponse {
    pub month_year: NaiveDate,
    pub deleted: u64,
}

pub async fn generate_bills(
    State(state): State<AppState>,
    Json(payload): Json<GenerateBillsRequest>,
) -> Result<(StatusCode, Json<GenerationOutcome>), AppError> {
    payload.validate()?;
    let month_year = month_param(&payload.month_year)?;

    let outcome = state.bills.generate_bills(month_year).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn month_bills(
    State(state): State<AppState>,
    Path(month): Path<String>,
) -> Result<Json<Vec<BillWithPayments>>, AppError> {
    let month_year = month_param(&month)?;
    Ok(Json(state.bills.month_bills(month_year).await?))
}

pub async fn delete_bills(
    State(state): State<AppState>,
    Path(month): Path<String>,
) -> Result<Json<DeleteBillsResponse>, AppError> {
    let month_year = month_param(&month)?;
    tracing::info!(month_year = %month_year, "Deleting month bills");

    let deleted = state.bills.delete_bills(month_year).await?;
    Ok(Json(DeleteBillsResponse {
        month_year,
        deleted,
    }))
}

//! System loss and collection reports.

use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;

use super::month_param;
use crate::billing::month::month_bounds;
use crate::billing::{
    disconnection_candidates, income_summary, DisconnectionCandidate, IncomeSummary, SystemLoss,
};
use crate::startup::AppState;

pub async fn system_loss(
    State(state): State<AppState>,
    Path(month): Path<String>,
) -> Result<Json<SystemLoss>, AppError> {
    let month_year = month_param(&month)?;
    Ok(Json(state.bills.system_loss(month_year).await?))
}

pub async fn income(
    State(state): State<AppState>,
    Path(month): Path<String>,
) -> Result<Json<IncomeSummary>, AppError> {
    let month_year = month_param(&month)?;
    let (start, end) = month_bounds(month_year);

    let payments = state.store.payments_between(start, end).await?;
    Ok(Json(income_summary(month_year, &payments)))
}

pub async fn disconnections(
    State(state): State<AppState>,
) -> Result<Json<Vec<DisconnectionCandidate>>, AppError> {
    let histories = state.store.active_consumers_with_history().await?;
    Ok(Json(disconnection_candidates(&histories)))
}

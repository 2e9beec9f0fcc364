// src/routes/finance_routes.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{patch, post},
    Json, Router,
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::{api_json::ApiJson, auth_context::AuthContext},
    models::{
        AppState, CreateFinanceRequest, Finance, Populated, UpdateFinanceStatusRequest,
    },
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/finances", post(create_finance).get(list_finances))
        .route("/finances/{finance_id}", patch(update_finance_status))
}

pub async fn create_finance(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(req): ApiJson<CreateFinanceRequest>,
) -> Result<(StatusCode, Json<Finance>), ApiError> {
    let concept = req.concept.trim();
    if concept.is_empty() {
        return Err(ApiError::validation("concept is required"));
    }
    if !req.amount.is_finite() {
        return Err(ApiError::validation("amount must be a finite number"));
    }

    if state.store.get_patient(req.patient_id).await?.is_none() {
        return Err(ApiError::unknown_patient());
    }

    let now = Utc::now();
    let entry = Finance {
        id: Uuid::new_v4(),
        patient_id: req.patient_id,
        concept: concept.to_string(),
        amount: req.amount,
        date: req.date.unwrap_or(now),
        status: req.status.unwrap_or_default(),
        created_at: now,
    };

    state.store.insert_finance(&entry).await?;
    tracing::info!(finance_id = %entry.id, by = %auth.user_id, status = %entry.status, "finance entry created");

    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn list_finances(
    State(state): State<AppState>,
    _auth: AuthContext,
) -> Result<Json<Vec<Populated<Finance>>>, ApiError> {
    Ok(Json(state.store.list_finances().await?))
}

/// PATCH /api/finances/{id}
/// Only the payment status is mutable.
pub async fn update_finance_status(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(finance_id): Path<Uuid>,
    ApiJson(req): ApiJson<UpdateFinanceStatusRequest>,
) -> Result<Json<Finance>, ApiError> {
    let entry = state
        .store
        .update_finance_status(finance_id, req.status)
        .await?
        .ok_or_else(|| ApiError::not_found("finance entry"))?;

    tracing::info!(finance_id = %entry.id, by = %auth.user_id, status = %entry.status, "finance status changed");
    Ok(Json(entry))
}

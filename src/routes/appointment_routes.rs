// src/routes/appointment_routes.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use chrono::{DateTime, NaiveTime, Utc};
use uuid::Uuid;

use crate::{
    calendar::CalendarEvent,
    error::ApiError,
    middleware::{api_json::ApiJson, auth_context::AuthContext},
    models::{clean_opt, AppState, Appointment, CreateAppointmentRequest, Populated},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/appointments", post(create_appointment).get(list_appointments))
        .route("/appointments/{appointment_id}/calendar_sync", post(sync_calendar))
}

/// `date` carries the day; `time` (HH:MM), when present, overrides its time of day.
fn appointment_start(date: DateTime<Utc>, time: Option<&str>) -> Result<DateTime<Utc>, ApiError> {
    let Some(time) = time else {
        return Ok(date);
    };

    let tod = NaiveTime::parse_from_str(time, "%H:%M")
        .map_err(|_| ApiError::validation("time must be HH:MM"))?;

    Ok(date.date_naive().and_time(tod).and_utc())
}

/// Claims the appointment's sync flag, then pushes it to the calendar.
/// Only the caller that wins the claim talks to the calendar; a calendar
/// failure releases the flag so `calendar_sync` can retry. Nothing here fails
/// the request: the appointment is already stored.
async fn push_to_calendar(state: &AppState, appointment: &mut Appointment) {
    match state.store.claim_calendar_sync(appointment.id).await {
        Ok(true) => {}
        Ok(false) => {
            // synced already, or another request is pushing it right now
            appointment.calendar_synced = true;
            return;
        }
        Err(e) => {
            tracing::warn!(
                appointment_id = %appointment.id,
                error = %e,
                "could not claim calendar sync; retry via calendar_sync"
            );
            return;
        }
    }

    let event = CalendarEvent::for_appointment(appointment.date, appointment.notes.as_deref());
    match state.calendar.insert_event(&event).await {
        Ok(()) => appointment.calendar_synced = true,
        Err(e) => {
            tracing::warn!(
                appointment_id = %appointment.id,
                error = %e,
                "calendar event failed; appointment kept, retry via calendar_sync"
            );
            if let Err(e) = state.store.set_calendar_synced(appointment.id, false).await {
                tracing::error!(
                    appointment_id = %appointment.id,
                    error = %e,
                    "could not release calendar sync flag; appointment shows as synced"
                );
            }
        }
    }
}

pub async fn create_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(req): ApiJson<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<Appointment>), ApiError> {
    let time = clean_opt(req.time);
    let start = appointment_start(req.date, time.as_deref())?;

    if state.store.get_patient(req.patient_id).await?.is_none() {
        return Err(ApiError::unknown_patient());
    }

    let mut appointment = Appointment {
        id: Uuid::new_v4(),
        patient_id: req.patient_id,
        doctor: clean_opt(req.doctor),
        date: start,
        time,
        status: req.status.unwrap_or_default(),
        notes: clean_opt(req.notes),
        calendar_synced: false,
        created_at: Utc::now(),
    };

    state.store.insert_appointment(&appointment).await?;
    tracing::info!(appointment_id = %appointment.id, by = %auth.user_id, start = %start, "appointment created");

    push_to_calendar(&state, &mut appointment).await;

    Ok((StatusCode::CREATED, Json(appointment)))
}

pub async fn list_appointments(
    State(state): State<AppState>,
    _auth: AuthContext,
) -> Result<Json<Vec<Populated<Appointment>>>, ApiError> {
    Ok(Json(state.store.list_appointments().await?))
}

/// POST /api/appointments/{id}/calendar_sync
/// Retries the calendar event for an appointment that never reached it.
pub async fn sync_calendar(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Appointment>, ApiError> {
    let mut appointment = state
        .store
        .get_appointment(appointment_id)
        .await?
        .ok_or_else(|| ApiError::not_found("appointment"))?;

    if !appointment.calendar_synced {
        push_to_calendar(&state, &mut appointment).await;
    }

    Ok(Json(appointment))
}

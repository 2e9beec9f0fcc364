// src/routes/record_routes.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{post, put},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::{api_json::ApiJson, auth_context::AuthContext},
    models::{
        clean_opt, AppState, CreateRecordRequest, Populated, Record, UpdateRecordRequest,
    },
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/records", post(create_record).get(list_records))
        .route("/records/{record_id}", put(update_record).delete(delete_record))
}

#[derive(Debug, Deserialize)]
pub struct RecordQuery {
    pub patient: Option<Uuid>,
}

fn required(value: &str, field: &str) -> Result<String, ApiError> {
    let v = value.trim();
    if v.is_empty() {
        return Err(ApiError::validation(format!("{field} is required")));
    }
    Ok(v.to_string())
}

pub async fn create_record(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(req): ApiJson<CreateRecordRequest>,
) -> Result<(StatusCode, Json<Record>), ApiError> {
    let diagnosis = required(&req.diagnosis, "diagnosis")?;
    let treatment = required(&req.treatment, "treatment")?;

    if state.store.get_patient(req.patient_id).await?.is_none() {
        return Err(ApiError::unknown_patient());
    }

    let now = Utc::now();
    let record = Record {
        id: Uuid::new_v4(),
        patient_id: req.patient_id,
        diagnosis,
        treatment,
        date: req.date.unwrap_or(now),
        doctor: clean_opt(req.doctor),
        notes: clean_opt(req.notes),
        created_at: now,
    };

    state.store.insert_record(&record).await?;
    tracing::info!(record_id = %record.id, patient_id = %record.patient_id, by = %auth.user_id, "record created");

    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/records?patient={id}
pub async fn list_records(
    State(state): State<AppState>,
    _auth: AuthContext,
    Query(q): Query<RecordQuery>,
) -> Result<Json<Vec<Populated<Record>>>, ApiError> {
    Ok(Json(state.store.list_records(q.patient).await?))
}

/// PUT /api/records/{id}
/// Replaces the clinical fields; the patient link and creation time stay fixed.
pub async fn update_record(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(record_id): Path<Uuid>,
    ApiJson(req): ApiJson<UpdateRecordRequest>,
) -> Result<Json<Record>, ApiError> {
    let diagnosis = required(&req.diagnosis, "diagnosis")?;
    let treatment = required(&req.treatment, "treatment")?;

    let existing = state
        .store
        .get_record(record_id)
        .await?
        .ok_or_else(|| ApiError::not_found("record"))?;

    let record = Record {
        diagnosis,
        treatment,
        date: req.date.unwrap_or(existing.date),
        doctor: clean_opt(req.doctor),
        notes: clean_opt(req.notes),
        ..existing
    };

    // row may have been deleted between the read and the write
    if !state.store.update_record(&record).await? {
        return Err(ApiError::not_found("record"));
    }

    tracing::info!(record_id = %record.id, by = %auth.user_id, "record updated");
    Ok(Json(record))
}

pub async fn delete_record(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(record_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if !state.store.delete_record(record_id).await? {
        return Err(ApiError::not_found("record"));
    }

    tracing::info!(record_id = %record_id, by = %auth.user_id, "record deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::test_support::TestApp;

    #[tokio::test]
    async fn record_lifecycle() {
        let app = TestApp::new().await;
        let token = app.token();
        let patient = app.create_patient("Ana").await;

        let (status, created) = app
            .post_json("/api/records", Some(&token), json!({
                "patient_id": patient,
                "diagnosis": "caries",
                "treatment": "filling",
                "doctor": "Dr. Ruiz",
            }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{created}");
        let id = created["id"].as_str().unwrap().to_string();
        let path = format!("/api/records/{id}");

        let (status, updated) = app
            .request(Method::PUT, &path, Some(&token), Some(json!({
                "diagnosis": "caries",
                "treatment": "root canal",
            })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["treatment"], "root canal");
        assert_eq!(updated["patient_id"], patient.as_str());
        assert_eq!(updated["date"], created["date"]);
        assert!(updated["doctor"].is_null());

        let (_, list) = app
            .get(&format!("/api/records?patient={patient}"), Some(&token))
            .await;
        assert_eq!(list.as_array().map(Vec::len), Some(1));
        assert_eq!(list[0]["treatment"], "root canal");
        assert_eq!(list[0]["patient"]["name"], "Ana");

        let (status, _) = app.request(Method::DELETE, &path, Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = app.request(Method::DELETE, &path, Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, list) = app.get("/api/records", Some(&token)).await;
        assert_eq!(list, json!([]));
    }

    #[tokio::test]
    async fn patient_filter_excludes_other_patients() {
        let app = TestApp::new().await;
        let token = app.token();
        let ana = app.create_patient("Ana").await;
        let luis = app.create_patient("Luis").await;

        for patient in [&ana, &luis] {
            let (status, _) = app
                .post_json("/api/records", Some(&token), json!({
                    "patient_id": patient,
                    "diagnosis": "gingivitis",
                    "treatment": "cleaning",
                }))
                .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (_, list) = app.get(&format!("/api/records?patient={luis}"), Some(&token)).await;
        let list = list.as_array().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["patient"]["name"], "Luis");

        let (_, all) = app.get("/api/records", Some(&token)).await;
        assert_eq!(all.as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn blank_diagnosis_is_rejected() {
        let app = TestApp::new().await;
        let patient = app.create_patient("Ana").await;
        let (status, body) = app
            .post_json("/api/records", Some(&app.token()), json!({
                "patient_id": patient,
                "diagnosis": "",
                "treatment": "cleaning",
            }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn update_unknown_record_is_not_found() {
        let app = TestApp::new().await;
        let path = format!("/api/records/{}", uuid::Uuid::new_v4());
        let (status, _) = app
            .request(Method::PUT, &path, Some(&app.token()), Some(json!({
                "diagnosis": "x",
                "treatment": "y",
            })))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn records_require_a_token() {
        let app = TestApp::new().await;
        let (status, _) = app.get("/api/records", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}

// src/routes/patient_routes.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::{api_json::ApiJson, auth_context::AuthContext},
    models::{clean_opt, AppState, CreatePatientRequest, Patient},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/patients", post(create_patient).get(list_patients))
        .route("/patients/{patient_id}", get(get_patient))
}

pub async fn create_patient(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(req): ApiJson<CreatePatientRequest>,
) -> Result<(StatusCode, Json<Patient>), ApiError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::validation("name is required"));
    }

    let patient = Patient {
        id: Uuid::new_v4(),
        name: name.to_string(),
        email: clean_opt(req.email),
        phone: clean_opt(req.phone),
        birth_date: req.birth_date,
        notes: clean_opt(req.notes),
        created_at: Utc::now(),
    };

    state.store.insert_patient(&patient).await?;
    tracing::info!(patient_id = %patient.id, by = %auth.user_id, "patient created");

    Ok((StatusCode::CREATED, Json(patient)))
}

pub async fn list_patients(
    State(state): State<AppState>,
    _auth: AuthContext,
) -> Result<Json<Vec<Patient>>, ApiError> {
    Ok(Json(state.store.list_patients().await?))
}

pub async fn get_patient(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<Patient>, ApiError> {
    let patient = state
        .store
        .get_patient(patient_id)
        .await?
        .ok_or_else(|| ApiError::not_found("patient"))?;

    Ok(Json(patient))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::db::Store;
    use crate::test_support::TestApp;

    #[tokio::test]
    async fn create_then_fetch_patient() {
        let app = TestApp::new().await;
        let token = app.token();

        let (status, created) = app
            .post_json("/api/patients", Some(&token), json!({
                "name": "Ana Lopez",
                "email": "ana@example.com",
                "phone": "+34 600 000 000",
            }))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["name"], "Ana Lopez");

        let id = created["id"].as_str().unwrap();
        let (status, fetched) = app.get(&format!("/api/patients/{id}"), Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["name"], "Ana Lopez");
        assert_eq!(fetched["email"], "ana@example.com");
        assert_eq!(fetched["phone"], "+34 600 000 000");

        let (_, list) = app.get("/api/patients", Some(&token)).await;
        assert_eq!(list.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn patient_email_is_stored_as_given() {
        let app = TestApp::new().await;
        let token = app.token();

        let (status, created) = app
            .post_json("/api/patients", Some(&token), json!({
                "name": "Ana Lopez",
                "email": "  Ana.Lopez@Example.com ",
            }))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["email"], "Ana.Lopez@Example.com");

        let id = created["id"].as_str().unwrap();
        let (_, fetched) = app.get(&format!("/api/patients/{id}"), Some(&token)).await;
        assert_eq!(fetched["email"], "Ana.Lopez@Example.com");
    }

    #[tokio::test]
    async fn empty_patient_list_is_an_empty_array() {
        let app = TestApp::new().await;
        let (status, body) = app.get("/api/patients", Some(&app.token())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn patients_require_a_token() {
        let app = TestApp::new().await;

        let (status, body) = app.get("/api/patients", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "TOKEN_REQUIRED");

        let (status, _) = app
            .post_json("/api/patients", None, json!({ "name": "Ana" }))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(app.store.list_patients().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn blank_name_is_rejected() {
        let app = TestApp::new().await;
        let (status, body) = app
            .post_json("/api/patients", Some(&app.token()), json!({ "name": "  " }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn unknown_patient_is_not_found() {
        let app = TestApp::new().await;
        let path = format!("/api/patients/{}", uuid::Uuid::new_v4());
        let (status, body) = app.get(&path, Some(&app.token())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }
}

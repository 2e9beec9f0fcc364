use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};

use crate::{
    auth::verify_password,
    error::ApiError,
    middleware::{api_json::ApiJson, auth_context::AuthContext},
    models::*,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/me", get(me))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let email = normalize_email(&req.email);
    if email.is_empty() || req.password.is_empty() {
        return Err(ApiError::validation("email and password are required"));
    }

    // 1) Load user
    let user = state
        .store
        .find_user_by_email(&email)
        .await?
        .ok_or_else(ApiError::invalid_credentials)?;

    // 2) Verify password
    if !verify_password(&req.password, &user.password_hash) {
        tracing::info!(user_id = %user.id, "login rejected: bad password");
        return Err(ApiError::invalid_credentials());
    }

    // 3) Issue token
    let issued = state.tokens.issue(user.id, user.role).map_err(|e| {
        tracing::error!(user_id = %user.id, error = %e, "token issue failed");
        ApiError::Internal("could not issue token".into())
    })?;
    tracing::info!(user_id = %user.id, role = %user.role, "login success");

    Ok(Json(LoginResponse {
        token: issued.token,
        expires_at: issued.expires_at,
        user: UserProfile {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
        },
    }))
}

pub async fn me(auth: AuthContext) -> Json<MeResponse> {
    Json(MeResponse {
        user_id: auth.user_id,
        role: auth.role,
    })
}

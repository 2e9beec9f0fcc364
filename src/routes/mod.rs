use crate::models::AppState;
use axum::Router;

pub mod appointment_routes;
pub mod auth_routes;
pub mod finance_routes;
pub mod patient_routes;
pub mod record_routes;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/auth", auth_routes::router())
        .nest("/api", patient_routes::router())
        .nest("/api", appointment_routes::router())
        .nest("/api", finance_routes::router())
        .nest("/api", record_routes::router())
        .with_state(state)
}

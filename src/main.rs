mod auth;
mod calendar;
mod config;
mod middleware;

mod db;
mod error;
mod models;
mod routes;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    auth::{TokenKeys, hash_password},
    calendar::{CalendarClient, DisabledCalendar, GoogleCalendar},
    config::{BootstrapAdmin, Config},
    models::{AppState, Role, User, normalize_email},
};

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use axum::http::header;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cfg = Config::from_env()?;
    let store = db::open_store(&cfg.database_url).await?;

    if let Some(admin) = &cfg.bootstrap_admin {
        bootstrap_admin(store.as_ref(), admin).await?;
    }

    let calendar: Arc<dyn CalendarClient> = match cfg.calendar.clone() {
        Some(gcfg) => {
            tracing::info!(calendar_id = %gcfg.calendar_id, "google calendar enabled");
            Arc::new(GoogleCalendar::new(gcfg, cfg.calendar_timeout_secs)?)
        }
        None => {
            tracing::info!("google calendar not configured, events are skipped");
            Arc::new(DisabledCalendar)
        }
    };

    if cfg.token_ttl_hours.is_none() {
        tracing::warn!("TOKEN_TTL_HOURS=0: issued tokens never expire");
    }

    let state = AppState {
        store,
        calendar,
        tokens: TokenKeys::new(&cfg.jwt_secret, cfg.token_ttl_hours),
    };

    // Browser SPA is served from another origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
        ]);

    let app = routes::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!("Listening on http://{}", cfg.bind_addr);
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn bootstrap_admin(store: &dyn db::Store, admin: &BootstrapAdmin) -> anyhow::Result<()> {
    let email = normalize_email(&admin.email);
    if store.find_user_by_email(&email).await?.is_some() {
        tracing::debug!(%email, "bootstrap admin already present");
        return Ok(());
    }

    let user = User {
        id: Uuid::new_v4(),
        name: "Administrator".to_string(),
        email,
        password_hash: hash_password(&admin.password).map_err(anyhow::Error::msg)?,
        role: Role::Admin,
        created_at: Utc::now(),
    };
    store.insert_user(&user).await?;
    tracing::info!(email = %user.email, "bootstrap admin created");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::verify_password;
    use crate::db::{MemoryStore, Store};

    #[tokio::test]
    async fn bootstrap_admin_is_created_once() {
        let store = MemoryStore::new();
        let admin = BootstrapAdmin {
            email: "Root@Clinic.test".into(),
            password: "changeme".into(),
        };

        bootstrap_admin(&store, &admin).await.unwrap();
        bootstrap_admin(&store, &admin).await.unwrap();

        let user = store
            .find_user_by_email("root@clinic.test")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.role, Role::Admin);
        assert!(verify_password("changeme", &user.password_hash));
    }
}

// Shared fixtures for router tests: in-memory store, recording calendar, seeded staff user.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicU64, Ordering},
};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use chrono::Utc;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use crate::{
    auth::{TokenKeys, hash_password},
    calendar::{CalendarClient, CalendarEvent},
    db::{MemoryStore, Store},
    error::CalendarError,
    models::{AppState, Role, User},
    routes,
};

/// Calendar double that records every event and can be told to fail.
#[derive(Default)]
pub struct RecordingCalendar {
    events: Mutex<Vec<CalendarEvent>>,
    failing: AtomicBool,
    delay_ms: AtomicU64,
}

impl RecordingCalendar {
    pub fn events(&self) -> Vec<CalendarEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Holds every call open this long, like a slow upstream.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl CalendarClient for RecordingCalendar {
    async fn insert_event(&self, event: &CalendarEvent) -> Result<(), CalendarError> {
        self.events.lock().unwrap().push(event.clone());
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(CalendarError::Rejected {
                status: 503,
                body: "unavailable".into(),
            });
        }
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub calendar: Arc<RecordingCalendar>,
    pub tokens: TokenKeys,
    pub staff: User,
}

impl TestApp {
    /// Seeds `doc@clinic.test` / `correct horse` as a clinician.
    pub async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let calendar = Arc::new(RecordingCalendar::default());
        let tokens = TokenKeys::new("test-secret", Some(1));

        let staff = User {
            id: Uuid::new_v4(),
            name: "Dr. Test".into(),
            email: "doc@clinic.test".into(),
            password_hash: hash_password("correct horse").unwrap(),
            role: Role::Clinician,
            created_at: Utc::now(),
        };
        store.insert_user(&staff).await.unwrap();

        let state = AppState {
            store: store.clone(),
            calendar: calendar.clone(),
            tokens: tokens.clone(),
        };

        Self {
            router: routes::router(state),
            store,
            calendar,
            tokens,
            staff,
        }
    }

    pub fn token(&self) -> String {
        self.tokens.issue(self.staff.id, self.staff.role).unwrap().token
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(t) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        let req = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::GET, path, token, None).await
    }

    pub async fn post_json(&self, path: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, path, token, Some(body)).await
    }

    /// Creates a patient through the API and returns its id.
    pub async fn create_patient(&self, name: &str) -> String {
        let token = self.token();
        let (status, body) = self
            .post_json("/api/patients", Some(&token), serde_json::json!({ "name": name }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().to_string()
    }
}

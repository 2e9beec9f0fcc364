// src/calendar.rs

use std::time::{Duration as StdDuration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::GoogleCalendarConfig;
use crate::error::CalendarError;

/// Every appointment blocks this much of the calendar.
pub const APPOINTMENT_SLOT_MINUTES: i64 = 30;

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const EVENTS_URL: &str = "https://www.googleapis.com/calendar/v3/calendars";

#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEvent {
    pub summary: String,
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl CalendarEvent {
    pub fn for_appointment(start: DateTime<Utc>, notes: Option<&str>) -> Self {
        Self {
            summary: "Dental appointment".to_string(),
            description: notes.map(str::to_string),
            start,
            end: start + Duration::minutes(APPOINTMENT_SLOT_MINUTES),
        }
    }
}

#[async_trait]
pub trait CalendarClient: Send + Sync {
    async fn insert_event(&self, event: &CalendarEvent) -> Result<(), CalendarError>;
}

/// Used when no calendar credentials are configured.
pub struct DisabledCalendar;

#[async_trait]
impl CalendarClient for DisabledCalendar {
    async fn insert_event(&self, event: &CalendarEvent) -> Result<(), CalendarError> {
        tracing::debug!(start = %event.start, "calendar disabled, skipping event");
        Ok(())
    }
}

#[derive(Serialize)]
struct EventTime {
    #[serde(rename = "dateTime")]
    date_time: DateTime<Utc>,
}

#[derive(Serialize)]
struct EventBody<'a> {
    summary: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    start: EventTime,
    end: EventTime,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

struct CachedToken {
    value: String,
    valid_until: Instant,
}

/// Google Calendar v3 client authenticated with an OAuth2 refresh token.
pub struct GoogleCalendar {
    http: reqwest::Client,
    cfg: GoogleCalendarConfig,
    token: Mutex<Option<CachedToken>>,
}

impl GoogleCalendar {
    pub fn new(cfg: GoogleCalendarConfig, timeout_secs: u64) -> Result<Self, CalendarError> {
        let http = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            http,
            cfg,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String, CalendarError> {
        let mut cached = self.token.lock().await;
        if let Some(t) = cached.as_ref() {
            if t.valid_until > Instant::now() {
                return Ok(t.value.clone());
            }
        }

        let resp = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("client_id", self.cfg.client_id.as_str()),
                ("client_secret", self.cfg.client_secret.as_str()),
                ("refresh_token", self.cfg.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(CalendarError::Auth(format!("{status}: {body}")));
        }

        let token: TokenResponse = resp.json().await?;
        // refresh a minute early
        let ttl = token.expires_in.unwrap_or(3600).saturating_sub(60);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            valid_until: Instant::now() + StdDuration::from_secs(ttl),
        });

        Ok(token.access_token)
    }
}

#[async_trait]
impl CalendarClient for GoogleCalendar {
    async fn insert_event(&self, event: &CalendarEvent) -> Result<(), CalendarError> {
        let token = self.access_token().await?;
        let url = format!("{EVENTS_URL}/{}/events", self.cfg.calendar_id);

        let body = EventBody {
            summary: &event.summary,
            description: event.description.as_deref(),
            start: EventTime { date_time: event.start },
            end: EventTime { date_time: event.end },
        };

        let resp = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CalendarError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!(start = %event.start, "calendar event created");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appointment_event_spans_thirty_minutes() {
        let start = "2026-03-02T09:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let event = CalendarEvent::for_appointment(start, Some("checkup"));

        assert_eq!(event.end - event.start, Duration::minutes(30));
        assert_eq!(event.description.as_deref(), Some("checkup"));
    }

    #[test]
    fn event_body_uses_google_field_names() {
        let start = "2026-03-02T09:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let body = EventBody {
            summary: "Dental appointment",
            description: None,
            start: EventTime { date_time: start },
            end: EventTime { date_time: start + Duration::minutes(30) },
        };
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["start"]["dateTime"], "2026-03-02T09:00:00Z");
        assert_eq!(json["end"]["dateTime"], "2026-03-02T09:30:00Z");
        assert!(json.get("description").is_none());
    }

    #[tokio::test]
    async fn disabled_calendar_accepts_events() {
        let event = CalendarEvent::for_appointment(Utc::now(), None);
        assert!(DisabledCalendar.insert_event(&event).await.is_ok());
    }
}

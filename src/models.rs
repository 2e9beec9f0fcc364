use std::{fmt, str::FromStr, sync::Arc};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{auth::TokenKeys, calendar::CalendarClient, db::Store};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub calendar: Arc<dyn CalendarClient>,
    pub tokens: TokenKeys,
}

/* -------------------------
   Enumerations
--------------------------*/

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Clinician,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    #[default]
    Pending,
    Confirmed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinanceStatus {
    Paid,
    #[default]
    Pending,
}

/// Error for a stored string that does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown value {:?}", self.0)
    }
}

// Statuses and roles are stored as lowercase text, same spelling as the JSON.
macro_rules! text_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text,)+
                }
            }
        }

        impl FromStr for $ty {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($ty::$variant),)+
                    other => Err(UnknownVariant(other.to_string())),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(Role { Admin => "admin", Clinician => "clinician" });
text_enum!(AppointmentStatus {
    Pending => "pending",
    Confirmed => "confirmed",
    Cancelled => "cancelled",
});
text_enum!(FinanceStatus { Paid => "paid", Pending => "pending" });

/* -------------------------
   Stored entities
--------------------------*/

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Patient {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor: Option<String>,
    pub date: DateTime<Utc>,
    pub time: Option<String>,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub calendar_synced: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finance {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub concept: String,
    pub amount: f64,
    pub date: DateTime<Utc>,
    pub status: FinanceStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub diagnosis: String,
    pub treatment: String,
    pub date: DateTime<Utc>,
    pub doctor: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An entity with its `patient_id` resolved to the full patient.
/// `patient` is `None` when the reference no longer resolves.
#[derive(Debug, Clone, Serialize)]
pub struct Populated<T> {
    #[serde(flatten)]
    pub item: T,
    pub patient: Option<Patient>,
}

/* -------------------------
   API DTOs
--------------------------*/

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub user: UserProfile,
}

#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user_id: Uuid,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct CreatePatientRequest {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateAppointmentRequest {
    pub patient_id: Uuid,
    pub doctor: Option<String>,
    pub date: DateTime<Utc>,
    pub time: Option<String>,
    pub status: Option<AppointmentStatus>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateFinanceRequest {
    pub patient_id: Uuid,
    pub concept: String,
    pub amount: f64,
    pub date: Option<DateTime<Utc>>,
    pub status: Option<FinanceStatus>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateFinanceStatusRequest {
    pub status: FinanceStatus,
}

#[derive(Debug, Deserialize)]
pub struct CreateRecordRequest {
    pub patient_id: Uuid,
    pub diagnosis: String,
    pub treatment: String,
    pub date: Option<DateTime<Utc>>,
    pub doctor: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRecordRequest {
    pub diagnosis: String,
    pub treatment: String,
    pub date: Option<DateTime<Utc>>,
    pub doctor: Option<String>,
    pub notes: Option<String>,
}

/* -------------------------
   Helpers
--------------------------*/

/// Trim and drop blank optional text so the store never holds `Some("")`.
pub fn clean_opt(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Emails are compared case-insensitively by storing them lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Appointment, Finance, FinanceStatus, Patient, Populated, Record, User};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// `DATABASE_URL` value that selects the in-process store.
pub const MEMORY_URL: &str = "memory://";

/// Persistence for the five clinic collections.
///
/// Inserts take fully built entities: ids, timestamps and defaults are
/// decided by the caller. List operations return everything, unbounded.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fails with [`StoreError::Conflict`] when the email is taken.
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn insert_patient(&self, patient: &Patient) -> Result<(), StoreError>;
    /// Newest first.
    async fn list_patients(&self) -> Result<Vec<Patient>, StoreError>;
    async fn get_patient(&self, id: Uuid) -> Result<Option<Patient>, StoreError>;

    async fn insert_appointment(&self, appointment: &Appointment) -> Result<(), StoreError>;
    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>, StoreError>;
    /// Ordered by appointment date, earliest first.
    async fn list_appointments(&self) -> Result<Vec<Populated<Appointment>>, StoreError>;
    /// Flips `calendar_synced` from false to true in one step.
    /// Returns false when the appointment is missing or another caller already holds the flag.
    async fn claim_calendar_sync(&self, id: Uuid) -> Result<bool, StoreError>;
    async fn set_calendar_synced(&self, id: Uuid, synced: bool) -> Result<(), StoreError>;

    async fn insert_finance(&self, finance: &Finance) -> Result<(), StoreError>;
    /// Newest first.
    async fn list_finances(&self) -> Result<Vec<Populated<Finance>>, StoreError>;
    async fn update_finance_status(
        &self,
        id: Uuid,
        status: FinanceStatus,
    ) -> Result<Option<Finance>, StoreError>;

    async fn insert_record(&self, record: &Record) -> Result<(), StoreError>;
    async fn get_record(&self, id: Uuid) -> Result<Option<Record>, StoreError>;
    /// Most recent `date` first, optionally restricted to one patient.
    async fn list_records(
        &self,
        patient_id: Option<Uuid>,
    ) -> Result<Vec<Populated<Record>>, StoreError>;
    /// Overwrites the mutable fields of an existing record. Returns false if absent.
    async fn update_record(&self, record: &Record) -> Result<bool, StoreError>;
    async fn delete_record(&self, id: Uuid) -> Result<bool, StoreError>;
}

pub async fn connect_pg(database_url: &str) -> Result<sqlx::PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

/// Builds the store named by `DATABASE_URL`.
pub async fn open_store(database_url: &str) -> Result<Arc<dyn Store>, StoreError> {
    if database_url == MEMORY_URL {
        tracing::warn!("using in-memory store, data is lost on restart");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let pool = connect_pg(database_url).await?;
    Ok(Arc::new(PgStore::new(pool)))
}

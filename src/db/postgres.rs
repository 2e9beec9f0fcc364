// src/db/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use super::Store;
use crate::error::StoreError;
use crate::models::{
    Appointment, Finance, FinanceStatus, Patient, Populated, Record, User,
};

#[derive(Clone)]
pub struct PgStore {
    db: sqlx::PgPool,
}

impl PgStore {
    pub fn new(db: sqlx::PgPool) -> Self {
        Self { db }
    }
}

/* -------------------------
   DB Row Models
--------------------------*/

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    password_hash: String,
    role: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct PatientRow {
    id: Uuid,
    name: String,
    email: Option<String>,
    phone: Option<String>,
    birth_date: Option<NaiveDate>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

/// Patient columns from a LEFT JOIN, all nullable, prefixed with `p_`.
#[derive(Debug, sqlx::FromRow)]
struct JoinedPatient {
    p_id: Option<Uuid>,
    p_name: Option<String>,
    p_email: Option<String>,
    p_phone: Option<String>,
    p_birth_date: Option<NaiveDate>,
    p_notes: Option<String>,
    p_created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, sqlx::FromRow)]
struct AppointmentRow {
    id: Uuid,
    patient_id: Uuid,
    doctor: Option<String>,
    date: DateTime<Utc>,
    time: Option<String>,
    status: String,
    notes: Option<String>,
    calendar_synced: bool,
    created_at: DateTime<Utc>,
    #[sqlx(flatten)]
    patient: JoinedPatient,
}

#[derive(Debug, sqlx::FromRow)]
struct FinanceRow {
    id: Uuid,
    patient_id: Uuid,
    concept: String,
    amount: f64,
    date: DateTime<Utc>,
    status: String,
    created_at: DateTime<Utc>,
    #[sqlx(flatten)]
    patient: JoinedPatient,
}

#[derive(Debug, sqlx::FromRow)]
struct RecordRow {
    id: Uuid,
    patient_id: Uuid,
    diagnosis: String,
    treatment: String,
    date: DateTime<Utc>,
    doctor: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    #[sqlx(flatten)]
    patient: JoinedPatient,
}

fn parse_text<T: std::str::FromStr>(value: &str) -> Result<T, StoreError>
where
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| StoreError::InvalidData(e.to_string()))
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            role: parse_text(&row.role)?,
            created_at: row.created_at,
        })
    }
}

impl From<PatientRow> for Patient {
    fn from(row: PatientRow) -> Self {
        Patient {
            id: row.id,
            name: row.name,
            email: row.email,
            phone: row.phone,
            birth_date: row.birth_date,
            notes: row.notes,
            created_at: row.created_at,
        }
    }
}

impl JoinedPatient {
    fn into_patient(self) -> Option<Patient> {
        Some(Patient {
            id: self.p_id?,
            name: self.p_name.unwrap_or_default(),
            email: self.p_email,
            phone: self.p_phone,
            birth_date: self.p_birth_date,
            notes: self.p_notes,
            created_at: self.p_created_at.unwrap_or_default(),
        })
    }
}

impl TryFrom<AppointmentRow> for Populated<Appointment> {
    type Error = StoreError;

    fn try_from(row: AppointmentRow) -> Result<Self, Self::Error> {
        Ok(Populated {
            item: Appointment {
                id: row.id,
                patient_id: row.patient_id,
                doctor: row.doctor,
                date: row.date,
                time: row.time,
                status: parse_text(&row.status)?,
                notes: row.notes,
                calendar_synced: row.calendar_synced,
                created_at: row.created_at,
            },
            patient: row.patient.into_patient(),
        })
    }
}

impl TryFrom<FinanceRow> for Populated<Finance> {
    type Error = StoreError;

    fn try_from(row: FinanceRow) -> Result<Self, Self::Error> {
        Ok(Populated {
            item: Finance {
                id: row.id,
                patient_id: row.patient_id,
                concept: row.concept,
                amount: row.amount,
                date: row.date,
                status: parse_text(&row.status)?,
                created_at: row.created_at,
            },
            patient: row.patient.into_patient(),
        })
    }
}

impl From<RecordRow> for Populated<Record> {
    fn from(row: RecordRow) -> Self {
        Populated {
            item: Record {
                id: row.id,
                patient_id: row.patient_id,
                diagnosis: row.diagnosis,
                treatment: row.treatment,
                date: row.date,
                doctor: row.doctor,
                notes: row.notes,
                created_at: row.created_at,
            },
            patient: row.patient.into_patient(),
        }
    }
}

const JOINED_PATIENT_COLUMNS: &str = r#"
    p.id AS p_id, p.name AS p_name, p.email AS p_email, p.phone AS p_phone,
    p.birth_date AS p_birth_date, p.notes AS p_notes, p.created_at AS p_created_at
"#;

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

#[async_trait]
impl Store for PgStore {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, password_hash, role, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.created_at)
        .execute(&self.db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!("email {} already registered", user.email))
            } else {
                StoreError::Database(e)
            }
        })?;
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, name, email, password_hash, role, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn insert_patient(&self, patient: &Patient) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO patients (id, name, email, phone, birth_date, notes, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(patient.id)
        .bind(&patient.name)
        .bind(patient.email.as_deref())
        .bind(patient.phone.as_deref())
        .bind(patient.birth_date)
        .bind(patient.notes.as_deref())
        .bind(patient.created_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn list_patients(&self) -> Result<Vec<Patient>, StoreError> {
        let rows: Vec<PatientRow> = sqlx::query_as::<_, PatientRow>(
            r#"
            SELECT id, name, email, phone, birth_date, notes, created_at
            FROM patients
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Patient::from).collect())
    }

    async fn get_patient(&self, id: Uuid) -> Result<Option<Patient>, StoreError> {
        let row: Option<PatientRow> = sqlx::query_as::<_, PatientRow>(
            r#"
            SELECT id, name, email, phone, birth_date, notes, created_at
            FROM patients
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(Patient::from))
    }

    async fn insert_appointment(&self, a: &Appointment) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO appointments
                (id, patient_id, doctor, date, time, status, notes, calendar_synced, created_at)
            VALUES
                ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(a.id)
        .bind(a.patient_id)
        .bind(a.doctor.as_deref())
        .bind(a.date)
        .bind(a.time.as_deref())
        .bind(a.status.as_str())
        .bind(a.notes.as_deref())
        .bind(a.calendar_synced)
        .bind(a.created_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        let sql = format!(
            r#"
            SELECT a.id, a.patient_id, a.doctor, a.date, a.time, a.status, a.notes,
                   a.calendar_synced, a.created_at, {JOINED_PATIENT_COLUMNS}
            FROM appointments a
            LEFT JOIN patients p ON p.id = a.patient_id
            WHERE a.id = $1
            "#
        );
        let row: Option<AppointmentRow> = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        row.map(|r| Populated::<Appointment>::try_from(r).map(|p| p.item))
            .transpose()
    }

    async fn list_appointments(&self) -> Result<Vec<Populated<Appointment>>, StoreError> {
        let sql = format!(
            r#"
            SELECT a.id, a.patient_id, a.doctor, a.date, a.time, a.status, a.notes,
                   a.calendar_synced, a.created_at, {JOINED_PATIENT_COLUMNS}
            FROM appointments a
            LEFT JOIN patients p ON p.id = a.patient_id
            ORDER BY a.date ASC, a.created_at ASC
            "#
        );
        let rows: Vec<AppointmentRow> = sqlx::query_as::<_, AppointmentRow>(&sql)
            .fetch_all(&self.db)
            .await?;

        rows.into_iter().map(Populated::try_from).collect()
    }

    async fn claim_calendar_sync(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE appointments
            SET calendar_synced = TRUE
            WHERE id = $1 AND NOT calendar_synced
            "#,
        )
        .bind(id)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_calendar_synced(&self, id: Uuid, synced: bool) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE appointments
            SET calendar_synced = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(synced)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn insert_finance(&self, f: &Finance) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO finances (id, patient_id, concept, amount, date, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(f.id)
        .bind(f.patient_id)
        .bind(&f.concept)
        .bind(f.amount)
        .bind(f.date)
        .bind(f.status.as_str())
        .bind(f.created_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn list_finances(&self) -> Result<Vec<Populated<Finance>>, StoreError> {
        let sql = format!(
            r#"
            SELECT f.id, f.patient_id, f.concept, f.amount, f.date, f.status, f.created_at,
                   {JOINED_PATIENT_COLUMNS}
            FROM finances f
            LEFT JOIN patients p ON p.id = f.patient_id
            ORDER BY f.created_at DESC
            "#
        );
        let rows: Vec<FinanceRow> = sqlx::query_as::<_, FinanceRow>(&sql)
            .fetch_all(&self.db)
            .await?;

        rows.into_iter().map(Populated::try_from).collect()
    }

    async fn update_finance_status(
        &self,
        id: Uuid,
        status: FinanceStatus,
    ) -> Result<Option<Finance>, StoreError> {
        let sql = format!(
            r#"
            WITH f AS (
                UPDATE finances
                SET status = $2
                WHERE id = $1
                RETURNING id, patient_id, concept, amount, date, status, created_at
            )
            SELECT f.id, f.patient_id, f.concept, f.amount, f.date, f.status, f.created_at,
                   {JOINED_PATIENT_COLUMNS}
            FROM f
            LEFT JOIN patients p ON p.id = f.patient_id
            "#
        );
        let row: Option<FinanceRow> = sqlx::query_as::<_, FinanceRow>(&sql)
            .bind(id)
            .bind(status.as_str())
            .fetch_optional(&self.db)
            .await?;

        row.map(|r| Populated::<Finance>::try_from(r).map(|p| p.item))
            .transpose()
    }

    async fn insert_record(&self, r: &Record) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO records (id, patient_id, diagnosis, treatment, date, doctor, notes, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(r.id)
        .bind(r.patient_id)
        .bind(&r.diagnosis)
        .bind(&r.treatment)
        .bind(r.date)
        .bind(r.doctor.as_deref())
        .bind(r.notes.as_deref())
        .bind(r.created_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn get_record(&self, id: Uuid) -> Result<Option<Record>, StoreError> {
        let sql = format!(
            r#"
            SELECT r.id, r.patient_id, r.diagnosis, r.treatment, r.date, r.doctor, r.notes,
                   r.created_at, {JOINED_PATIENT_COLUMNS}
            FROM records r
            LEFT JOIN patients p ON p.id = r.patient_id
            WHERE r.id = $1
            "#
        );
        let row: Option<RecordRow> = sqlx::query_as::<_, RecordRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        Ok(row.map(|r| Populated::<Record>::from(r).item))
    }

    async fn list_records(
        &self,
        patient_id: Option<Uuid>,
    ) -> Result<Vec<Populated<Record>>, StoreError> {
        // $1 IS NULL disables the filter
        let sql = format!(
            r#"
            SELECT r.id, r.patient_id, r.diagnosis, r.treatment, r.date, r.doctor, r.notes,
                   r.created_at, {JOINED_PATIENT_COLUMNS}
            FROM records r
            LEFT JOIN patients p ON p.id = r.patient_id
            WHERE ($1::uuid IS NULL OR r.patient_id = $1)
            ORDER BY r.date DESC, r.created_at DESC
            "#
        );
        let rows: Vec<RecordRow> = sqlx::query_as::<_, RecordRow>(&sql)
            .bind(patient_id)
            .fetch_all(&self.db)
            .await?;

        Ok(rows.into_iter().map(Populated::from).collect())
    }

    async fn update_record(&self, r: &Record) -> Result<bool, StoreError> {
        let res = sqlx::query(
            r#"
            UPDATE records
            SET diagnosis = $2, treatment = $3, date = $4, doctor = $5, notes = $6
            WHERE id = $1
            "#,
        )
        .bind(r.id)
        .bind(&r.diagnosis)
        .bind(&r.treatment)
        .bind(r.date)
        .bind(r.doctor.as_deref())
        .bind(r.notes.as_deref())
        .execute(&self.db)
        .await?;

        Ok(res.rows_affected() > 0)
    }

    async fn delete_record(&self, id: Uuid) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM records WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;

        Ok(res.rows_affected() > 0)
    }
}

// src/db/memory.rs

use std::cmp::Reverse;
#[cfg(test)]
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::Store;
use crate::error::StoreError;
use crate::models::{
    Appointment, Finance, FinanceStatus, Patient, Populated, Record, User,
};

#[derive(Default)]
struct Collections {
    users: Vec<User>,
    patients: Vec<Patient>,
    appointments: Vec<Appointment>,
    finances: Vec<Finance>,
    records: Vec<Record>,
}

impl Collections {
    fn patient(&self, id: Uuid) -> Option<Patient> {
        self.patients.iter().find(|p| p.id == id).cloned()
    }

    fn populate<T: Clone>(&self, item: &T, patient_id: Uuid) -> Populated<T> {
        Populated {
            item: item.clone(),
            patient: self.patient(patient_id),
        }
    }
}

/// Process-local store. Backs `DATABASE_URL=memory://` and the HTTP tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
    #[cfg(test)]
    sync_flag_down: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every `calendar_synced` write fail with a database error.
    #[cfg(test)]
    pub fn fail_sync_flag_writes(&self, fail: bool) {
        self.sync_flag_down.store(fail, Ordering::SeqCst);
    }

    #[cfg(test)]
    fn check_sync_flag_writes(&self) -> Result<(), StoreError> {
        if self.sync_flag_down.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    #[cfg(not(test))]
    fn check_sync_flag_writes(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut c = self.inner.write().await;
        if c.users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict(format!(
                "email {} already registered",
                user.email
            )));
        }
        c.users.push(user.clone());
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let c = self.inner.read().await;
        Ok(c.users.iter().find(|u| u.email == email).cloned())
    }

    async fn insert_patient(&self, patient: &Patient) -> Result<(), StoreError> {
        self.inner.write().await.patients.push(patient.clone());
        Ok(())
    }

    async fn list_patients(&self) -> Result<Vec<Patient>, StoreError> {
        let c = self.inner.read().await;
        let mut out = c.patients.clone();
        // stable sort keeps insertion order for equal timestamps, so reverse first
        out.reverse();
        out.sort_by_key(|p| Reverse(p.created_at));
        Ok(out)
    }

    async fn get_patient(&self, id: Uuid) -> Result<Option<Patient>, StoreError> {
        Ok(self.inner.read().await.patient(id))
    }

    async fn insert_appointment(&self, appointment: &Appointment) -> Result<(), StoreError> {
        self.inner.write().await.appointments.push(appointment.clone());
        Ok(())
    }

    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        let c = self.inner.read().await;
        Ok(c.appointments.iter().find(|a| a.id == id).cloned())
    }

    async fn list_appointments(&self) -> Result<Vec<Populated<Appointment>>, StoreError> {
        let c = self.inner.read().await;
        let mut out: Vec<_> = c
            .appointments
            .iter()
            .map(|a| c.populate(a, a.patient_id))
            .collect();
        out.sort_by_key(|p| (p.item.date, p.item.created_at));
        Ok(out)
    }

    async fn claim_calendar_sync(&self, id: Uuid) -> Result<bool, StoreError> {
        self.check_sync_flag_writes()?;
        let mut c = self.inner.write().await;
        match c.appointments.iter_mut().find(|a| a.id == id) {
            Some(a) if !a.calendar_synced => {
                a.calendar_synced = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_calendar_synced(&self, id: Uuid, synced: bool) -> Result<(), StoreError> {
        self.check_sync_flag_writes()?;
        let mut c = self.inner.write().await;
        if let Some(a) = c.appointments.iter_mut().find(|a| a.id == id) {
            a.calendar_synced = synced;
        }
        Ok(())
    }

    async fn insert_finance(&self, finance: &Finance) -> Result<(), StoreError> {
        self.inner.write().await.finances.push(finance.clone());
        Ok(())
    }

    async fn list_finances(&self) -> Result<Vec<Populated<Finance>>, StoreError> {
        let c = self.inner.read().await;
        let mut out: Vec<_> = c
            .finances
            .iter()
            .rev()
            .map(|f| c.populate(f, f.patient_id))
            .collect();
        out.sort_by_key(|p| Reverse(p.item.created_at));
        Ok(out)
    }

    async fn update_finance_status(
        &self,
        id: Uuid,
        status: FinanceStatus,
    ) -> Result<Option<Finance>, StoreError> {
        let mut c = self.inner.write().await;
        Ok(c.finances.iter_mut().find(|f| f.id == id).map(|f| {
            f.status = status;
            f.clone()
        }))
    }

    async fn insert_record(&self, record: &Record) -> Result<(), StoreError> {
        self.inner.write().await.records.push(record.clone());
        Ok(())
    }

    async fn get_record(&self, id: Uuid) -> Result<Option<Record>, StoreError> {
        let c = self.inner.read().await;
        Ok(c.records.iter().find(|r| r.id == id).cloned())
    }

    async fn list_records(
        &self,
        patient_id: Option<Uuid>,
    ) -> Result<Vec<Populated<Record>>, StoreError> {
        let c = self.inner.read().await;
        let mut out: Vec<_> = c
            .records
            .iter()
            .rev()
            .filter(|r| patient_id.is_none_or(|id| r.patient_id == id))
            .map(|r| c.populate(r, r.patient_id))
            .collect();
        out.sort_by_key(|p| Reverse((p.item.date, p.item.created_at)));
        Ok(out)
    }

    async fn update_record(&self, record: &Record) -> Result<bool, StoreError> {
        let mut c = self.inner.write().await;
        let Some(existing) = c.records.iter_mut().find(|r| r.id == record.id) else {
            return Ok(false);
        };
        existing.diagnosis = record.diagnosis.clone();
        existing.treatment = record.treatment.clone();
        existing.date = record.date;
        existing.doctor = record.doctor.clone();
        existing.notes = record.notes.clone();
        Ok(true)
    }

    async fn delete_record(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut c = self.inner.write().await;
        let before = c.records.len();
        c.records.retain(|r| r.id != id);
        Ok(c.records.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::models::Role;

    fn patient(name: &str) -> Patient {
        Patient {
            id: Uuid::new_v4(),
            name: name.into(),
            email: None,
            phone: None,
            birth_date: None,
            notes: None,
            created_at: Utc::now(),
        }
    }

    fn user(email: &str) -> User {
        User {
            id: Uuid::new_v4(),
            name: "Staff".into(),
            email: email.into(),
            password_hash: "hash".into(),
            role: Role::Clinician,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let store = MemoryStore::new();
        store.insert_user(&user("a@clinic.test")).await.unwrap();

        let err = store.insert_user(&user("a@clinic.test")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn empty_collections_list_empty() {
        let store = MemoryStore::new();
        assert!(store.list_patients().await.unwrap().is_empty());
        assert!(store.list_appointments().await.unwrap().is_empty());
        assert!(store.list_finances().await.unwrap().is_empty());
        assert!(store.list_records(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn records_filter_by_patient_and_resolve_missing_to_none() {
        let store = MemoryStore::new();
        let ana = patient("Ana");
        store.insert_patient(&ana).await.unwrap();

        let now = Utc::now();
        let mk = |patient_id, days_ago| Record {
            id: Uuid::new_v4(),
            patient_id,
            diagnosis: "caries".into(),
            treatment: "filling".into(),
            date: now - Duration::days(days_ago),
            doctor: None,
            notes: None,
            created_at: now,
        };
        let older = mk(ana.id, 3);
        let newer = mk(ana.id, 1);
        let orphan = mk(Uuid::new_v4(), 0);
        for r in [&older, &newer, &orphan] {
            store.insert_record(r).await.unwrap();
        }

        let for_ana = store.list_records(Some(ana.id)).await.unwrap();
        let ids: Vec<Uuid> = for_ana.iter().map(|p| p.item.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
        assert_eq!(for_ana[0].patient.as_ref().map(|p| p.name.as_str()), Some("Ana"));

        let all = store.list_records(None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all[0].patient.is_none());
    }

    #[tokio::test]
    async fn update_and_delete_report_missing_rows() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let record = Record {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            diagnosis: "d".into(),
            treatment: "t".into(),
            date: now,
            doctor: None,
            notes: None,
            created_at: now,
        };
        assert!(!store.update_record(&record).await.unwrap());
        assert!(!store.delete_record(record.id).await.unwrap());

        store.insert_record(&record).await.unwrap();
        assert!(store.delete_record(record.id).await.unwrap());
        assert!(store.get_record(record.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn calendar_sync_is_claimed_once() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            doctor: None,
            date: now,
            time: None,
            status: Default::default(),
            notes: None,
            calendar_synced: false,
            created_at: now,
        };
        store.insert_appointment(&appointment).await.unwrap();

        assert!(store.claim_calendar_sync(appointment.id).await.unwrap());
        assert!(!store.claim_calendar_sync(appointment.id).await.unwrap());

        store.set_calendar_synced(appointment.id, false).await.unwrap();
        assert!(store.claim_calendar_sync(appointment.id).await.unwrap());

        assert!(!store.claim_calendar_sync(Uuid::new_v4()).await.unwrap());
    }
}

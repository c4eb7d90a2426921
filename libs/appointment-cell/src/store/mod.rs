//! Persistence seam for the scheduling core.
//!
//! Every adapter must give the same guarantees:
//! - `record_appointment_ledger` inserts income and expenses in one
//!   transaction and is a no-op when the appointment already has income;
//! - `delete_appointment_cascade` removes the ledger rows and the
//!   appointment together or not at all.

pub mod sqlite;
pub mod supabase;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use uuid::Uuid;

use shared_database::DatabaseError;

use crate::models::{Appointment, FinancialEvent, LedgerWrite, NewAppointment, NewFinancialEvent};

pub use sqlite::SqliteAppointmentStore;
pub use supabase::SupabaseAppointmentStore;

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Insert and return the row with its generated id.
    async fn insert_appointment(&self, appointment: &NewAppointment) -> Result<Appointment, DatabaseError>;

    /// Overwrite the mutable columns of an existing row.
    async fn update_appointment(&self, appointment: &Appointment) -> Result<Appointment, DatabaseError>;

    async fn find_appointment(&self, id: Uuid) -> Result<Option<Appointment>, DatabaseError>;

    /// Non-cancelled appointments of `clinician_id` intersecting `[start, end)`.
    async fn find_clinician_appointments_between(
        &self,
        clinician_id: Uuid,
        start: NaiveDateTime,
        end: NaiveDateTime,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>, DatabaseError>;

    /// Most recent PAID appointment of the patient by start time.
    async fn latest_paid_appointment(
        &self,
        patient_id: Uuid,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<Option<Appointment>, DatabaseError>;

    async fn count_paid_appointments(
        &self,
        patient_id: Uuid,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<u32, DatabaseError>;

    async fn record_appointment_ledger(
        &self,
        appointment_id: Uuid,
        income: &NewFinancialEvent,
        expenses: &[NewFinancialEvent],
    ) -> Result<LedgerWrite, DatabaseError>;

    async fn appointment_ledger(&self, appointment_id: Uuid) -> Result<Vec<FinancialEvent>, DatabaseError>;

    /// Returns the number of ledger rows removed, or `None` if the
    /// appointment does not exist.
    async fn delete_appointment_cascade(&self, appointment_id: Uuid) -> Result<Option<u64>, DatabaseError>;
}

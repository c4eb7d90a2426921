//! Fixtures shared by the unit tests of this crate.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use uuid::Uuid;

use crate::models::{
    Appointment, AppointmentStatus, NewAppointment, PaymentStatus, SessionType,
};
use crate::store::{AppointmentStore, SqliteAppointmentStore};

pub fn memory_store() -> Arc<dyn AppointmentStore> {
    Arc::new(SqliteAppointmentStore::in_memory().expect("in-memory store"))
}

/// October 2026: the 12th is a Monday, the 16th a Friday.
pub fn oct(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 10, day)
        .and_then(|d| d.and_hms_opt(hour, minute, 0))
        .expect("valid fixture time")
}

pub fn booking(patient_id: Uuid, clinician_id: Uuid, start: NaiveDateTime, minutes: i64) -> NewAppointment {
    NewAppointment {
        patient_id,
        clinician_id,
        start_time: start,
        end_time: start + chrono::Duration::minutes(minutes),
        status: AppointmentStatus::Scheduled,
        session_type: SessionType::InClinic,
        payment_status: PaymentStatus::Unpaid,
        free_return_reason: None,
        doctor_cut_percent: None,
        doctor_involved: true,
        notes: None,
        created_at: Utc::now(),
    }
}

pub async fn insert_paid(store: &Arc<dyn AppointmentStore>, patient_id: Uuid, start: NaiveDateTime) -> Appointment {
    let mut new = booking(patient_id, Uuid::new_v4(), start, 45);
    new.payment_status = PaymentStatus::Paid;
    store.insert_appointment(&new).await.expect("insert paid appointment")
}

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{SupabaseClient, RETURN_REPRESENTATION};
use shared_database::DatabaseError;

use crate::models::{Appointment, FinancialEvent, LedgerWrite, NewAppointment, NewFinancialEvent};
use crate::store::AppointmentStore;

/// PostgREST-backed store. Multi-row writes go through Postgres functions
/// (see `migrations/postgres`), each of which runs as one transaction.
pub struct SupabaseAppointmentStore {
    supabase: Arc<SupabaseClient>,
    service_role_key: String,
}

impl SupabaseAppointmentStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            service_role_key: config.supabase_service_role_key.clone(),
        }
    }

    fn token(&self) -> Option<&str> {
        if self.service_role_key.is_empty() {
            None
        } else {
            Some(&self.service_role_key)
        }
    }

    async fn select_appointments(&self, query: &str) -> Result<Vec<Appointment>, DatabaseError> {
        let path = format!("/rest/v1/appointments?{}", query);
        self.supabase
            .request(Method::GET, &path, self.token(), None)
            .await
            .map_err(|e| DatabaseError::Remote(e.to_string()))
    }
}

fn timestamp_param(ts: NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

fn exclusion_filter(exclude_appointment_id: Option<Uuid>) -> String {
    exclude_appointment_id
        .map(|id| format!("&id=neq.{}", id))
        .unwrap_or_default()
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn insert_appointment(&self, appointment: &NewAppointment) -> Result<Appointment, DatabaseError> {
        let body = json!({
            "patient_id": appointment.patient_id,
            "clinician_id": appointment.clinician_id,
            "start_time": appointment.start_time,
            "end_time": appointment.end_time,
            "status": appointment.status,
            "session_type": appointment.session_type,
            "payment_status": appointment.payment_status,
            "free_return_reason": appointment.free_return_reason,
            "doctor_cut_percent": appointment.doctor_cut_percent,
            "doctor_involved": appointment.doctor_involved,
            "notes": appointment.notes,
            "created_at": appointment.created_at,
            "updated_at": appointment.created_at,
        });

        let rows: Vec<Appointment> = self.supabase
            .request_with_prefer(
                Method::POST,
                "/rest/v1/appointments",
                self.token(),
                Some(body),
                Some(RETURN_REPRESENTATION),
            )
            .await
            .map_err(|e| DatabaseError::Remote(e.to_string()))?;

        rows.into_iter()
            .next()
            .ok_or_else(|| DatabaseError::Remote("insert returned no appointment row".into()))
    }

    async fn update_appointment(&self, appointment: &Appointment) -> Result<Appointment, DatabaseError> {
        let body = json!({
            "clinician_id": appointment.clinician_id,
            "start_time": appointment.start_time,
            "end_time": appointment.end_time,
            "status": appointment.status,
            "session_type": appointment.session_type,
            "payment_status": appointment.payment_status,
            "free_return_reason": appointment.free_return_reason,
            "doctor_cut_percent": appointment.doctor_cut_percent,
            "doctor_involved": appointment.doctor_involved,
            "notes": appointment.notes,
            "updated_at": appointment.updated_at,
        });

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment.id);
        let rows: Vec<Appointment> = self.supabase
            .request_with_prefer(Method::PATCH, &path, self.token(), Some(body), Some(RETURN_REPRESENTATION))
            .await
            .map_err(|e| DatabaseError::Remote(e.to_string()))?;

        rows.into_iter().next().ok_or_else(|| DatabaseError::NotFound {
            entity: "Appointment".into(),
            id: appointment.id.to_string(),
        })
    }

    async fn find_appointment(&self, id: Uuid) -> Result<Option<Appointment>, DatabaseError> {
        let rows = self.select_appointments(&format!("id=eq.{}&limit=1", id)).await?;
        Ok(rows.into_iter().next())
    }

    async fn find_clinician_appointments_between(
        &self,
        clinician_id: Uuid,
        start: NaiveDateTime,
        end: NaiveDateTime,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>, DatabaseError> {
        debug!("Querying appointments of clinician {} between {} and {}", clinician_id, start, end);

        let query = format!(
            "clinician_id=eq.{}&status=neq.cancelled&start_time=lt.{}&end_time=gt.{}{}&order=start_time.asc",
            clinician_id,
            timestamp_param(end),
            timestamp_param(start),
            exclusion_filter(exclude_appointment_id),
        );
        self.select_appointments(&query).await
    }

    async fn latest_paid_appointment(
        &self,
        patient_id: Uuid,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<Option<Appointment>, DatabaseError> {
        let query = format!(
            "patient_id=eq.{}&payment_status=eq.PAID{}&order=start_time.desc&limit=1",
            patient_id,
            exclusion_filter(exclude_appointment_id),
        );
        let rows = self.select_appointments(&query).await?;
        Ok(rows.into_iter().next())
    }

    async fn count_paid_appointments(
        &self,
        patient_id: Uuid,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<u32, DatabaseError> {
        let path = format!(
            "/rest/v1/appointments?select=id&patient_id=eq.{}&payment_status=eq.PAID{}",
            patient_id,
            exclusion_filter(exclude_appointment_id),
        );
        let rows: Vec<Value> = self.supabase
            .request(Method::GET, &path, self.token(), None)
            .await
            .map_err(|e| DatabaseError::Remote(e.to_string()))?;

        u32::try_from(rows.len()).map_err(|_| DatabaseError::InvalidValue {
            field: "paid appointment count".into(),
            value: rows.len().to_string(),
        })
    }

    async fn record_appointment_ledger(
        &self,
        appointment_id: Uuid,
        income: &NewFinancialEvent,
        expenses: &[NewFinancialEvent],
    ) -> Result<LedgerWrite, DatabaseError> {
        let args = json!({
            "p_appointment_id": appointment_id,
            "p_income": income,
            "p_expenses": expenses,
        });

        let events: Vec<FinancialEvent> = self.supabase
            .rpc("record_appointment_ledger", self.token(), args)
            .await
            .map_err(|e| DatabaseError::Remote(e.to_string()))?;

        if events.is_empty() {
            Ok(LedgerWrite::AlreadyExists)
        } else {
            Ok(LedgerWrite::Recorded(events))
        }
    }

    async fn appointment_ledger(&self, appointment_id: Uuid) -> Result<Vec<FinancialEvent>, DatabaseError> {
        let path = format!(
            "/rest/v1/financial_events?reference_type=eq.APPOINTMENT&reference_id=eq.{}&order=id.asc",
            appointment_id
        );
        self.supabase
            .request(Method::GET, &path, self.token(), None)
            .await
            .map_err(|e| DatabaseError::Remote(e.to_string()))
    }

    async fn delete_appointment_cascade(&self, appointment_id: Uuid) -> Result<Option<u64>, DatabaseError> {
        let deleted: Option<i64> = self.supabase
            .rpc(
                "delete_appointment_cascade",
                self.token(),
                json!({ "p_appointment_id": appointment_id }),
            )
            .await
            .map_err(|e| DatabaseError::Remote(e.to_string()))?;

        deleted
            .map(|count| {
                u64::try_from(count).map_err(|_| DatabaseError::InvalidValue {
                    field: "deleted event count".into(),
                    value: count.to_string(),
                })
            })
            .transpose()
    }
}

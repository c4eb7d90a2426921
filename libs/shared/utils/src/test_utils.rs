use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::{AppConfig, ClinicPolicyConfig, StorageBackend};

pub struct TestConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
    pub in_clinic_rate: i64,
    pub online_rate: i64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            supabase_service_role_key: "test-service-role-key".to_string(),
            in_clinic_rate: 500,
            online_rate: 300,
        }
    }
}

impl TestConfig {
    pub fn with_supabase_url(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            storage_backend: StorageBackend::Sqlite,
            sqlite_path: ":memory:".to_string(),
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_service_role_key: self.supabase_service_role_key.clone(),
            server_port: 0,
            clinic: ClinicPolicyConfig {
                in_clinic_rate: self.in_clinic_rate,
                online_rate: self.online_rate,
                ..ClinicPolicyConfig::default()
            },
        }
    }
}

/// Local wall-clock timestamp helper for fixtures.
pub fn local_time(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, 0))
        .unwrap_or_else(|| panic!("invalid fixture time {}-{}-{} {}:{}", year, month, day, hour, minute))
}

pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn appointment_response(
        id: Uuid,
        patient_id: Uuid,
        clinician_id: Uuid,
        start_time: &str,
        end_time: &str,
        session_type: &str,
        payment_status: &str,
    ) -> Value {
        json!({
            "id": id,
            "patient_id": patient_id,
            "clinician_id": clinician_id,
            "start_time": start_time,
            "end_time": end_time,
            "status": "scheduled",
            "session_type": session_type,
            "payment_status": payment_status,
            "free_return_reason": null,
            "doctor_cut_percent": null,
            "doctor_involved": true,
            "notes": null,
            "created_at": "2026-10-01T08:00:00Z",
            "updated_at": "2026-10-01T08:00:00Z"
        })
    }

    pub fn financial_event_response(
        id: i64,
        event_type: &str,
        category: &str,
        amount: i64,
        appointment_id: Uuid,
    ) -> Value {
        json!({
            "id": id,
            "event_date": "2026-10-12",
            "event_type": event_type,
            "category": category,
            "amount": amount,
            "description": format!("{} for appointment {}", category, appointment_id),
            "reference_type": "APPOINTMENT",
            "reference_id": appointment_id.to_string(),
            "created_at": "2026-10-12T09:00:00Z"
        })
    }

    pub fn error_response(message: &str, code: &str) -> Value {
        json!({
            "message": message,
            "code": code
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = TestConfig::default();
        let app_config = config.to_app_config();

        assert_eq!(app_config.supabase_url, "http://localhost:54321");
        assert_eq!(app_config.clinic.in_clinic_rate, 500);
        assert!(app_config.is_supabase_configured());
    }

    #[test]
    fn appointment_fixture_shape() {
        let id = Uuid::new_v4();
        let value = MockSupabaseResponses::appointment_response(
            id,
            Uuid::new_v4(),
            Uuid::new_v4(),
            "2026-10-12T09:00:00",
            "2026-10-12T09:45:00",
            "IN_CLINIC",
            "UNPAID",
        );

        assert_eq!(value["id"], json!(id));
        assert_eq!(value["status"], "scheduled");
    }
}

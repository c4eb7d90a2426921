#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDateTime;
use uuid::Uuid;

use appointment_cell::models::{
    AppointmentStatus, CreateAppointmentRequest, DoctorCut, PaymentStatus, SessionType,
    UpdatePaymentRequest,
};
use appointment_cell::services::booking::AppointmentBookingService;
use appointment_cell::store::{AppointmentStore, SqliteAppointmentStore};
use appointment_cell::AppointmentCellState;
use shared_config::AppConfig;
use shared_utils::clock::FixedClock;
use shared_utils::test_utils::{local_time, TestConfig};

/// October 2026: Mon 12 .. Thu 15 are open days, Fri 16 is closed.
pub fn oct(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    local_time(2026, 10, day, hour, minute)
}

pub struct TestHarness {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn AppointmentStore>,
    pub state: AppointmentCellState,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_store(Arc::new(SqliteAppointmentStore::in_memory().expect("in-memory store")))
    }

    pub fn with_store(store: Arc<dyn AppointmentStore>) -> Self {
        let config = Arc::new(TestConfig::default().to_app_config());
        let clock = Arc::new(FixedClock::at(oct(15, 8, 0)));
        let state = AppointmentCellState::new(Arc::clone(&config), Arc::clone(&store), clock);
        Self { config, store, state }
    }

    pub fn service(&self) -> AppointmentBookingService {
        self.state.booking_service()
    }
}

pub fn create_request(
    patient_id: Uuid,
    clinician_id: Uuid,
    start: NaiveDateTime,
    session_type: SessionType,
    payment_status: PaymentStatus,
) -> CreateAppointmentRequest {
    CreateAppointmentRequest {
        patient_id,
        clinician_id,
        start_time: start,
        end_time: start + chrono::Duration::minutes(45),
        session_type,
        status: AppointmentStatus::Scheduled,
        payment_status,
        free_return_reason: None,
        doctor_cut: DoctorCut::Auto,
        doctor_involved: true,
        notes: None,
    }
}

pub fn mark_paid() -> UpdatePaymentRequest {
    UpdatePaymentRequest {
        payment_status: PaymentStatus::Paid,
        free_return_reason: None,
        doctor_cut: DoctorCut::Auto,
        doctor_involved: None,
    }
}

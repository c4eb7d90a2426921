// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use shared_config::ClinicPolicyConfig;
use shared_models::CalendarDate;
use shared_utils::clock::Clock;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, BookingOutcome, ConflictCheckRequest,
    ConflictCheckResponse, CreateAppointmentRequest, DeletionReport, DoctorCut, EventType, FinancialEvent,
    FreeReturnEligibility, LedgerOutcome, LedgerWrite, NewAppointment, PaymentStatus,
    PaymentUpdateOutcome, UpdateAppointmentRequest, UpdatePaymentRequest,
};
use crate::services::conflict::ConflictDetectionService;
use crate::services::deletion::DeletionCoordinator;
use crate::services::eligibility::EligibilityService;
use crate::services::ledger::LedgerWriter;
use crate::services::lifecycle::{AppointmentLifecycleService, PaymentTransition};
use crate::services::revenue::{validate_override, RateCard, RevenueEngine};
use crate::services::schedule::SchedulePolicy;
use crate::store::AppointmentStore;

/// Entry point for every appointment mutation. All checks run before the
/// first write; a paid appointment then flows through revenue and ledger.
pub struct AppointmentBookingService {
    store: Arc<dyn AppointmentStore>,
    clock: Arc<dyn Clock>,
    conflict_service: ConflictDetectionService,
    schedule_policy: SchedulePolicy,
    eligibility_service: EligibilityService,
    revenue_engine: RevenueEngine,
    ledger_writer: LedgerWriter,
    deletion_coordinator: DeletionCoordinator,
    lifecycle_service: AppointmentLifecycleService,
}

impl AppointmentBookingService {
    pub fn new(store: Arc<dyn AppointmentStore>, clock: Arc<dyn Clock>, policy: &ClinicPolicyConfig) -> Self {
        Self {
            conflict_service: ConflictDetectionService::new(Arc::clone(&store)),
            schedule_policy: SchedulePolicy::from_config(policy),
            eligibility_service: EligibilityService::new(Arc::clone(&store)),
            revenue_engine: RevenueEngine::new(Arc::clone(&store), RateCard::from_config(policy)),
            ledger_writer: LedgerWriter::new(Arc::clone(&store)),
            deletion_coordinator: DeletionCoordinator::new(Arc::clone(&store)),
            lifecycle_service: AppointmentLifecycleService::new(),
            store,
            clock,
        }
    }

    pub async fn create_appointment(&self, request: CreateAppointmentRequest) -> Result<BookingOutcome, AppointmentError> {
        info!("Creating {} appointment for patient {} with clinician {} at {}",
              request.session_type, request.patient_id, request.clinician_id, request.start_time);

        validate_time_range(request.start_time, request.end_time)?;

        if request.status != AppointmentStatus::Cancelled {
            self.conflict_service
                .ensure_slot_free(request.clinician_id, request.start_time, request.end_time, None)
                .await?;
        }

        let session_date = CalendarDate::from(request.start_time);
        self.schedule_policy.ensure_permitted(request.session_type, session_date)?;

        if request.payment_status == PaymentStatus::FreeReturn {
            self.eligibility_service
                .ensure_eligible(request.patient_id, session_date, None)
                .await?;
        }

        let doctor_cut_percent = match request.payment_status {
            PaymentStatus::Paid => Some(
                self.revenue_engine
                    .resolve_doctor_cut(request.patient_id, None, request.doctor_cut)
                    .await?,
            ),
            _ => stored_override(request.doctor_cut, None)?,
        };

        let new_appointment = NewAppointment {
            patient_id: request.patient_id,
            clinician_id: request.clinician_id,
            start_time: request.start_time,
            end_time: request.end_time,
            status: request.status,
            session_type: request.session_type,
            payment_status: request.payment_status,
            free_return_reason: free_return_reason(request.payment_status, request.free_return_reason, None),
            doctor_cut_percent,
            doctor_involved: request.doctor_involved,
            notes: request.notes,
            created_at: self.clock.now(),
        };

        let appointment = self.store.insert_appointment(&new_appointment).await?;
        info!("Appointment {} created", appointment.id);

        let ledger = if appointment.payment_status == PaymentStatus::Paid {
            self.generate_ledger(&appointment).await
        } else {
            LedgerOutcome::NotApplicable
        };

        Ok(BookingOutcome { appointment, ledger })
    }

    pub async fn update_payment(
        &self,
        appointment_id: Uuid,
        request: UpdatePaymentRequest,
    ) -> Result<PaymentUpdateOutcome, AppointmentError> {
        info!("Updating payment of appointment {} to {}", appointment_id, request.payment_status);

        let existing = self.get_appointment(appointment_id).await?;

        if request.payment_status == PaymentStatus::FreeReturn {
            self.eligibility_service
                .ensure_eligible(existing.patient_id, existing.session_date(), Some(existing.id))
                .await?;
        }

        let transition = self.lifecycle_service
            .classify_payment_transition(existing.payment_status, request.payment_status);

        let doctor_cut_percent = if request.payment_status == PaymentStatus::Paid {
            Some(
                self.revenue_engine
                    .resolve_doctor_cut(existing.patient_id, Some(&existing), request.doctor_cut)
                    .await?,
            )
        } else {
            stored_override(request.doctor_cut, existing.doctor_cut_percent)?
        };

        let doctor_involved = request.doctor_involved.unwrap_or(existing.doctor_involved);

        if transition == PaymentTransition::RemainsPaid
            && (doctor_cut_percent != existing.doctor_cut_percent || doctor_involved != existing.doctor_involved)
            && self.income_recorded(existing.id).await?
        {
            warn!("Rejected split change on appointment {} after its income was recorded", existing.id);
            return Err(AppointmentError::ValidationError(format!(
                "doctor cut of appointment {} is fixed once its income is recorded",
                existing.id
            )));
        }

        let mut updated = existing.clone();
        updated.payment_status = request.payment_status;
        updated.free_return_reason = free_return_reason(
            request.payment_status,
            request.free_return_reason,
            existing.free_return_reason.clone(),
        );
        updated.doctor_cut_percent = doctor_cut_percent;
        updated.doctor_involved = doctor_involved;
        updated.updated_at = self.clock.now();

        let appointment = self.store.update_appointment(&updated).await?;

        let ledger = match transition {
            PaymentTransition::BecomesPaid | PaymentTransition::RemainsPaid => {
                self.generate_ledger(&appointment).await
            }
            PaymentTransition::LeavesPaid | PaymentTransition::Untouched => LedgerOutcome::NotApplicable,
        };

        Ok(PaymentUpdateOutcome {
            appointment,
            generated_events: ledger.generated_events().to_vec(),
            ledger,
        })
    }

    pub async fn update_appointment(
        &self,
        appointment_id: Uuid,
        request: UpdateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Updating appointment {}", appointment_id);

        let existing = self.get_appointment(appointment_id).await?;

        if let Some(new_status) = request.status {
            self.lifecycle_service.validate_status_transition(existing.status, new_status)?;
        }

        let mut updated = existing.clone();
        if let Some(clinician_id) = request.clinician_id {
            updated.clinician_id = clinician_id;
        }
        if let Some(start_time) = request.start_time {
            updated.start_time = start_time;
        }
        if let Some(end_time) = request.end_time {
            updated.end_time = end_time;
        }
        if let Some(status) = request.status {
            updated.status = status;
        }
        if let Some(session_type) = request.session_type {
            updated.session_type = session_type;
        }
        if request.notes.is_some() {
            updated.notes = request.notes;
        }

        validate_time_range(updated.start_time, updated.end_time)?;

        let slot_changed = updated.clinician_id != existing.clinician_id
            || updated.start_time != existing.start_time
            || updated.end_time != existing.end_time
            || updated.session_type != existing.session_type;
        let reopened = !existing.is_active() && updated.is_active();

        if updated.is_active() && (slot_changed || reopened) {
            self.conflict_service
                .ensure_slot_free(updated.clinician_id, updated.start_time, updated.end_time, Some(updated.id))
                .await?;
            self.schedule_policy.ensure_permitted(updated.session_type, updated.session_date())?;
        }

        if updated.payment_status == PaymentStatus::FreeReturn && updated.session_date() != existing.session_date() {
            self.eligibility_service
                .ensure_eligible(updated.patient_id, updated.session_date(), Some(updated.id))
                .await?;
        }

        if updated.payment_status == PaymentStatus::Paid && updated.session_type != existing.session_type {
            warn!("Session type of paid appointment {} changed to {}; recorded ledger events are kept",
                  updated.id, updated.session_type);
        }

        updated.updated_at = self.clock.now();
        let appointment = self.store.update_appointment(&updated).await?;

        info!("Appointment {} updated", appointment.id);
        Ok(appointment)
    }

    pub async fn delete_appointment(&self, appointment_id: Uuid) -> Result<DeletionReport, AppointmentError> {
        self.deletion_coordinator.delete_appointment(appointment_id).await
    }

    pub async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.store
            .find_appointment(appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound)
    }

    pub async fn appointment_ledger(&self, appointment_id: Uuid) -> Result<Vec<FinancialEvent>, AppointmentError> {
        self.get_appointment(appointment_id).await?;
        self.ledger_writer.events_for(appointment_id).await
    }

    /// Free-return eligibility on `date`, or today when no date is given.
    pub async fn check_eligibility(
        &self,
        patient_id: Uuid,
        date: Option<CalendarDate>,
    ) -> Result<FreeReturnEligibility, AppointmentError> {
        let candidate_date = date.unwrap_or_else(|| self.clock.today());
        self.eligibility_service.evaluate(patient_id, candidate_date, None).await
    }

    pub async fn check_conflicts(&self, request: ConflictCheckRequest) -> Result<ConflictCheckResponse, AppointmentError> {
        validate_time_range(request.start_time, request.end_time)?;
        self.conflict_service
            .check_conflicts(
                request.clinician_id,
                request.start_time,
                request.end_time,
                request.exclude_appointment_id,
            )
            .await
    }

    async fn income_recorded(&self, appointment_id: Uuid) -> Result<bool, AppointmentError> {
        let events = self.ledger_writer.events_for(appointment_id).await?;
        Ok(events.iter().any(|e| e.event_type == EventType::Income))
    }

    /// Revenue and ledger for a paid appointment. Failures are reported in
    /// the outcome; the appointment write has already happened.
    async fn generate_ledger(&self, appointment: &Appointment) -> LedgerOutcome {
        let breakdown = match self.revenue_engine.compute(appointment) {
            Ok(breakdown) => breakdown,
            Err(e) => {
                error!("Revenue computation failed for appointment {}: {}", appointment.id, e);
                return LedgerOutcome::Failed { error: e.to_string() };
            }
        };

        match self.ledger_writer.record(&breakdown).await {
            Ok(LedgerWrite::Recorded(events)) => LedgerOutcome::Generated { events },
            Ok(LedgerWrite::AlreadyExists) => LedgerOutcome::AlreadyExists,
            Err(e) => {
                warn!("Appointment {} saved without ledger: {}", appointment.id, e);
                LedgerOutcome::Failed { error: e.to_string() }
            }
        }
    }
}

fn validate_time_range(start_time: NaiveDateTime, end_time: NaiveDateTime) -> Result<(), AppointmentError> {
    if start_time >= end_time {
        return Err(AppointmentError::ValidationError(format!(
            "start_time {} must be before end_time {}",
            start_time, end_time
        )));
    }
    Ok(())
}

/// Percent kept on a non-paid appointment: an explicit override, else
/// whatever was stored.
fn stored_override(cut: DoctorCut, stored: Option<u8>) -> Result<Option<u8>, AppointmentError> {
    match cut {
        DoctorCut::Override(percent) => validate_override(percent).map(Some),
        DoctorCut::Auto => Ok(stored),
    }
}

fn free_return_reason(status: PaymentStatus, requested: Option<String>, stored: Option<String>) -> Option<String> {
    match status {
        PaymentStatus::FreeReturn => requested.or(stored),
        _ => None,
    }
}

use std::ops::RangeInclusive;
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use shared_config::ClinicPolicyConfig;

use crate::models::{
    Appointment, AppointmentError, DoctorCut, EventType, NewFinancialEvent, PaymentStatus,
    ReferenceType, RevenueBreakdown, SessionType,
};
use crate::store::AppointmentStore;

pub const SESSION_INCOME_CATEGORY: &str = "session_income";
pub const DOCTOR_CUT_CATEGORY: &str = "doctor_cut";
pub const SECRETARY_CUT_CATEGORY: &str = "secretary_cut";

pub const DOCTOR_CUT_RANGE: RangeInclusive<u8> = 10..=20;
pub const FIRST_VISIT_DOCTOR_CUT: u8 = 20;
pub const RETURNING_DOCTOR_CUT: u8 = 10;
pub const SECRETARY_CUT_PERCENT: u8 = 10;

/// Flat session rates in whole currency units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateCard {
    pub in_clinic: i64,
    pub online: i64,
}

impl RateCard {
    pub fn from_config(config: &ClinicPolicyConfig) -> Self {
        Self {
            in_clinic: config.in_clinic_rate,
            online: config.online_rate,
        }
    }

    pub fn rate_for(&self, session_type: SessionType) -> i64 {
        match session_type {
            SessionType::InClinic => self.in_clinic,
            SessionType::Online => self.online,
        }
    }
}

impl Default for RateCard {
    fn default() -> Self {
        Self::from_config(&ClinicPolicyConfig::default())
    }
}

/// Turns a paid appointment into its income and expense ledger rows.
pub struct RevenueEngine {
    store: Arc<dyn AppointmentStore>,
    rates: RateCard,
}

impl RevenueEngine {
    pub fn new(store: Arc<dyn AppointmentStore>, rates: RateCard) -> Self {
        Self { store, rates }
    }

    /// Decide the doctor's percentage for a paid session.
    ///
    /// `current` is the stored appointment when one exists. An appointment
    /// that is already paid keeps its recorded percentage under `Auto`, so a
    /// repeated payment call cannot drift the tier.
    pub async fn resolve_doctor_cut(
        &self,
        patient_id: Uuid,
        current: Option<&Appointment>,
        cut: DoctorCut,
    ) -> Result<u8, AppointmentError> {
        match cut {
            DoctorCut::Override(percent) => validate_override(percent),
            DoctorCut::Auto => {
                if let Some(stored) = current
                    .filter(|apt| apt.payment_status == PaymentStatus::Paid)
                    .and_then(|apt| apt.doctor_cut_percent)
                {
                    debug!("Keeping stored doctor cut of {}% for patient {}", stored, patient_id);
                    return Ok(stored);
                }

                let prior_paid = self.store
                    .count_paid_appointments(patient_id, current.map(|apt| apt.id))
                    .await?;

                let percent = if prior_paid == 0 { FIRST_VISIT_DOCTOR_CUT } else { RETURNING_DOCTOR_CUT };
                debug!("Patient {} has {} other paid sessions, doctor cut {}%", patient_id, prior_paid, percent);
                Ok(percent)
            }
        }
    }

    /// Build the ledger rows for a paid appointment. Reads nothing from the
    /// store; the doctor cut must already be resolved onto the appointment.
    pub fn compute(&self, appointment: &Appointment) -> Result<RevenueBreakdown, AppointmentError> {
        if appointment.payment_status != PaymentStatus::Paid {
            return Err(AppointmentError::ValidationError(format!(
                "appointment {} is {}, only PAID sessions generate revenue",
                appointment.id, appointment.payment_status
            )));
        }

        let income_amount = self.rates.rate_for(appointment.session_type);
        if income_amount <= 0 {
            return Err(AppointmentError::LedgerGenerationError(format!(
                "no positive rate configured for {} sessions",
                appointment.session_type
            )));
        }

        let income = ledger_row(
            appointment,
            EventType::Income,
            SESSION_INCOME_CATEGORY,
            income_amount,
            format!("{} session income", appointment.session_type),
        );

        let mut expenses = Vec::new();

        if let Some(percent) = appointment.doctor_cut_percent {
            if appointment.session_type == SessionType::InClinic || appointment.doctor_involved {
                let amount = round_percent(income_amount, percent);
                if amount > 0 {
                    expenses.push(ledger_row(
                        appointment,
                        EventType::Expense,
                        DOCTOR_CUT_CATEGORY,
                        amount,
                        format!("Doctor cut {}% of {} session", percent, appointment.session_type),
                    ));
                }
            }
        }

        if appointment.session_type == SessionType::Online {
            let amount = round_percent(income_amount, SECRETARY_CUT_PERCENT);
            if amount > 0 {
                expenses.push(ledger_row(
                    appointment,
                    EventType::Expense,
                    SECRETARY_CUT_CATEGORY,
                    amount,
                    format!("Secretary cut {}% of ONLINE session", SECRETARY_CUT_PERCENT),
                ));
            }
        }

        info!("Revenue for appointment {}: income {}, {} expense rows",
              appointment.id, income_amount, expenses.len());

        Ok(RevenueBreakdown {
            appointment_id: appointment.id,
            income,
            expenses,
        })
    }
}

pub fn validate_override(percent: u8) -> Result<u8, AppointmentError> {
    if DOCTOR_CUT_RANGE.contains(&percent) {
        Ok(percent)
    } else {
        Err(AppointmentError::ValidationError(format!(
            "doctor cut override must be between {} and {} percent, got {}",
            DOCTOR_CUT_RANGE.start(),
            DOCTOR_CUT_RANGE.end(),
            percent
        )))
    }
}

/// `amount * percent / 100` rounded to the nearest whole unit, halves away
/// from zero.
pub fn round_percent(amount: i64, percent: u8) -> i64 {
    let scaled = amount * i64::from(percent);
    if scaled >= 0 {
        (scaled + 50) / 100
    } else {
        (scaled - 50) / 100
    }
}

fn ledger_row(
    appointment: &Appointment,
    event_type: EventType,
    category: &str,
    amount: i64,
    description: String,
) -> NewFinancialEvent {
    NewFinancialEvent {
        event_date: appointment.session_date(),
        event_type,
        category: category.to_string(),
        amount,
        description,
        reference_type: ReferenceType::Appointment,
        reference_id: appointment.id.to_string(),
    }
}

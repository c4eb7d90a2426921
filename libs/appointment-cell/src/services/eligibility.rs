use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_models::CalendarDate;

use crate::models::{AppointmentError, FreeReturnEligibility};
use crate::store::AppointmentStore;

/// Days after a paid visit during which a follow-up may be free, inclusive.
pub const FREE_RETURN_WINDOW_DAYS: i64 = 10;

pub const NO_PAID_SESSION: &str = "no paid session found";

pub struct EligibilityService {
    store: Arc<dyn AppointmentStore>,
}

impl EligibilityService {
    pub fn new(store: Arc<dyn AppointmentStore>) -> Self {
        Self { store }
    }

    /// Evaluate a free return for `patient_id` on `candidate_date` against the
    /// patient's most recent paid appointment. `exclude_appointment_id` keeps
    /// an appointment being edited from qualifying itself.
    pub async fn evaluate(
        &self,
        patient_id: Uuid,
        candidate_date: CalendarDate,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<FreeReturnEligibility, AppointmentError> {
        debug!("Evaluating free return for patient {} on {}", patient_id, candidate_date);

        let last_paid = self.store
            .latest_paid_appointment(patient_id, exclude_appointment_id)
            .await?;

        let Some(last_paid) = last_paid else {
            return Ok(FreeReturnEligibility {
                patient_id,
                candidate_date,
                eligible: false,
                reason: Some(NO_PAID_SESSION.to_string()),
                last_paid_date: None,
                days_since_last_paid: None,
                days_remaining: 0,
            });
        };

        let last_paid_date = last_paid.session_date();
        Ok(assess_window(patient_id, candidate_date, last_paid_date))
    }

    /// Fail with `EligibilityError` unless a free return is allowed.
    pub async fn ensure_eligible(
        &self,
        patient_id: Uuid,
        candidate_date: CalendarDate,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<FreeReturnEligibility, AppointmentError> {
        let eligibility = self.evaluate(patient_id, candidate_date, exclude_appointment_id).await?;

        if !eligibility.eligible {
            let reason = eligibility.reason.clone().unwrap_or_else(|| NO_PAID_SESSION.to_string());
            warn!("Free return rejected for patient {}: {}", patient_id, reason);
            return Err(AppointmentError::EligibilityError(reason));
        }

        info!("Free return allowed for patient {} ({} days left in window)",
              patient_id, eligibility.days_remaining);
        Ok(eligibility)
    }
}

fn assess_window(patient_id: Uuid, candidate_date: CalendarDate, last_paid_date: CalendarDate) -> FreeReturnEligibility {
    let days = candidate_date.days_since(last_paid_date);
    let eligible = (0..=FREE_RETURN_WINDOW_DAYS).contains(&days);

    let reason = if eligible {
        None
    } else if days < 0 {
        Some(format!("last paid session on {} is after {}", last_paid_date, candidate_date))
    } else {
        Some(format!(
            "last paid session on {} is {} days before {}, window is {} days",
            last_paid_date, days, candidate_date, FREE_RETURN_WINDOW_DAYS
        ))
    };

    FreeReturnEligibility {
        patient_id,
        candidate_date,
        eligible,
        reason,
        last_paid_date: Some(last_paid_date),
        days_since_last_paid: Some(days),
        days_remaining: (FREE_RETURN_WINDOW_DAYS - days).max(0),
    }
}

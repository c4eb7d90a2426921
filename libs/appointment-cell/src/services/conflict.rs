use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{Appointment, AppointmentError, ConflictCheckResponse};
use crate::store::AppointmentStore;

pub struct ConflictDetectionService {
    store: Arc<dyn AppointmentStore>,
}

impl ConflictDetectionService {
    pub fn new(store: Arc<dyn AppointmentStore>) -> Self {
        Self { store }
    }

    /// Check for overlapping, non-cancelled appointments of a clinician.
    pub async fn check_conflicts(
        &self,
        clinician_id: Uuid,
        start_time: NaiveDateTime,
        end_time: NaiveDateTime,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<ConflictCheckResponse, AppointmentError> {
        debug!("Checking conflicts for clinician {} from {} to {}",
               clinician_id, start_time, end_time);

        let existing_appointments = self.store
            .find_clinician_appointments_between(clinician_id, start_time, end_time, exclude_appointment_id)
            .await?;

        // Adapters may return a superset of the window.
        let conflicting_appointments: Vec<Appointment> = existing_appointments
            .into_iter()
            .filter(|apt| Some(apt.id) != exclude_appointment_id)
            .filter(|apt| apt.is_active())
            .filter(|apt| appointments_overlap(apt.start_time, apt.end_time, start_time, end_time))
            .collect();

        let has_conflict = !conflicting_appointments.is_empty();
        if has_conflict {
            warn!("Conflict detected for clinician {} - {} conflicting appointments",
                  clinician_id, conflicting_appointments.len());
        }

        Ok(ConflictCheckResponse {
            has_conflict,
            conflicting_appointments,
        })
    }

    /// Fail with `ConflictDetected` when the slot is taken.
    pub async fn ensure_slot_free(
        &self,
        clinician_id: Uuid,
        start_time: NaiveDateTime,
        end_time: NaiveDateTime,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<(), AppointmentError> {
        let response = self
            .check_conflicts(clinician_id, start_time, end_time, exclude_appointment_id)
            .await?;

        if response.has_conflict {
            return Err(AppointmentError::ConflictDetected {
                clinician_id,
                conflicting: response.conflicting_appointments.iter().map(|a| a.id).collect(),
            });
        }

        Ok(())
    }
}

/// Half-open intervals: touching endpoints do not overlap.
pub fn appointments_overlap(
    existing_start: NaiveDateTime,
    existing_end: NaiveDateTime,
    candidate_start: NaiveDateTime,
    candidate_end: NaiveDateTime,
) -> bool {
    existing_start < candidate_end && existing_end > candidate_start
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    use crate::models::AppointmentStatus;
    use crate::test_support::{booking, memory_store, oct};

    #[test]
    fn overlap_rules() {
        // Contained, straddling and identical slots overlap.
        assert!(appointments_overlap(oct(12, 9, 0), oct(12, 10, 0), oct(12, 9, 15), oct(12, 9, 45)));
        assert!(appointments_overlap(oct(12, 9, 0), oct(12, 10, 0), oct(12, 9, 30), oct(12, 10, 30)));
        assert!(appointments_overlap(oct(12, 9, 0), oct(12, 10, 0), oct(12, 9, 0), oct(12, 10, 0)));
        // Back-to-back slots do not.
        assert!(!appointments_overlap(oct(12, 9, 0), oct(12, 10, 0), oct(12, 10, 0), oct(12, 11, 0)));
        assert!(!appointments_overlap(oct(12, 9, 0), oct(12, 10, 0), oct(12, 8, 0), oct(12, 9, 0)));
    }

    #[tokio::test]
    async fn detects_overlap_for_same_clinician_only() {
        let store = memory_store();
        let clinician = uuid::Uuid::new_v4();
        let existing = store
            .insert_appointment(&booking(uuid::Uuid::new_v4(), clinician, oct(12, 9, 0), 60))
            .await
            .unwrap();
        let service = ConflictDetectionService::new(store);

        let clash = service.check_conflicts(clinician, oct(12, 9, 30), oct(12, 10, 30), None).await.unwrap();
        assert!(clash.has_conflict);
        assert_eq!(clash.conflicting_appointments[0].id, existing.id);

        let other_clinician = service
            .check_conflicts(uuid::Uuid::new_v4(), oct(12, 9, 30), oct(12, 10, 30), None)
            .await
            .unwrap();
        assert!(!other_clinician.has_conflict);
    }

    #[tokio::test]
    async fn editing_an_appointment_ignores_itself() {
        let store = memory_store();
        let clinician = uuid::Uuid::new_v4();
        let existing = store
            .insert_appointment(&booking(uuid::Uuid::new_v4(), clinician, oct(12, 9, 0), 60))
            .await
            .unwrap();
        let service = ConflictDetectionService::new(store);

        service
            .ensure_slot_free(clinician, oct(12, 9, 15), oct(12, 10, 15), Some(existing.id))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn cancelled_appointments_free_the_slot() {
        let store = memory_store();
        let clinician = uuid::Uuid::new_v4();
        let mut existing = store
            .insert_appointment(&booking(uuid::Uuid::new_v4(), clinician, oct(12, 9, 0), 60))
            .await
            .unwrap();
        let service = ConflictDetectionService::new(store.clone());

        assert_matches!(
            service.ensure_slot_free(clinician, oct(12, 9, 0), oct(12, 10, 0), None).await,
            Err(AppointmentError::ConflictDetected { conflicting, .. }) if conflicting == vec![existing.id]
        );

        existing.status = AppointmentStatus::Cancelled;
        store.update_appointment(&existing).await.unwrap();

        service.ensure_slot_free(clinician, oct(12, 9, 0), oct(12, 10, 0), None).await.unwrap();
    }
}

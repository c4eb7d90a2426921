// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, info, warn};

use crate::models::{AppointmentError, AppointmentStatus, PaymentStatus};

/// What a payment status change means for the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentTransition {
    /// Not paid before or after.
    Untouched,
    /// Becomes PAID; ledger rows must be generated.
    BecomesPaid,
    /// Stays PAID; the writer runs again and is a no-op unless an earlier
    /// write failed.
    RemainsPaid,
    /// Leaves PAID. Recorded events are kept.
    LeavesPaid,
}

pub struct AppointmentLifecycleService;

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed. Same-status is a no-op.
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        if current_status == new_status {
            return Ok(());
        }

        if !self.get_valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::ValidationError(format!(
                "cannot move appointment from {} to {}",
                current_status, new_status
            )));
        }

        info!("Status transition validated: {} -> {}", current_status, new_status);
        Ok(())
    }

    /// Get all valid next statuses for a given current status
    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Scheduled => vec![
                AppointmentStatus::Arrived,
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::Arrived => vec![
                AppointmentStatus::Scheduled,
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::Cancelled => vec![AppointmentStatus::Scheduled],
            // Terminal
            AppointmentStatus::Completed => vec![],
        }
    }

    pub fn classify_payment_transition(&self, current: PaymentStatus, requested: PaymentStatus) -> PaymentTransition {
        match (current, requested) {
            (PaymentStatus::Paid, PaymentStatus::Paid) => PaymentTransition::RemainsPaid,
            (PaymentStatus::Paid, _) => {
                warn!("Payment leaves PAID ({} -> {}); recorded ledger events are kept", current, requested);
                PaymentTransition::LeavesPaid
            }
            (_, PaymentStatus::Paid) => PaymentTransition::BecomesPaid,
            _ => PaymentTransition::Untouched,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn allowed_transitions() {
        let lifecycle = AppointmentLifecycleService::new();

        lifecycle.validate_status_transition(AppointmentStatus::Scheduled, AppointmentStatus::Arrived).unwrap();
        lifecycle.validate_status_transition(AppointmentStatus::Arrived, AppointmentStatus::Scheduled).unwrap();
        lifecycle.validate_status_transition(AppointmentStatus::Arrived, AppointmentStatus::Completed).unwrap();
        lifecycle.validate_status_transition(AppointmentStatus::Cancelled, AppointmentStatus::Scheduled).unwrap();
        lifecycle.validate_status_transition(AppointmentStatus::Completed, AppointmentStatus::Completed).unwrap();
    }

    #[test]
    fn completed_is_terminal() {
        let lifecycle = AppointmentLifecycleService::new();
        assert!(lifecycle.get_valid_transitions(AppointmentStatus::Completed).is_empty());
        assert_matches!(
            lifecycle.validate_status_transition(AppointmentStatus::Completed, AppointmentStatus::Scheduled),
            Err(AppointmentError::ValidationError(_))
        );
    }

    #[test]
    fn cancelled_only_reopens() {
        let lifecycle = AppointmentLifecycleService::new();
        assert_matches!(
            lifecycle.validate_status_transition(AppointmentStatus::Cancelled, AppointmentStatus::Completed),
            Err(AppointmentError::ValidationError(_))
        );
    }

    #[test]
    fn payment_transitions() {
        let lifecycle = AppointmentLifecycleService::new();
        assert_eq!(
            lifecycle.classify_payment_transition(PaymentStatus::Unpaid, PaymentStatus::Paid),
            PaymentTransition::BecomesPaid
        );
        assert_eq!(
            lifecycle.classify_payment_transition(PaymentStatus::FreeReturn, PaymentStatus::Paid),
            PaymentTransition::BecomesPaid
        );
        assert_eq!(
            lifecycle.classify_payment_transition(PaymentStatus::Paid, PaymentStatus::Paid),
            PaymentTransition::RemainsPaid
        );
        assert_eq!(
            lifecycle.classify_payment_transition(PaymentStatus::Paid, PaymentStatus::Unpaid),
            PaymentTransition::LeavesPaid
        );
        assert_eq!(
            lifecycle.classify_payment_transition(PaymentStatus::Unpaid, PaymentStatus::FreeReturn),
            PaymentTransition::Untouched
        );
    }
}

use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{AppointmentError, DeletionReport};
use crate::store::AppointmentStore;

/// The only path that removes appointments. Ledger rows and the appointment
/// go together in one store transaction.
pub struct DeletionCoordinator {
    store: Arc<dyn AppointmentStore>,
}

impl DeletionCoordinator {
    pub fn new(store: Arc<dyn AppointmentStore>) -> Self {
        Self { store }
    }

    pub async fn delete_appointment(&self, appointment_id: Uuid) -> Result<DeletionReport, AppointmentError> {
        match self.store.delete_appointment_cascade(appointment_id).await {
            Ok(Some(deleted_event_count)) => {
                info!("Deleted appointment {} and {} ledger events", appointment_id, deleted_event_count);
                Ok(DeletionReport {
                    appointment_id,
                    deleted_event_count,
                })
            }
            Ok(None) => {
                warn!("Delete requested for unknown appointment {}", appointment_id);
                Err(AppointmentError::NotFound)
            }
            Err(e) => {
                error!("Cascade delete of appointment {} rolled back: {}", appointment_id, e);
                Err(AppointmentError::DeletionError(e.to_string()))
            }
        }
    }
}

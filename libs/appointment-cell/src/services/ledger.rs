use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use crate::models::{AppointmentError, EventType, FinancialEvent, LedgerWrite, RevenueBreakdown};
use crate::store::AppointmentStore;

/// Writes a revenue breakdown as one conditional store call. The store's
/// unique income constraint is the only duplicate guard.
pub struct LedgerWriter {
    store: Arc<dyn AppointmentStore>,
}

impl LedgerWriter {
    pub fn new(store: Arc<dyn AppointmentStore>) -> Self {
        Self { store }
    }

    pub async fn record(&self, breakdown: &RevenueBreakdown) -> Result<LedgerWrite, AppointmentError> {
        validate_breakdown(breakdown)?;

        let write = self.store
            .record_appointment_ledger(breakdown.appointment_id, &breakdown.income, &breakdown.expenses)
            .await
            .map_err(|e| {
                error!("Ledger write failed for appointment {}: {}", breakdown.appointment_id, e);
                AppointmentError::LedgerGenerationError(e.to_string())
            })?;

        match &write {
            LedgerWrite::Recorded(events) => {
                info!("Recorded {} ledger events for appointment {}", events.len(), breakdown.appointment_id);
            }
            LedgerWrite::AlreadyExists => {
                info!("Income already recorded for appointment {}, nothing written", breakdown.appointment_id);
            }
        }

        Ok(write)
    }

    pub async fn events_for(&self, appointment_id: Uuid) -> Result<Vec<FinancialEvent>, AppointmentError> {
        Ok(self.store.appointment_ledger(appointment_id).await?)
    }
}

fn validate_breakdown(breakdown: &RevenueBreakdown) -> Result<(), AppointmentError> {
    let reference = breakdown.appointment_id.to_string();

    if breakdown.income.event_type != EventType::Income {
        return Err(AppointmentError::LedgerGenerationError("income row is not an INCOME event".into()));
    }

    for event in std::iter::once(&breakdown.income).chain(breakdown.expenses.iter()) {
        if event.amount <= 0 {
            return Err(AppointmentError::LedgerGenerationError(format!(
                "{} amount must be positive, got {}",
                event.category, event.amount
            )));
        }
        if event.reference_id != reference {
            return Err(AppointmentError::LedgerGenerationError(format!(
                "{} row references {} instead of {}",
                event.category, event.reference_id, reference
            )));
        }
    }

    if breakdown.expenses.iter().any(|e| e.event_type != EventType::Expense) {
        return Err(AppointmentError::LedgerGenerationError("derived rows must be EXPENSE events".into()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    use crate::models::{NewFinancialEvent, ReferenceType};
    use crate::test_support::{booking, memory_store, oct};
    use shared_models::CalendarDate;

    fn row(appointment_id: Uuid, event_type: EventType, category: &str, amount: i64) -> NewFinancialEvent {
        NewFinancialEvent {
            event_date: CalendarDate::from(oct(12, 9, 0)),
            event_type,
            category: category.to_string(),
            amount,
            description: category.to_string(),
            reference_type: ReferenceType::Appointment,
            reference_id: appointment_id.to_string(),
        }
    }

    fn breakdown(appointment_id: Uuid) -> RevenueBreakdown {
        RevenueBreakdown {
            appointment_id,
            income: row(appointment_id, EventType::Income, "session_income", 500),
            expenses: vec![row(appointment_id, EventType::Expense, "doctor_cut", 100)],
        }
    }

    #[tokio::test]
    async fn second_write_is_a_no_op() {
        let store = memory_store();
        let appointment = store
            .insert_appointment(&booking(Uuid::new_v4(), Uuid::new_v4(), oct(12, 9, 0), 45))
            .await
            .unwrap();
        let writer = LedgerWriter::new(store);

        assert_matches!(writer.record(&breakdown(appointment.id)).await, Ok(LedgerWrite::Recorded(events)) if events.len() == 2);
        assert_matches!(writer.record(&breakdown(appointment.id)).await, Ok(LedgerWrite::AlreadyExists));
        assert_eq!(writer.events_for(appointment.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn rejects_non_positive_amounts_before_writing() {
        let store = memory_store();
        let appointment = store
            .insert_appointment(&booking(Uuid::new_v4(), Uuid::new_v4(), oct(12, 9, 0), 45))
            .await
            .unwrap();
        let writer = LedgerWriter::new(store);

        let mut bad = breakdown(appointment.id);
        bad.expenses[0].amount = 0;

        assert_matches!(writer.record(&bad).await, Err(AppointmentError::LedgerGenerationError(_)));
        assert!(writer.events_for(appointment.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_rows_for_another_appointment() {
        let writer = LedgerWriter::new(memory_store());
        let mut bad = breakdown(Uuid::new_v4());
        bad.expenses[0].reference_id = Uuid::new_v4().to_string();

        assert_matches!(writer.record(&bad).await, Err(AppointmentError::LedgerGenerationError(_)));
    }
}

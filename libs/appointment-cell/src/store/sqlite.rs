use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};
use uuid::Uuid;

use shared_database::sqlite::{open_database, open_memory_database};
use shared_database::DatabaseError;
use shared_models::CalendarDate;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, EventType, FinancialEvent, LedgerWrite,
    NewAppointment, NewFinancialEvent, PaymentStatus, ReferenceType, SessionType,
};
use crate::store::AppointmentStore;

macro_rules! sql_text_enum {
    ($($ty:ty),* $(,)?) => {$(
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: AppointmentError| FromSqlError::Other(Box::new(e)))
            }
        }
    )*};
}

sql_text_enum!(AppointmentStatus, SessionType, PaymentStatus, EventType, ReferenceType);

const APPOINTMENT_COLUMNS: &str = "id, patient_id, clinician_id, start_time, end_time, status, \
     session_type, payment_status, free_return_reason, doctor_cut_percent, doctor_involved, \
     notes, created_at, updated_at";

const EVENT_COLUMNS: &str = "id, event_date, event_type, category, amount, description, \
     reference_type, reference_id, created_at";

/// SQLite-backed store. All statements go through one connection, so
/// requests are serialized and each multi-statement write is a rusqlite
/// transaction.
#[derive(Clone)]
pub struct SqliteAppointmentStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAppointmentStore {
    /// Wrap a connection whose schema is already migrated.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        info!("Opening SQLite appointment store at {}", path.display());
        Ok(Self::new(open_database(path)?))
    }

    pub fn in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::new(open_memory_database()?))
    }

    async fn run<F, T>(&self, op: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&mut Connection) -> Result<T, DatabaseError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| DatabaseError::ConnectionUnavailable("sqlite connection lock poisoned".into()))?;
            op(&mut guard)
        })
        .await
        .map_err(|e| DatabaseError::ConnectionUnavailable(e.to_string()))?
    }
}

fn appointment_from_row(row: &Row<'_>) -> rusqlite::Result<Appointment> {
    Ok(Appointment {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        clinician_id: row.get(2)?,
        start_time: row.get(3)?,
        end_time: row.get(4)?,
        status: row.get(5)?,
        session_type: row.get(6)?,
        payment_status: row.get(7)?,
        free_return_reason: row.get(8)?,
        doctor_cut_percent: row.get(9)?,
        doctor_involved: row.get(10)?,
        notes: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<FinancialEvent> {
    Ok(FinancialEvent {
        id: row.get(0)?,
        event_date: CalendarDate::from(row.get::<_, NaiveDate>(1)?),
        event_type: row.get(2)?,
        category: row.get(3)?,
        amount: row.get(4)?,
        description: row.get(5)?,
        reference_type: row.get(6)?,
        reference_id: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn insert_event(
    conn: &Connection,
    sql: &str,
    appointment_id: Uuid,
    event: &NewFinancialEvent,
) -> rusqlite::Result<usize> {
    conn.execute(
        sql,
        params![
            event.event_date.as_naive(),
            event.event_type,
            event.category,
            event.amount,
            event.description,
            ReferenceType::Appointment,
            appointment_id.to_string(),
            Utc::now(),
        ],
    )
}

const INSERT_INCOME_SQL: &str = "INSERT INTO financial_events
     (event_date, event_type, category, amount, description, reference_type, reference_id, created_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
     ON CONFLICT DO NOTHING";

const INSERT_EXPENSE_SQL: &str = "INSERT INTO financial_events
     (event_date, event_type, category, amount, description, reference_type, reference_id, created_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";

#[async_trait]
impl AppointmentStore for SqliteAppointmentStore {
    async fn insert_appointment(&self, appointment: &NewAppointment) -> Result<Appointment, DatabaseError> {
        let new = appointment.clone();
        self.run(move |conn| {
            let record = Appointment {
                id: Uuid::new_v4(),
                patient_id: new.patient_id,
                clinician_id: new.clinician_id,
                start_time: new.start_time,
                end_time: new.end_time,
                status: new.status,
                session_type: new.session_type,
                payment_status: new.payment_status,
                free_return_reason: new.free_return_reason,
                doctor_cut_percent: new.doctor_cut_percent,
                doctor_involved: new.doctor_involved,
                notes: new.notes,
                created_at: new.created_at,
                updated_at: new.created_at,
            };

            conn.execute(
                &format!(
                    "INSERT INTO appointments ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                    APPOINTMENT_COLUMNS
                ),
                params![
                    record.id,
                    record.patient_id,
                    record.clinician_id,
                    record.start_time,
                    record.end_time,
                    record.status,
                    record.session_type,
                    record.payment_status,
                    record.free_return_reason,
                    record.doctor_cut_percent,
                    record.doctor_involved,
                    record.notes,
                    record.created_at,
                    record.updated_at,
                ],
            )?;

            debug!("Inserted appointment {}", record.id);
            Ok(record)
        })
        .await
    }

    async fn update_appointment(&self, appointment: &Appointment) -> Result<Appointment, DatabaseError> {
        let record = appointment.clone();
        self.run(move |conn| {
            let updated = conn.execute(
                "UPDATE appointments
                 SET clinician_id = ?2, start_time = ?3, end_time = ?4, status = ?5,
                     session_type = ?6, payment_status = ?7, free_return_reason = ?8,
                     doctor_cut_percent = ?9, doctor_involved = ?10, notes = ?11, updated_at = ?12
                 WHERE id = ?1",
                params![
                    record.id,
                    record.clinician_id,
                    record.start_time,
                    record.end_time,
                    record.status,
                    record.session_type,
                    record.payment_status,
                    record.free_return_reason,
                    record.doctor_cut_percent,
                    record.doctor_involved,
                    record.notes,
                    record.updated_at,
                ],
            )?;

            if updated == 0 {
                return Err(DatabaseError::NotFound {
                    entity: "Appointment".into(),
                    id: record.id.to_string(),
                });
            }

            Ok(record)
        })
        .await
    }

    async fn find_appointment(&self, id: Uuid) -> Result<Option<Appointment>, DatabaseError> {
        self.run(move |conn| {
            let appointment = conn
                .query_row(
                    &format!("SELECT {} FROM appointments WHERE id = ?1", APPOINTMENT_COLUMNS),
                    params![id],
                    appointment_from_row,
                )
                .optional()?;
            Ok(appointment)
        })
        .await
    }

    async fn find_clinician_appointments_between(
        &self,
        clinician_id: Uuid,
        start: NaiveDateTime,
        end: NaiveDateTime,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>, DatabaseError> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM appointments
                 WHERE clinician_id = ?1
                   AND status != 'cancelled'
                   AND start_time < ?3
                   AND end_time > ?2
                   AND (?4 IS NULL OR id != ?4)
                 ORDER BY start_time ASC",
                APPOINTMENT_COLUMNS
            ))?;

            let rows = stmt.query_map(
                params![clinician_id, start, end, exclude_appointment_id],
                appointment_from_row,
            )?;

            let mut appointments = Vec::new();
            for row in rows {
                appointments.push(row?);
            }
            Ok(appointments)
        })
        .await
    }

    async fn latest_paid_appointment(
        &self,
        patient_id: Uuid,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<Option<Appointment>, DatabaseError> {
        self.run(move |conn| {
            let appointment = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM appointments
                         WHERE patient_id = ?1
                           AND payment_status = 'PAID'
                           AND (?2 IS NULL OR id != ?2)
                         ORDER BY start_time DESC
                         LIMIT 1",
                        APPOINTMENT_COLUMNS
                    ),
                    params![patient_id, exclude_appointment_id],
                    appointment_from_row,
                )
                .optional()?;
            Ok(appointment)
        })
        .await
    }

    async fn count_paid_appointments(
        &self,
        patient_id: Uuid,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<u32, DatabaseError> {
        self.run(move |conn| {
            let count: u32 = conn.query_row(
                "SELECT COUNT(*) FROM appointments
                 WHERE patient_id = ?1
                   AND payment_status = 'PAID'
                   AND (?2 IS NULL OR id != ?2)",
                params![patient_id, exclude_appointment_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
        .await
    }

    async fn record_appointment_ledger(
        &self,
        appointment_id: Uuid,
        income: &NewFinancialEvent,
        expenses: &[NewFinancialEvent],
    ) -> Result<LedgerWrite, DatabaseError> {
        let income = income.clone();
        let expenses = expenses.to_vec();

        self.run(move |conn| {
            let tx = conn.transaction()?;

            if insert_event(&tx, INSERT_INCOME_SQL, appointment_id, &income)? == 0 {
                // Dropping the transaction rolls it back; nothing was written.
                debug!("Income already recorded for appointment {}", appointment_id);
                return Ok(LedgerWrite::AlreadyExists);
            }

            let created_at = Utc::now();
            let mut events = Vec::with_capacity(1 + expenses.len());
            events.push(income.into_event(tx.last_insert_rowid(), created_at));

            for expense in expenses {
                insert_event(&tx, INSERT_EXPENSE_SQL, appointment_id, &expense)?;
                events.push(expense.into_event(tx.last_insert_rowid(), created_at));
            }

            tx.commit()?;
            Ok(LedgerWrite::Recorded(events))
        })
        .await
    }

    async fn appointment_ledger(&self, appointment_id: Uuid) -> Result<Vec<FinancialEvent>, DatabaseError> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM financial_events
                 WHERE reference_type = 'APPOINTMENT' AND reference_id = ?1
                 ORDER BY id ASC",
                EVENT_COLUMNS
            ))?;

            let rows = stmt.query_map(params![appointment_id.to_string()], event_from_row)?;

            let mut events = Vec::new();
            for row in rows {
                events.push(row?);
            }
            Ok(events)
        })
        .await
    }

    async fn delete_appointment_cascade(&self, appointment_id: Uuid) -> Result<Option<u64>, DatabaseError> {
        self.run(move |conn| {
            let tx = conn.transaction()?;

            let deleted_events = tx.execute(
                "DELETE FROM financial_events WHERE reference_type = 'APPOINTMENT' AND reference_id = ?1",
                params![appointment_id.to_string()],
            )?;

            let deleted_appointments = tx.execute(
                "DELETE FROM appointments WHERE id = ?1",
                params![appointment_id],
            )?;

            if deleted_appointments == 0 {
                return Ok(None);
            }

            tx.commit()?;

            info!(
                appointment_id = %appointment_id,
                ledger_events = deleted_events,
                "Appointment cascade-deleted with its ledger events"
            );
            Ok(Some(deleted_events as u64))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn new_appointment(patient_id: Uuid, clinician_id: Uuid, start: NaiveDateTime, end: NaiveDateTime) -> NewAppointment {
        NewAppointment {
            patient_id,
            clinician_id,
            start_time: start,
            end_time: end,
            status: AppointmentStatus::Scheduled,
            session_type: SessionType::InClinic,
            payment_status: PaymentStatus::Unpaid,
            free_return_reason: None,
            doctor_cut_percent: None,
            doctor_involved: true,
            notes: None,
            created_at: Utc::now(),
        }
    }

    fn ledger_event(appointment_id: Uuid, event_type: EventType, category: &str, amount: i64) -> NewFinancialEvent {
        NewFinancialEvent {
            event_date: CalendarDate::from_ymd(2026, 10, 12).unwrap(),
            event_type,
            category: category.to_string(),
            amount,
            description: format!("{} test", category),
            reference_type: ReferenceType::Appointment,
            reference_id: appointment_id.to_string(),
        }
    }

    #[tokio::test]
    async fn insert_and_find_round_trip() {
        let store = SqliteAppointmentStore::in_memory().unwrap();
        let created = store
            .insert_appointment(&new_appointment(Uuid::new_v4(), Uuid::new_v4(), at(12, 9, 0), at(12, 9, 45)))
            .await
            .unwrap();

        let found = store.find_appointment(created.id).await.unwrap().unwrap();
        assert_eq!(found, created);
        assert!(store.find_appointment(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn window_query_skips_cancelled_and_excluded() {
        let store = SqliteAppointmentStore::in_memory().unwrap();
        let clinician = Uuid::new_v4();

        let kept = store
            .insert_appointment(&new_appointment(Uuid::new_v4(), clinician, at(12, 9, 0), at(12, 10, 0)))
            .await
            .unwrap();
        let excluded = store
            .insert_appointment(&new_appointment(Uuid::new_v4(), clinician, at(12, 9, 30), at(12, 10, 30)))
            .await
            .unwrap();
        let mut cancelled = store
            .insert_appointment(&new_appointment(Uuid::new_v4(), clinician, at(12, 9, 15), at(12, 9, 45)))
            .await
            .unwrap();
        cancelled.status = AppointmentStatus::Cancelled;
        store.update_appointment(&cancelled).await.unwrap();
        // Ends exactly when the window starts.
        store
            .insert_appointment(&new_appointment(Uuid::new_v4(), clinician, at(12, 8, 0), at(12, 9, 0)))
            .await
            .unwrap();

        let hits = store
            .find_clinician_appointments_between(clinician, at(12, 9, 0), at(12, 11, 0), Some(excluded.id))
            .await
            .unwrap();

        assert_eq!(hits.iter().map(|a| a.id).collect::<Vec<_>>(), vec![kept.id]);
    }

    #[tokio::test]
    async fn latest_paid_orders_by_start_descending() {
        let store = SqliteAppointmentStore::in_memory().unwrap();
        let patient = Uuid::new_v4();

        let mut older = new_appointment(patient, Uuid::new_v4(), at(5, 9, 0), at(5, 10, 0));
        older.payment_status = PaymentStatus::Paid;
        let mut newer = new_appointment(patient, Uuid::new_v4(), at(8, 9, 0), at(8, 10, 0));
        newer.payment_status = PaymentStatus::Paid;
        let unpaid = new_appointment(patient, Uuid::new_v4(), at(9, 9, 0), at(9, 10, 0));

        // Insert out of order to make sure ordering is by start time.
        let newer = store.insert_appointment(&newer).await.unwrap();
        let older = store.insert_appointment(&older).await.unwrap();
        store.insert_appointment(&unpaid).await.unwrap();

        let latest = store.latest_paid_appointment(patient, None).await.unwrap().unwrap();
        assert_eq!(latest.id, newer.id);

        let latest_excluding = store.latest_paid_appointment(patient, Some(newer.id)).await.unwrap().unwrap();
        assert_eq!(latest_excluding.id, older.id);

        assert_eq!(store.count_paid_appointments(patient, None).await.unwrap(), 2);
        assert_eq!(store.count_paid_appointments(patient, Some(older.id)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn ledger_write_is_conditional_on_income() {
        let store = SqliteAppointmentStore::in_memory().unwrap();
        let appointment_id = Uuid::new_v4();
        let income = ledger_event(appointment_id, EventType::Income, "session_income", 500);
        let expenses = vec![ledger_event(appointment_id, EventType::Expense, "doctor_cut", 100)];

        let first = store.record_appointment_ledger(appointment_id, &income, &expenses).await.unwrap();
        match first {
            LedgerWrite::Recorded(events) => {
                assert_eq!(events.len(), 2);
                assert_eq!(events[0].event_type, EventType::Income);
                assert_eq!(events[1].amount, 100);
            }
            other => panic!("expected recorded events, got {:?}", other),
        }

        let second = store.record_appointment_ledger(appointment_id, &income, &expenses).await.unwrap();
        assert_eq!(second, LedgerWrite::AlreadyExists);

        // The rejected retry must not leave its expense behind.
        assert_eq!(store.appointment_ledger(appointment_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failed_expense_rolls_back_income() {
        let store = SqliteAppointmentStore::in_memory().unwrap();
        let appointment_id = Uuid::new_v4();
        let income = ledger_event(appointment_id, EventType::Income, "session_income", 500);
        let invalid_expense = ledger_event(appointment_id, EventType::Expense, "doctor_cut", 0);

        let result = store
            .record_appointment_ledger(appointment_id, &income, &[invalid_expense])
            .await;

        assert!(result.is_err());
        assert!(store.appointment_ledger(appointment_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cascade_delete_removes_ledger_rows() {
        let store = SqliteAppointmentStore::in_memory().unwrap();
        let appointment = store
            .insert_appointment(&new_appointment(Uuid::new_v4(), Uuid::new_v4(), at(12, 9, 0), at(12, 10, 0)))
            .await
            .unwrap();
        let income = ledger_event(appointment.id, EventType::Income, "session_income", 500);
        store.record_appointment_ledger(appointment.id, &income, &[]).await.unwrap();

        let deleted = store.delete_appointment_cascade(appointment.id).await.unwrap();
        assert_eq!(deleted, Some(1));
        assert!(store.find_appointment(appointment.id).await.unwrap().is_none());
        assert!(store.appointment_ledger(appointment.id).await.unwrap().is_empty());

        assert_eq!(store.delete_appointment_cascade(appointment.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn cascade_delete_of_unknown_id_keeps_foreign_rows() {
        let store = SqliteAppointmentStore::in_memory().unwrap();
        let unknown = Uuid::new_v4();
        let income = ledger_event(unknown, EventType::Income, "session_income", 500);
        store.record_appointment_ledger(unknown, &income, &[]).await.unwrap();

        assert_eq!(store.delete_appointment_cascade(unknown).await.unwrap(), None);
        assert_eq!(store.appointment_ledger(unknown).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cascade_delete_failure_rolls_back_everything() {
        let conn = open_memory_database().unwrap();
        conn.execute_batch(
            "CREATE TRIGGER block_appointment_delete BEFORE DELETE ON appointments
             BEGIN SELECT RAISE(ABORT, 'appointment rows are locked'); END;",
        )
        .unwrap();
        let store = SqliteAppointmentStore::new(conn);

        let appointment = store
            .insert_appointment(&new_appointment(Uuid::new_v4(), Uuid::new_v4(), at(12, 9, 0), at(12, 10, 0)))
            .await
            .unwrap();
        let income = ledger_event(appointment.id, EventType::Income, "session_income", 500);
        let expense = ledger_event(appointment.id, EventType::Expense, "doctor_cut", 100);
        store.record_appointment_ledger(appointment.id, &income, &[expense]).await.unwrap();

        assert!(store.delete_appointment_cascade(appointment.id).await.is_err());

        assert!(store.find_appointment(appointment.id).await.unwrap().is_some());
        assert_eq!(store.appointment_ledger(appointment.id).await.unwrap().len(), 2);
    }
}

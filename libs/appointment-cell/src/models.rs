// libs/appointment-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::fmt;
use std::str::FromStr;

use shared_models::CalendarDate;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

/// A booked session. `start_time` and `end_time` are clinic-local wall-clock
/// times; they carry no timezone on purpose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub clinician_id: Uuid,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub status: AppointmentStatus,
    pub session_type: SessionType,
    pub payment_status: PaymentStatus,
    pub free_return_reason: Option<String>,
    pub doctor_cut_percent: Option<u8>,
    pub doctor_involved: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn session_date(&self) -> CalendarDate {
        CalendarDate::from(self.start_time)
    }

    pub fn is_active(&self) -> bool {
        self.status != AppointmentStatus::Cancelled
    }
}

/// Appointment row before the store assigns its id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAppointment {
    pub patient_id: Uuid,
    pub clinician_id: Uuid,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub status: AppointmentStatus,
    pub session_type: SessionType,
    pub payment_status: PaymentStatus,
    pub free_return_reason: Option<String>,
    pub doctor_cut_percent: Option<u8>,
    pub doctor_involved: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    #[default]
    Scheduled,
    Arrived,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Arrived => "arrived",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = AppointmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(AppointmentStatus::Scheduled),
            "arrived" => Ok(AppointmentStatus::Arrived),
            "completed" => Ok(AppointmentStatus::Completed),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            other => Err(AppointmentError::ValidationError(format!("unknown appointment status: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionType {
    InClinic,
    Online,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::InClinic => "IN_CLINIC",
            SessionType::Online => "ONLINE",
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionType {
    type Err = AppointmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN_CLINIC" => Ok(SessionType::InClinic),
            "ONLINE" => Ok(SessionType::Online),
            other => Err(AppointmentError::ValidationError(format!("unknown session type: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Paid,
    #[default]
    Unpaid,
    FreeReturn,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Unpaid => "UNPAID",
            PaymentStatus::FreeReturn => "FREE_RETURN",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = AppointmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PAID" => Ok(PaymentStatus::Paid),
            "UNPAID" => Ok(PaymentStatus::Unpaid),
            "FREE_RETURN" => Ok(PaymentStatus::FreeReturn),
            other => Err(AppointmentError::ValidationError(format!("unknown payment status: {}", other))),
        }
    }
}

/// How the doctor's share of a paid session is decided.
///
/// Wire format: `{"mode": "auto"}` or `{"mode": "override", "percent": 15}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "mode", content = "percent", rename_all = "snake_case")]
pub enum DoctorCut {
    #[default]
    Auto,
    Override(u8),
}

// ==============================================================================
// LEDGER MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Income,
    Expense,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Income => "INCOME",
            EventType::Expense => "EXPENSE",
        }
    }
}

impl FromStr for EventType {
    type Err = AppointmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INCOME" => Ok(EventType::Income),
            "EXPENSE" => Ok(EventType::Expense),
            other => Err(AppointmentError::ValidationError(format!("unknown event type: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferenceType {
    Appointment,
    Patient,
    Expense,
    System,
}

impl ReferenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceType::Appointment => "APPOINTMENT",
            ReferenceType::Patient => "PATIENT",
            ReferenceType::Expense => "EXPENSE",
            ReferenceType::System => "SYSTEM",
        }
    }
}

impl FromStr for ReferenceType {
    type Err = AppointmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "APPOINTMENT" => Ok(ReferenceType::Appointment),
            "PATIENT" => Ok(ReferenceType::Patient),
            "EXPENSE" => Ok(ReferenceType::Expense),
            "SYSTEM" => Ok(ReferenceType::System),
            other => Err(AppointmentError::ValidationError(format!("unknown reference type: {}", other))),
        }
    }
}

/// An append-only ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialEvent {
    pub id: i64,
    pub event_date: CalendarDate,
    pub event_type: EventType,
    pub category: String,
    pub amount: i64,
    pub description: String,
    pub reference_type: ReferenceType,
    pub reference_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFinancialEvent {
    pub event_date: CalendarDate,
    pub event_type: EventType,
    pub category: String,
    pub amount: i64,
    pub description: String,
    pub reference_type: ReferenceType,
    pub reference_id: String,
}

impl NewFinancialEvent {
    pub fn into_event(self, id: i64, created_at: DateTime<Utc>) -> FinancialEvent {
        FinancialEvent {
            id,
            event_date: self.event_date,
            event_type: self.event_type,
            category: self.category,
            amount: self.amount,
            description: self.description,
            reference_type: self.reference_type,
            reference_id: self.reference_id,
            created_at,
        }
    }
}

/// Income plus derived expenses for one paid appointment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueBreakdown {
    pub appointment_id: Uuid,
    pub income: NewFinancialEvent,
    pub expenses: Vec<NewFinancialEvent>,
}

/// Result of a conditional ledger write.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerWrite {
    Recorded(Vec<FinancialEvent>),
    AlreadyExists,
}

/// What happened to the ledger as a side effect of a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LedgerOutcome {
    /// The appointment is not PAID; nothing to record.
    NotApplicable,
    Generated { events: Vec<FinancialEvent> },
    AlreadyExists,
    /// The appointment write succeeded but the ledger write did not.
    Failed { error: String },
}

impl LedgerOutcome {
    pub fn generated_events(&self) -> &[FinancialEvent] {
        match self {
            LedgerOutcome::Generated { events } => events,
            _ => &[],
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, LedgerOutcome::Failed { .. })
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

fn default_doctor_involved() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub patient_id: Uuid,
    pub clinician_id: Uuid,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub session_type: SessionType,
    #[serde(default)]
    pub status: AppointmentStatus,
    #[serde(default)]
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub free_return_reason: Option<String>,
    #[serde(default)]
    pub doctor_cut: DoctorCut,
    #[serde(default = "default_doctor_involved")]
    pub doctor_involved: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub clinician_id: Option<Uuid>,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    pub status: Option<AppointmentStatus>,
    pub session_type: Option<SessionType>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePaymentRequest {
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub free_return_reason: Option<String>,
    #[serde(default)]
    pub doctor_cut: DoctorCut,
    #[serde(default)]
    pub doctor_involved: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingOutcome {
    pub appointment: Appointment,
    pub ledger: LedgerOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentUpdateOutcome {
    pub appointment: Appointment,
    pub generated_events: Vec<FinancialEvent>,
    pub ledger: LedgerOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeletionReport {
    pub appointment_id: Uuid,
    pub deleted_event_count: u64,
}

// ==============================================================================
// CONFLICT DETECTION MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictCheckRequest {
    pub clinician_id: Uuid,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub exclude_appointment_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConflictCheckResponse {
    pub has_conflict: bool,
    pub conflicting_appointments: Vec<Appointment>,
}

// ==============================================================================
// ELIGIBILITY MODELS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FreeReturnEligibility {
    pub patient_id: Uuid,
    pub candidate_date: CalendarDate,
    pub eligible: bool,
    pub reason: Option<String>,
    pub last_paid_date: Option<CalendarDate>,
    pub days_since_last_paid: Option<i64>,
    pub days_remaining: i64,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Clinician {clinician_id} already has {} overlapping appointment(s)", .conflicting.len())]
    ConflictDetected { clinician_id: Uuid, conflicting: Vec<Uuid> },

    #[error("In-clinic sessions are not held on {weekday} ({date})")]
    ScheduleViolation { date: CalendarDate, weekday: String },

    #[error("Free return not allowed: {0}")]
    EligibilityError(String),

    #[error("Ledger generation failed: {0}")]
    LedgerGenerationError(String),

    #[error("Deletion failed and was rolled back: {0}")]
    DeletionError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<shared_database::DatabaseError> for AppointmentError {
    fn from(e: shared_database::DatabaseError) -> Self {
        match e {
            shared_database::DatabaseError::NotFound { .. } => AppointmentError::NotFound,
            other => AppointmentError::DatabaseError(other.to_string()),
        }
    }
}

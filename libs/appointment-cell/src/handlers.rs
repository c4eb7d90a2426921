// libs/appointment-cell/src/handlers.rs
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_models::error::AppError;
use shared_models::CalendarDate;

use crate::models::{
    AppointmentError, ConflictCheckRequest, CreateAppointmentRequest, UpdateAppointmentRequest,
    UpdatePaymentRequest,
};
use crate::state::AppointmentCellState;

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct ConflictCheckQuery {
    pub clinician_id: Uuid,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub exclude_appointment_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct EligibilityQuery {
    /// `YYYY-MM-DD`, or any string starting with one. Defaults to today.
    pub date: Option<String>,
}

impl From<AppointmentError> for AppError {
    fn from(e: AppointmentError) -> Self {
        match e {
            AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
            AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
            e @ AppointmentError::ConflictDetected { .. } => AppError::Conflict(e.to_string()),
            e @ AppointmentError::ScheduleViolation { .. } => AppError::BusinessRule(e.to_string()),
            e @ AppointmentError::EligibilityError(_) => AppError::BusinessRule(e.to_string()),
            e @ AppointmentError::LedgerGenerationError(_) => AppError::Internal(e.to_string()),
            e @ AppointmentError::DeletionError(_) => AppError::Database(e.to_string()),
            AppointmentError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

// ==============================================================================
// APPOINTMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<AppointmentCellState>,
    payload: Result<Json<CreateAppointmentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let Json(request) = payload?;
    let outcome = state.booking_service().create_appointment(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "appointment": outcome.appointment,
            "ledger": outcome.ledger,
        })),
    ))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<AppointmentCellState>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.booking_service().get_appointment(appointment_id).await?;
    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<AppointmentCellState>,
    Path(appointment_id): Path<Uuid>,
    payload: Result<Json<UpdateAppointmentRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(request) = payload?;
    let appointment = state
        .booking_service()
        .update_appointment(appointment_id, request)
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
    })))
}

/// Payment changes drive the ledger. A failed ledger write still answers 200
/// with `ledger.status = "failed"` since the appointment itself was saved.
#[axum::debug_handler]
pub async fn update_payment(
    State(state): State<AppointmentCellState>,
    Path(appointment_id): Path<Uuid>,
    payload: Result<Json<UpdatePaymentRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(request) = payload?;
    let outcome = state
        .booking_service()
        .update_payment(appointment_id, request)
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": outcome.appointment,
        "generated_events": outcome.generated_events,
        "ledger": outcome.ledger,
    })))
}

#[axum::debug_handler]
pub async fn delete_appointment(
    State(state): State<AppointmentCellState>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let report = state.booking_service().delete_appointment(appointment_id).await?;

    Ok(Json(json!({
        "success": true,
        "appointment_id": report.appointment_id,
        "deleted_event_count": report.deleted_event_count,
    })))
}

#[axum::debug_handler]
pub async fn get_appointment_ledger(
    State(state): State<AppointmentCellState>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let events = state.booking_service().appointment_ledger(appointment_id).await?;

    Ok(Json(json!({
        "appointment_id": appointment_id,
        "events": events,
        "total": events.len(),
    })))
}

// ==============================================================================
// UTILITY HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn check_free_return_eligibility(
    State(state): State<AppointmentCellState>,
    Path(patient_id): Path<Uuid>,
    Query(params): Query<EligibilityQuery>,
) -> Result<Json<Value>, AppError> {
    let date = params
        .date
        .as_deref()
        .map(CalendarDate::parse_leading)
        .transpose()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    debug!("Eligibility check for patient {} on {:?}", patient_id, date);

    let eligibility = state.booking_service().check_eligibility(patient_id, date).await?;
    Ok(Json(json!(eligibility)))
}

#[axum::debug_handler]
pub async fn check_appointment_conflicts(
    State(state): State<AppointmentCellState>,
    Query(params): Query<ConflictCheckQuery>,
) -> Result<Json<Value>, AppError> {
    let conflict_response = state
        .booking_service()
        .check_conflicts(ConflictCheckRequest {
            clinician_id: params.clinician_id,
            start_time: params.start_time,
            end_time: params.end_time,
            exclude_appointment_id: params.exclude_appointment_id,
        })
        .await?;

    Ok(Json(json!(conflict_response)))
}

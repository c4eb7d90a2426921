// libs/appointment-cell/src/router.rs
use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::handlers;
use crate::state::AppointmentCellState;

pub fn appointment_routes(state: AppointmentCellState) -> Router {
    Router::new()
        .route("/", post(handlers::create_appointment))
        .route(
            "/{appointment_id}",
            get(handlers::get_appointment)
                .put(handlers::update_appointment)
                .delete(handlers::delete_appointment),
        )
        .route("/{appointment_id}/payment", patch(handlers::update_payment))
        .route("/{appointment_id}/ledger", get(handlers::get_appointment_ledger))

        // Utility endpoints
        .route("/eligibility/{patient_id}", get(handlers::check_free_return_eligibility))
        .route("/conflicts/check", get(handlers::check_appointment_conflicts))
        .with_state(state)
}

use axum::{
    Router,
    routing::get,
};

use appointment_cell::{appointment_routes, AppointmentCellState};

pub fn create_router(state: AppointmentCellState) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic ledger API is running!" }))
        .nest("/appointments", appointment_routes(state))
}

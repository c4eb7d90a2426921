pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod state;
pub mod store;

#[cfg(test)]
mod test_support;

pub use router::appointment_routes;
pub use state::AppointmentCellState;

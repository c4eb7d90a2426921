pub mod booking;
pub mod conflict;
pub mod deletion;
pub mod eligibility;
pub mod ledger;
pub mod lifecycle;
pub mod revenue;
pub mod schedule;

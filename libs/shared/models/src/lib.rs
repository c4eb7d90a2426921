pub mod calendar;
pub mod error;

pub use calendar::CalendarDate;

use chrono::Weekday;
use tracing::{debug, warn};

use shared_config::{default_open_days, ClinicPolicyConfig};
use shared_models::CalendarDate;

use crate::models::{AppointmentError, SessionType};

/// Weekday rule for in-person sessions. Online sessions may fall on any day.
#[derive(Debug, Clone)]
pub struct SchedulePolicy {
    open_days: Vec<Weekday>,
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self { open_days: default_open_days() }
    }
}

impl SchedulePolicy {
    pub fn new(open_days: Vec<Weekday>) -> Self {
        Self { open_days }
    }

    pub fn from_config(config: &ClinicPolicyConfig) -> Self {
        Self::new(config.open_days.clone())
    }

    pub fn is_open_day(&self, date: CalendarDate) -> bool {
        self.open_days.contains(&date.weekday())
    }

    pub fn is_permitted(&self, session_type: SessionType, date: CalendarDate) -> bool {
        match session_type {
            SessionType::Online => true,
            SessionType::InClinic => self.is_open_day(date),
        }
    }

    pub fn ensure_permitted(&self, session_type: SessionType, date: CalendarDate) -> Result<(), AppointmentError> {
        debug!("Checking {} session on {} ({})", session_type, date, date.weekday());

        if self.is_permitted(session_type, date) {
            return Ok(());
        }

        warn!("Rejected {} session on closed day {} ({})", session_type, date, date.weekday());
        Err(AppointmentError::ScheduleViolation {
            date,
            weekday: date.weekday().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn oct(day: u32) -> CalendarDate {
        CalendarDate::from_ymd(2026, 10, day).unwrap()
    }

    #[test]
    fn in_clinic_only_on_open_days() {
        let policy = SchedulePolicy::default();

        for day in 12..=15 {
            assert!(policy.is_permitted(SessionType::InClinic, oct(day)), "day {}", day);
        }
        for day in 16..=18 {
            assert!(!policy.is_permitted(SessionType::InClinic, oct(day)), "day {}", day);
        }
    }

    #[test]
    fn online_is_unrestricted() {
        let policy = SchedulePolicy::default();
        for day in 12..=18 {
            assert!(policy.is_permitted(SessionType::Online, oct(day)));
        }
    }

    #[test]
    fn violation_names_the_weekday() {
        let policy = SchedulePolicy::default();

        assert_matches!(
            policy.ensure_permitted(SessionType::InClinic, oct(16)),
            Err(AppointmentError::ScheduleViolation { weekday, date }) if weekday == "Fri" && date == oct(16)
        );
    }

    #[test]
    fn weekday_comes_from_the_date_string_not_a_timezone_shift() {
        let policy = SchedulePolicy::default();
        // Late evening on a Thursday stays a Thursday.
        let thursday_night: CalendarDate = "2026-10-15T23:30:00+02:00".parse().unwrap();
        policy.ensure_permitted(SessionType::InClinic, thursday_night).unwrap();
    }

    #[test]
    fn custom_open_days() {
        let policy = SchedulePolicy::new(vec![Weekday::Tue, Weekday::Wed, Weekday::Fri, Weekday::Sat]);
        assert!(!policy.is_open_day(oct(12)));
        assert!(policy.is_open_day(oct(16)));
    }
}

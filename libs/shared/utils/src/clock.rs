use chrono::{DateTime, Local, NaiveDateTime, Utc};

use shared_models::CalendarDate;

/// Source of "now" for the scheduling core.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Today's date on the clinic's local calendar.
    fn today(&self) -> CalendarDate;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> CalendarDate {
        CalendarDate::from(Local::now().date_naive())
    }
}

/// Clock pinned to a local wall-clock instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    local: NaiveDateTime,
}

impl FixedClock {
    pub fn at(local: NaiveDateTime) -> Self {
        Self { local }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.local.and_utc()
    }

    fn today(&self) -> CalendarDate {
        CalendarDate::from(self.local)
    }
}

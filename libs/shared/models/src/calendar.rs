//! Calendar dates without time of day or timezone.
//!
//! Weekday checks and day-difference arithmetic go through [`CalendarDate`]
//! so that a timestamp is never shifted across midnight by a UTC conversion.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid calendar date '{0}', expected YYYY-MM-DD")]
pub struct CalendarDateError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalendarDate(NaiveDate);

impl CalendarDate {
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Result<Self, CalendarDateError> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(Self)
            .ok_or_else(|| CalendarDateError(format!("{:04}-{:02}-{:02}", year, month, day)))
    }

    /// Parse the leading `YYYY-MM-DD` of a date or timestamp string. Anything
    /// after the date (time of day, offset) is ignored, never converted.
    pub fn parse_leading(input: &str) -> Result<Self, CalendarDateError> {
        let invalid = || CalendarDateError(input.to_string());
        let head = input.trim().get(..10).ok_or_else(invalid)?;

        // chrono accepts signed and short fields, the wire format does not.
        let well_formed = head
            .bytes()
            .enumerate()
            .all(|(i, b)| if i == 4 || i == 7 { b == b'-' } else { b.is_ascii_digit() });
        if !well_formed {
            return Err(invalid());
        }

        NaiveDate::parse_from_str(head, "%Y-%m-%d")
            .map(Self)
            .map_err(|_| invalid())
    }

    pub fn weekday(&self) -> Weekday {
        self.0.weekday()
    }

    /// Whole calendar days from `earlier` to `self`. Negative when `earlier`
    /// is actually later.
    pub fn days_since(&self, earlier: CalendarDate) -> i64 {
        self.0.signed_duration_since(earlier.0).num_days()
    }

    pub fn as_naive(&self) -> NaiveDate {
        self.0
    }
}

impl From<NaiveDate> for CalendarDate {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl From<NaiveDateTime> for CalendarDate {
    fn from(timestamp: NaiveDateTime) -> Self {
        Self(timestamp.date())
    }
}

impl FromStr for CalendarDate {
    type Err = CalendarDateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_leading(s)
    }
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

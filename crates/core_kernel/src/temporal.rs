//! Reporting periods
//!
//! Analytics and reconciliation work on whole calendar days in UTC. A
//! `DateRange` is inclusive on both ends at the date level and converts to a
//! half-open `[start, end)` instant range for querying gateway records.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors related to temporal operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemporalError {
    #[error("Invalid period: start {start} must not be after end {end}")]
    InvalidPeriod {
        start: String,
        end: String,
    },

    #[error("Date out of supported range: {0}")]
    OutOfRange(String),
}

/// An inclusive range of calendar dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Creates a new range, rejecting start > end
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, TemporalError> {
        if start > end {
            return Err(TemporalError::InvalidPeriod {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// A range covering exactly one day
    pub fn single_day(date: NaiveDate) -> Self {
        Self { start: date, end: date }
    }

    /// First instant of the range (00:00 UTC on `start`)
    pub fn starts_at(&self) -> DateTime<Utc> {
        self.start.and_time(NaiveTime::MIN).and_utc()
    }

    /// First instant after the range (00:00 UTC on the day after `end`)
    pub fn ends_before(&self) -> Result<DateTime<Utc>, TemporalError> {
        self.end
            .checked_add_days(Days::new(1))
            .map(|d| d.and_time(NaiveTime::MIN).and_utc())
            .ok_or_else(|| TemporalError::OutOfRange(self.end.to_string()))
    }

    /// Returns true if the instant falls inside the range
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        let date = instant.date_naive();
        date >= self.start && date <= self.end
    }

    /// Number of days covered, counting both ends
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

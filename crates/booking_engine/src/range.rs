use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::BookingError;

/// A half-open date interval `[start, end)` at day granularity.
///
/// The half-open convention means a checkout date equal to another range's
/// check-in date is not a conflict. Callers normalize to a single canonical
/// timezone before constructing a range; no timezone arithmetic happens here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// First occupied date (check-in)
    pub start: NaiveDate,
    /// First date past the stay (check-out, exclusive)
    pub end: NaiveDate,
}

impl DateRange {
    /// Builds a range, rejecting empty or inverted intervals.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, BookingError> {
        if start >= end {
            return Err(BookingError::Validation(
                "check-out date must be after check-in date".to_string(),
            ));
        }
        Ok(Self { start, end })
    }

    /// True when two ranges share at least one occupied night.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// True when `date` falls inside the range (check-out date excluded).
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }

    /// Number of nights covered by the range.
    pub fn nights(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

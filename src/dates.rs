//! Month-end calendar arithmetic
//!
//! Every date the engine touches is normalised to a month-end ordinal
//! (months since 0001-01). Scenario lookups, remaining-life indices and
//! forecast stepping all reduce to integer arithmetic on this ordinal,
//! which removes calendar edge cases from the hot loop.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// A calendar month identified by its ordinal (`year * 12 + month0`).
///
/// Two `MonthEnd`s subtract to a whole number of months; adding an integer
/// steps forward through month ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MonthEnd(i32);

impl MonthEnd {
    /// Normalise any calendar date to its month end.
    pub fn from_date(date: NaiveDate) -> Self {
        MonthEnd(date.year() * 12 + date.month0() as i32)
    }

    /// Build from a calendar year and 1-based month.
    pub fn from_ym(year: i32, month: u32) -> Self {
        MonthEnd(year * 12 + month as i32 - 1)
    }

    pub fn year(&self) -> i32 {
        self.0.div_euclid(12)
    }

    /// 1-based calendar month.
    pub fn month(&self) -> u32 {
        self.0.rem_euclid(12) as u32 + 1
    }

    pub fn ordinal(&self) -> i32 {
        self.0
    }

    /// The last calendar day of the month.
    pub fn to_date(&self) -> NaiveDate {
        let (ny, nm) = if self.month() == 12 {
            (self.year() + 1, 1)
        } else {
            (self.year(), self.month() + 1)
        };
        // First of next month always exists; month end is the day before.
        NaiveDate::from_ymd_opt(ny, nm, 1)
            .and_then(|d| d.pred_opt())
            .unwrap_or(NaiveDate::MIN)
    }

    /// Whole months from `self` to `other` (positive when `other` is later).
    pub fn months_until(&self, other: MonthEnd) -> i32 {
        other.0 - self.0
    }
}

impl Add<i32> for MonthEnd {
    type Output = MonthEnd;

    fn add(self, months: i32) -> MonthEnd {
        MonthEnd(self.0 + months)
    }
}

impl Sub<MonthEnd> for MonthEnd {
    type Output = i32;

    fn sub(self, other: MonthEnd) -> i32 {
        self.0 - other.0
    }
}

impl fmt::Display for MonthEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_date().format("%Y-%m-%d"))
    }
}

/// Parse a `YYYY-MM-DD` date string to its month end.
pub fn parse_month_end(s: &str) -> Option<MonthEnd> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .ok()
        .map(MonthEnd::from_date)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_end_normalisation() {
        let a = MonthEnd::from_date(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        let b = MonthEnd::from_date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(a, b);
        assert_eq!(a.to_date(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }

    #[test]
    fn test_month_arithmetic() {
        let origination = MonthEnd::from_ym(2020, 6);
        let reporting = MonthEnd::from_ym(2023, 6);
        assert_eq!(reporting - origination, 36);
        assert_eq!(origination + 36, reporting);

        // Year roll-over
        assert_eq!(MonthEnd::from_ym(2023, 12) + 1, MonthEnd::from_ym(2024, 1));
    }

    #[test]
    fn test_display_is_month_end() {
        assert_eq!(MonthEnd::from_ym(2024, 12).to_string(), "2024-12-31");
        assert_eq!(MonthEnd::from_ym(2023, 4).to_string(), "2023-04-30");
    }

    #[test]
    fn test_parse() {
        assert_eq!(parse_month_end("2024-03-15"), Some(MonthEnd::from_ym(2024, 3)));
        assert_eq!(parse_month_end("not-a-date"), None);
    }
}

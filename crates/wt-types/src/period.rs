use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A labeled, inclusive span of calendar days used to window backtests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimePeriod {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub label: String,
}

impl TimePeriod {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate, label: impl Into<String>) -> Self {
        Self {
            start_date,
            end_date,
            label: label.into(),
        }
    }

    /// Span length in days (inclusive endpoints, so a one-day period
    /// returns 0)
    pub fn days(&self) -> i64 {
        (self.end_date - self.start_date).num_days()
    }

    pub fn is_valid(&self) -> bool {
        self.start_date <= self.end_date
    }

    /// True when the two spans share at least one calendar day
    pub fn overlaps(&self, other: &TimePeriod) -> bool {
        self.start_date <= other.end_date && other.start_date <= self.end_date
    }
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{} .. {}]", self.label, self.start_date, self.end_date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_days() {
        let period = TimePeriod::new(date(2024, 1, 1), date(2024, 1, 31), "january");
        assert_eq!(period.days(), 30);
        assert!(period.is_valid());
    }

    #[test]
    fn test_invalid_when_reversed() {
        let period = TimePeriod::new(date(2024, 2, 1), date(2024, 1, 1), "backwards");
        assert!(!period.is_valid());
    }

    #[test]
    fn test_overlap_disjoint() {
        let a = TimePeriod::new(date(2024, 1, 1), date(2024, 1, 31), "a");
        let b = TimePeriod::new(date(2024, 2, 1), date(2024, 2, 28), "b");
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
    }

    #[test]
    fn test_overlap_shared_endpoint() {
        let a = TimePeriod::new(date(2024, 1, 1), date(2024, 1, 31), "a");
        let b = TimePeriod::new(date(2024, 1, 31), date(2024, 2, 28), "b");
        assert!(a.overlaps(&b));
    }

    #[test]
    fn test_overlap_nested() {
        let outer = TimePeriod::new(date(2024, 1, 1), date(2024, 12, 31), "outer");
        let inner = TimePeriod::new(date(2024, 6, 1), date(2024, 6, 30), "inner");
        assert!(outer.overlaps(&inner));
        assert!(inner.overlaps(&outer));
    }
}

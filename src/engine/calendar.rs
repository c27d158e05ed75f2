//! Valid-expiration calendar.
//!
//! The methodology only admits expirations on a fixed weekday (Friday for
//! SPX). The calendar is an explicit value object with a defined coverage
//! range: callers construct it for the span they operate over and extend it
//! when the data outgrows it, instead of relying on a hardcoded set.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate, Weekday};

/// Precomputed set of valid expiration dates over a coverage span.
#[derive(Debug, Clone)]
pub struct ExpirationCalendar {
    weekday: Weekday,
    start: NaiveDate,
    end: NaiveDate,
    valid: BTreeSet<NaiveDate>,
}

impl ExpirationCalendar {
    /// All Fridays in `[start_year, end_year]` inclusive.
    pub fn fridays(start_year: i32, end_year: i32) -> Self {
        Self::for_weekday(Weekday::Fri, start_year, end_year)
    }

    /// All dates landing on `weekday` in `[start_year, end_year]` inclusive.
    pub fn for_weekday(weekday: Weekday, start_year: i32, end_year: i32) -> Self {
        let start = NaiveDate::from_ymd_opt(start_year, 1, 1)
            .unwrap_or(NaiveDate::MIN);
        let end = NaiveDate::from_ymd_opt(end_year, 12, 31).unwrap_or(NaiveDate::MAX);

        let mut valid = BTreeSet::new();
        let mut day = start;
        while day.weekday() != weekday && day <= end {
            day = day.succ_opt().unwrap_or(end);
        }
        while day <= end {
            valid.insert(day);
            match day.checked_add_days(chrono::Days::new(7)) {
                Some(next) => day = next,
                None => break,
            }
        }

        Self {
            weekday,
            start,
            end,
            valid,
        }
    }

    /// Whether `date` is a valid expiration. Dates outside the coverage
    /// span are never valid; callers should size the calendar to their data.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.valid.contains(&date)
    }

    /// Inclusive coverage span.
    pub fn coverage(&self) -> (NaiveDate, NaiveDate) {
        (self.start, self.end)
    }

    /// Whether `date` lies within the coverage span.
    pub fn covers(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    pub fn weekday(&self) -> Weekday {
        self.weekday
    }

    pub fn len(&self) -> usize {
        self.valid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.valid.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fridays_membership() {
        let cal = ExpirationCalendar::fridays(2020, 2021);

        // 2020-03-20 and 2020-07-17 were Fridays
        assert!(cal.contains(NaiveDate::from_ymd_opt(2020, 3, 20).unwrap()));
        assert!(cal.contains(NaiveDate::from_ymd_opt(2020, 7, 17).unwrap()));
        // 2020-03-19 was a Thursday
        assert!(!cal.contains(NaiveDate::from_ymd_opt(2020, 3, 19).unwrap()));
        // Friday outside coverage
        assert!(!cal.contains(NaiveDate::from_ymd_opt(2022, 1, 7).unwrap()));
    }

    #[test]
    fn test_coverage_span() {
        let cal = ExpirationCalendar::fridays(2018, 2025);
        let (start, end) = cal.coverage();
        assert_eq!(start, NaiveDate::from_ymd_opt(2018, 1, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());
        assert!(cal.covers(NaiveDate::from_ymd_opt(2020, 3, 24).unwrap()));
        assert!(!cal.covers(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()));
    }

    #[test]
    fn test_friday_count_per_year() {
        let cal = ExpirationCalendar::fridays(2021, 2021);
        // 2021 had 53 Fridays (Jan 1 and Dec 31 were both Fridays)
        assert_eq!(cal.len(), 53);
    }

    #[test]
    fn test_alternate_weekday() {
        let cal = ExpirationCalendar::for_weekday(Weekday::Wed, 2020, 2020);
        assert!(cal.contains(NaiveDate::from_ymd_opt(2020, 7, 15).unwrap()));
        assert!(!cal.contains(NaiveDate::from_ymd_opt(2020, 7, 17).unwrap()));
    }
}

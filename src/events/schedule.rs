// Date and time handling for events; the clock is always passed in
use chrono::{Datelike, Months, NaiveDate, NaiveTime};

use crate::db::models::Event;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(value, "%d.%m.%Y"))
        .ok()
}

pub fn parse_time(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .ok()
}

/// Typed view of an event row's schedule columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub start_date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_date: Option<NaiveDate>,
    pub end_time: Option<NaiveTime>,
}

impl Schedule {
    pub fn of(event: &Event) -> Option<Self> {
        Some(Self {
            start_date: parse_date(&event.start_date)?,
            start_time: event.start_time.as_deref().and_then(parse_time),
            end_date: event.end_date.as_deref().and_then(parse_date),
            end_time: event.end_time.as_deref().and_then(parse_time),
        })
    }

    /// True once the start day has passed; the start day itself is not over.
    pub fn is_over(&self, today: NaiveDate) -> bool {
        self.start_date < today
    }

    pub fn all_day(&self) -> bool {
        self.start_time.is_none() && self.end_time.is_none()
    }

    /// Whole days until the start day, `None` on the day itself or after.
    pub fn days_until(&self, today: NaiveDate) -> Option<i64> {
        let days = (self.start_date - today).num_days();
        (days > 0).then_some(days)
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(end) = self.end_date {
            if end < self.start_date {
                return Err("Enddatum liegt vor dem Startdatum.".to_string());
            }
        }
        Ok(())
    }
}

/// Past events are listed back to this date (exclusive).
pub fn past_cutoff(today: NaiveDate) -> NaiveDate {
    today
        .checked_sub_months(Months::new(24))
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(today.year() - 2, 1, 1).unwrap_or(today))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn schedule(start: NaiveDate) -> Schedule {
        Schedule {
            start_date: start,
            start_time: None,
            end_date: None,
            end_time: None,
        }
    }

    #[test]
    fn start_day_is_not_over() {
        let today = date(2024, 6, 10);
        assert!(!schedule(today).is_over(today));
        assert!(schedule(date(2024, 6, 9)).is_over(today));
    }

    #[test]
    fn days_until_is_positive_or_none() {
        let today = date(2024, 6, 10);
        assert_eq!(schedule(date(2024, 6, 13)).days_until(today), Some(3));
        assert_eq!(schedule(today).days_until(today), None);
        assert_eq!(schedule(date(2024, 6, 1)).days_until(today), None);
    }

    #[test]
    fn all_day_without_times() {
        let mut s = schedule(date(2024, 6, 10));
        assert!(s.all_day());
        s.end_time = parse_time("18:00");
        assert!(!s.all_day());
    }

    #[test]
    fn parses_iso_and_swiss_dates() {
        assert_eq!(parse_date("2024-06-10"), Some(date(2024, 6, 10)));
        assert_eq!(parse_date("10.06.2024"), Some(date(2024, 6, 10)));
        assert_eq!(parse_date("June"), None);
        assert_eq!(parse_time("09:30"), NaiveTime::from_hms_opt(9, 30, 0));
        assert_eq!(parse_time("09:30:15"), NaiveTime::from_hms_opt(9, 30, 15));
    }

    #[test]
    fn end_before_start_is_invalid() {
        let mut s = schedule(date(2024, 6, 10));
        s.end_date = Some(date(2024, 6, 9));
        assert!(s.validate().is_err());
        s.end_date = Some(date(2024, 6, 10));
        assert!(s.validate().is_ok());
    }

    #[test]
    fn past_cutoff_is_two_years_back() {
        assert_eq!(past_cutoff(date(2024, 2, 29)), date(2022, 2, 28));
        assert_eq!(past_cutoff(date(2024, 6, 10)), date(2022, 6, 10));
    }
}

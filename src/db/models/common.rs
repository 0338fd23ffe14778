//! Common types and utilities shared across models.

use chrono::{NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Deserializer, Serialize};

/// Day of the week an availability window recurs on
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Day {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Day {
    /// The canonical week, Monday first
    pub const ALL: [Day; 7] = [
        Day::Monday,
        Day::Tuesday,
        Day::Wednesday,
        Day::Thursday,
        Day::Friday,
        Day::Saturday,
        Day::Sunday,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monday => "monday",
            Self::Tuesday => "tuesday",
            Self::Wednesday => "wednesday",
            Self::Thursday => "thursday",
            Self::Friday => "friday",
            Self::Saturday => "saturday",
            Self::Sunday => "sunday",
        }
    }

    /// Day a calendar date falls on
    pub fn of_date(date: NaiveDate) -> Self {
        use chrono::Datelike;

        match date.weekday() {
            Weekday::Mon => Self::Monday,
            Weekday::Tue => Self::Tuesday,
            Weekday::Wed => Self::Wednesday,
            Weekday::Thu => Self::Thursday,
            Weekday::Fri => Self::Friday,
            Weekday::Sat => Self::Saturday,
            Weekday::Sun => Self::Sunday,
        }
    }
}

impl std::fmt::Display for Day {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Day {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Day::ALL
            .into_iter()
            .find(|d| d.as_str() == lower)
            .ok_or_else(|| format!("Unknown day: {}", s))
    }
}

/// Parse a `HH:MM` time of day
pub fn parse_time(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    if value.len() != 5 {
        return None;
    }
    NaiveTime::parse_from_str(value, "%H:%M").ok()
}

/// Format a time of day the way it is stored (`HH:MM`)
pub fn format_time(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

/// Parse a `YYYY-MM-DD` calendar date
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

/// Pagination metadata returned alongside a page of results
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pagination {
    pub current_page: u32,
    pub last_page: u32,
    pub per_page: u32,
    pub total: i64,
}

impl Pagination {
    pub fn new(current_page: u32, per_page: u32, total: i64) -> Self {
        let per_page = per_page.max(1);
        let pages = (total.max(0) as u64).div_ceil(per_page as u64);
        Self {
            current_page,
            last_page: pages.max(1) as u32,
            per_page,
            total,
        }
    }

    /// SQL OFFSET for the current page
    pub fn offset(&self) -> i64 {
        (self.current_page.saturating_sub(1) as i64) * self.per_page as i64
    }
}

/// Deserialize an optional query value, treating empty strings as absent
pub fn empty_string_as_none<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(de)?;
    Ok(opt.and_then(|s| {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_round_trips_through_str() {
        for day in Day::ALL {
            assert_eq!(day.as_str().parse::<Day>().unwrap(), day);
        }
        assert_eq!("Monday".parse::<Day>().unwrap(), Day::Monday);
        assert!("funday".parse::<Day>().is_err());
    }

    #[test]
    fn test_day_of_date() {
        // 2026-10-19 is a Monday
        let date = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        assert_eq!(Day::of_date(date), Day::Monday);
        assert_eq!(Day::of_date(date.succ_opt().unwrap()), Day::Tuesday);
    }

    #[test]
    fn test_parse_time_requires_hh_mm() {
        assert_eq!(format_time(parse_time("09:00").unwrap()), "09:00");
        assert!(parse_time("9:00").is_none());
        assert!(parse_time("24:00").is_none());
        assert!(parse_time("09:00:00").is_none());
        assert!(parse_time("").is_none());
    }

    #[test]
    fn test_parse_date() {
        assert!(parse_date("2026-10-19").is_some());
        assert!(parse_date("19/10/2026").is_none());
    }

    #[test]
    fn test_pagination_pages() {
        let p = Pagination::new(1, 10, 0);
        assert_eq!(p.last_page, 1);
        assert_eq!(p.offset(), 0);

        let p = Pagination::new(3, 10, 21);
        assert_eq!(p.last_page, 3);
        assert_eq!(p.offset(), 20);

        let p = Pagination::new(2, 10, 20);
        assert_eq!(p.last_page, 2);
    }
}

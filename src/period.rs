//! Calendar-month periods (`YYYY-MM`).
//!
//! A period is one generation cycle for a recurring template. Periods are
//! totally ordered and support month arithmetic, which is what the recency
//! gap and cadence checks are built on.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(Error::Validation(format!(
                "month must be 1-12, got {month}"
            )));
        }
        if !(1..=9999).contains(&year) {
            return Err(Error::Validation(format!(
                "year must be 1-9999, got {year}"
            )));
        }
        Ok(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn current() -> Self {
        Self::from_date(Utc::now().date_naive())
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// Months elapsed from `earlier` to `self` (negative when `earlier` is later).
    pub fn months_since(&self, earlier: &Period) -> i32 {
        self.index() - earlier.index()
    }

    pub fn add_months(&self, months: i32) -> Period {
        let index = self.index() + months;
        Period {
            year: index.div_euclid(12),
            month: (index.rem_euclid(12) + 1) as u32,
        }
    }

    pub fn next(&self) -> Period {
        self.add_months(1)
    }

    pub fn first_day(&self) -> NaiveDate {
        // Constructor guarantees a valid year/month.
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(&self) -> NaiveDate {
        self.first_day() + chrono::Duration::days(i64::from(self.days_in_month()) - 1)
    }

    pub fn days_in_month(&self) -> u32 {
        let next = self.next();
        let first_next = NaiveDate::from_ymd_opt(next.year, next.month, 1);
        match first_next {
            Some(date) => (date - self.first_day()).num_days() as u32,
            None => 31,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    /// Inclusive range of periods from `self` through `end`.
    pub fn through(&self, end: &Period) -> Vec<Period> {
        let mut periods = Vec::new();
        let mut cursor = *self;
        while cursor <= *end {
            periods.push(cursor);
            cursor = cursor.next();
        }
        periods
    }

    fn index(&self) -> i32 {
        self.year * 12 + (self.month as i32 - 1)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let invalid = || {
            Error::Validation(format!(
                "invalid period '{trimmed}'. Expected YYYY-MM"
            ))
        };

        let (year, month) = trimmed.split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        if !year.chars().all(|c| c.is_ascii_digit()) || !month.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        Period::new(year, month)
    }
}

impl TryFrom<String> for Period {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Period> for String {
    fn from(period: Period) -> Self {
        period.to_string()
    }
}

//! Business-day calendar: weekends plus designated public holidays.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Calendar of non-working days for schedule date rolling.
///
/// Saturdays and Sundays are always non-working; holidays are configured per
/// jurisdiction by the owning business (injected as data).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessCalendar {
    holidays: BTreeSet<NaiveDate>,
}

impl BusinessCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_holidays(holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            holidays: holidays.into_iter().collect(),
        }
    }

    pub fn add_holiday(&mut self, date: NaiveDate) {
        self.holidays.insert(date);
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains(&date)
    }

    pub fn is_business_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.is_holiday(date)
    }

    /// Roll a timestamp forward, one day at a time, until it lands on a
    /// business day. The time of day is preserved.
    pub fn roll_forward(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let mut at = at;
        while !self.is_business_day(at.date_naive()) {
            // Day addition on UTC timestamps cannot fail within chrono's range.
            at = at
                .checked_add_days(Days::new(1))
                .expect("date out of chrono range");
        }
        at
    }
}

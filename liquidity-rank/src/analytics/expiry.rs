//! Target expiry window resolution.
//!
//! Monthly equity options expire on the third Friday of the month. The run
//! targets next month's cycle and accepts expirations within two days of
//! that Friday, which absorbs holiday-shifted Thursday expirations.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Days accepted on either side of the third Friday.
pub const WINDOW_HALF_WIDTH_DAYS: i64 = 2;

/// Closed date interval around next month's standard expiration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryWindow {
    /// Third Friday of the target month.
    pub third_friday: NaiveDate,
    /// First accepted expiration date.
    pub from_date: NaiveDate,
    /// Last accepted expiration date.
    pub to_date: NaiveDate,
}

impl ExpiryWindow {
    /// Resolve the window for the month following `today`.
    pub fn for_date(today: NaiveDate) -> Self {
        let (year, month) = if today.month() == 12 {
            (today.year() + 1, 1)
        } else {
            (today.year(), today.month() + 1)
        };
        let first_of_month = NaiveDate::from_ymd_opt(year, month, 1)
            .expect("first day of a month is always a valid date");

        let third_friday = third_friday_from(first_of_month);

        Self {
            third_friday,
            from_date: third_friday - Duration::days(WINDOW_HALF_WIDTH_DAYS),
            to_date: third_friday + Duration::days(WINDOW_HALF_WIDTH_DAYS),
        }
    }

    /// Whether `date` falls inside the window (inclusive).
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.from_date && date <= self.to_date
    }

    /// Expiry month passed to the chain provider.
    pub fn month(&self) -> u32 {
        self.third_friday.month()
    }

    /// Expiry year passed to the chain provider.
    pub fn year(&self) -> i32 {
        self.third_friday.year()
    }
}

/// Third Friday of the month starting at `first_of_month`.
fn third_friday_from(first_of_month: NaiveDate) -> NaiveDate {
    // Monday = 0, Friday = 4
    let weekday = first_of_month.weekday().num_days_from_monday() as i64;
    let to_first_friday = (4 - weekday).rem_euclid(7);
    first_of_month + Duration::days(to_first_friday + 14)
}

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// day count convention for interest accrual
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DayCountConvention {
    /// actual days / 365
    Actual365,
    /// actual days / 360
    Actual360,
    /// 30 days per month / 360 days per year
    Thirty360,
    /// actual days / actual days in year (handles leap years)
    ActualActual,
}

impl Default for DayCountConvention {
    fn default() -> Self {
        DayCountConvention::Actual365
    }
}

impl DayCountConvention {
    /// days between two dates under this convention, zero if `end` precedes `start`
    pub fn days_between(&self, start: NaiveDate, end: NaiveDate) -> u32 {
        match self {
            DayCountConvention::Actual365
            | DayCountConvention::Actual360
            | DayCountConvention::ActualActual => (end - start).num_days().max(0) as u32,
            DayCountConvention::Thirty360 => days_30_360(start, end),
        }
    }

    /// days in the year used as the accrual denominator
    pub fn year_basis(&self, year: i32) -> u32 {
        match self {
            DayCountConvention::Actual365 => 365,
            DayCountConvention::Actual360 | DayCountConvention::Thirty360 => 360,
            DayCountConvention::ActualActual => {
                if is_leap_year(year) {
                    366
                } else {
                    365
                }
            }
        }
    }

    /// nominal basis for a single day when no calendar year is known
    pub fn nominal_basis(&self) -> u32 {
        match self {
            DayCountConvention::Actual360 | DayCountConvention::Thirty360 => 360,
            DayCountConvention::Actual365 | DayCountConvention::ActualActual => 365,
        }
    }

    /// fraction of a year between two dates.
    ///
    /// Actual/Actual splits the range at each january 1st so leap-year days
    /// are weighted by 1/366.
    pub fn year_fraction(&self, start: NaiveDate, end: NaiveDate) -> Decimal {
        if end <= start {
            return Decimal::ZERO;
        }

        match self {
            DayCountConvention::ActualActual => {
                let mut fraction = Decimal::ZERO;
                let mut cursor = start;
                while cursor < end {
                    let next_year = NaiveDate::from_ymd_opt(cursor.year() + 1, 1, 1).unwrap_or(end);
                    let segment_end = next_year.min(end);
                    let days = (segment_end - cursor).num_days();
                    fraction += Decimal::from(days) / Decimal::from(self.year_basis(cursor.year()));
                    cursor = segment_end;
                }
                fraction
            }
            _ => Decimal::from(self.days_between(start, end)) / Decimal::from(self.year_basis(start.year())),
        }
    }
}

/// 30/360 day count between two dates
fn days_30_360(start: NaiveDate, end: NaiveDate) -> u32 {
    let y1 = start.year();
    let y2 = end.year();
    let m1 = start.month() as i32;
    let m2 = end.month() as i32;
    let d1 = start.day().min(30) as i32;
    let d2 = if d1 == 30 { end.day().min(30) as i32 } else { end.day() as i32 };

    let days = 360 * (y2 - y1) + 30 * (m2 - m1) + (d2 - d1);
    days.max(0) as u32
}

pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

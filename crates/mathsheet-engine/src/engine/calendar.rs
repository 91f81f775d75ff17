//! Calendar-aware date arithmetic.
//!
//! Fixed-length spans (seconds up to weeks) are plain [`TimeDelta`]s.
//! Months and years are a [`Period`], which is applied to a date by moving
//! the month field and clamping the day to the end of the target month.

use chrono::{Months, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A span of whole calendar months.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    pub months: i64,
}

impl Period {
    pub fn months(n: i64) -> Period {
        Period { months: n }
    }

    pub fn years(n: i64) -> Option<Period> {
        n.checked_mul(12).map(Period::months)
    }

    pub fn checked_add(&self, other: &Period) -> Option<Period> {
        self.months.checked_add(other.months).map(Period::months)
    }

    pub fn checked_mul(&self, factor: i64) -> Option<Period> {
        self.months.checked_mul(factor).map(Period::months)
    }
}

impl std::ops::Neg for Period {
    type Output = Period;

    fn neg(self) -> Period {
        Period {
            months: -self.months,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.months < 0 { "-" } else { "" };
        let total = self.months.unsigned_abs();
        let (years, months) = (total / 12, total % 12);
        let plural = |n: u64| if n == 1 { "" } else { "s" };
        match (years, months) {
            (0, m) => write!(f, "{}{} month{}", sign, m, plural(m)),
            (y, 0) => write!(f, "{}{} year{}", sign, y, plural(y)),
            (y, m) => write!(f, "{}{} year{}, {} month{}", sign, y, plural(y), m, plural(m)),
        }
    }
}

/// Shift a date by a period, clamping to the last day of the target month.
pub fn add_period(date: NaiveDate, period: Period) -> Option<NaiveDate> {
    let magnitude = Months::new(u32::try_from(period.months.unsigned_abs()).ok()?);
    if period.months >= 0 {
        date.checked_add_months(magnitude)
    } else {
        date.checked_sub_months(magnitude)
    }
}

pub fn add_period_datetime(datetime: NaiveDateTime, period: Period) -> Option<NaiveDateTime> {
    let date = add_period(datetime.date(), period)?;
    Some(date.and_time(datetime.time()))
}

/// Duration constructor shared by the `seconds(..)`..`weeks(..)` built-ins.
pub fn duration_from_seconds(seconds: f64) -> Option<TimeDelta> {
    if !seconds.is_finite() {
        return None;
    }
    let millis = (seconds * 1000.0).round();
    if millis.abs() >= i64::MAX as f64 {
        return None;
    }
    TimeDelta::try_milliseconds(millis as i64)
}

/// Python-style `timedelta` text: `1 day, 2:03:04`, `-1 day, 23:59:59`,
/// `0:00:01.500000`.
pub fn format_duration(delta: TimeDelta) -> String {
    let total_micros = delta
        .num_microseconds()
        .map(i128::from)
        .unwrap_or_else(|| delta.num_milliseconds() as i128 * 1000);
    let micros_per_day: i128 = 86_400 * 1_000_000;
    let days = total_micros.div_euclid(micros_per_day);
    let rest = total_micros.rem_euclid(micros_per_day);
    let seconds = rest / 1_000_000;
    let micros = rest % 1_000_000;

    let mut out = String::new();
    if days != 0 {
        let plural = if days.abs() == 1 { "" } else { "s" };
        out.push_str(&format!("{} day{}, ", days, plural));
    }
    out.push_str(&format!(
        "{}:{:02}:{:02}",
        seconds / 3600,
        (seconds / 60) % 60,
        seconds % 60
    ));
    if micros != 0 {
        out.push_str(&format!(".{:06}", micros));
    }
    out
}

/// Render a date-time, dropping a midnight time of day.
pub fn format_datetime(datetime: NaiveDateTime) -> String {
    if datetime.time() == NaiveTime::MIN {
        return datetime.date().format("%Y-%m-%d").to_string();
    }
    if datetime.nanosecond() == 0 {
        datetime.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        datetime.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
    }
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_month_end_clamping() {
        assert_eq!(add_period(date(2024, 1, 31), Period::months(1)), Some(date(2024, 2, 29)));
        assert_eq!(add_period(date(2023, 1, 31), Period::months(1)), Some(date(2023, 2, 28)));
        assert_eq!(add_period(date(2024, 3, 31), Period::months(-1)), Some(date(2024, 2, 29)));
        assert_eq!(
            add_period(date(2024, 2, 29), Period::years(1).unwrap()),
            Some(date(2025, 2, 28))
        );
    }

    #[test]
    fn test_format_duration_like_timedelta() {
        assert_eq!(format_duration(TimeDelta::try_days(1).unwrap()), "1 day, 0:00:00");
        assert_eq!(format_duration(TimeDelta::try_hours(26).unwrap()), "1 day, 2:00:00");
        assert_eq!(format_duration(TimeDelta::try_seconds(-1).unwrap()), "-1 day, 23:59:59");
        assert_eq!(format_duration(TimeDelta::try_milliseconds(1500).unwrap()), "0:00:01.500000");
        assert_eq!(format_duration(TimeDelta::try_weeks(2).unwrap()), "14 days, 0:00:00");
    }

    #[test]
    fn test_format_datetime_drops_midnight() {
        let midnight = date(2024, 5, 1).and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(format_datetime(midnight), "2024-05-01");
        let afternoon = date(2024, 5, 1).and_hms_opt(14, 30, 5).unwrap();
        assert_eq!(format_datetime(afternoon), "2024-05-01 14:30:05");
    }

    #[test]
    fn test_period_display() {
        assert_eq!(Period::months(1).to_string(), "1 month");
        assert_eq!(Period::months(14).to_string(), "1 year, 2 months");
        assert_eq!(Period::years(2).unwrap().to_string(), "2 years");
        assert_eq!((-Period::months(3)).to_string(), "-3 months");
    }

    #[test]
    fn test_duration_from_seconds() {
        assert_eq!(duration_from_seconds(90.0), TimeDelta::try_seconds(90));
        assert_eq!(duration_from_seconds(f64::INFINITY), None);
    }
}

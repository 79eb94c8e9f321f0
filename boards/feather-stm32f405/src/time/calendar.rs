//! Unix seconds to/from RTC calendar fields, UTC only
//!
//! Howard Hinnant's civil_from_days and days_from_civil, O(1) in the date.
//! Reference: http://howardhinnant.github.io/date_algorithms.html

use embassy_stm32::rtc::{DateTime, DayOfWeek};

const SECONDS_PER_DAY: u32 = 86_400;

/// Days from 0000-03-01 to 1970-01-01
const EPOCH_SHIFT: i64 = 719_468;

/// Calendar conversion failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum CalendarError {
    /// Date before the epoch or past the RTC's two-digit year range
    OutOfRange,
}

#[cfg(test)]
pub(crate) fn is_leap_year(year: u16) -> bool {
    (year.is_multiple_of(4) && !year.is_multiple_of(100)) || year.is_multiple_of(400)
}

/// Build an RTC date for `unix_secs`
pub fn unix_to_datetime(unix_secs: u32) -> Result<DateTime, CalendarError> {
    let days = unix_secs / SECONDS_PER_DAY;
    let secs_today = unix_secs % SECONDS_PER_DAY;

    let (year, month, day) = civil_from_days(days);
    DateTime::from(
        year,
        month,
        day,
        weekday(days),
        (secs_today / 3600) as u8,
        ((secs_today % 3600) / 60) as u8,
        (secs_today % 60) as u8,
        0,
    )
    .map_err(|_| CalendarError::OutOfRange)
}

/// Seconds since the epoch for an RTC date
pub fn datetime_to_unix(dt: &DateTime) -> Result<u32, CalendarError> {
    let days = days_from_civil(dt.year(), dt.month(), dt.day());
    let secs = days * i64::from(SECONDS_PER_DAY)
        + i64::from(dt.hour()) * 3600
        + i64::from(dt.minute()) * 60
        + i64::from(dt.second());
    u32::try_from(secs).map_err(|_| CalendarError::OutOfRange)
}

/// 1970-01-01 was a Thursday
fn weekday(days_since_epoch: u32) -> DayOfWeek {
    match (days_since_epoch + 3) % 7 {
        0 => DayOfWeek::Monday,
        1 => DayOfWeek::Tuesday,
        2 => DayOfWeek::Wednesday,
        3 => DayOfWeek::Thursday,
        4 => DayOfWeek::Friday,
        5 => DayOfWeek::Saturday,
        _ => DayOfWeek::Sunday,
    }
}

fn civil_from_days(days_since_epoch: u32) -> (u16, u8, u8) {
    // The year starts on March 1 so the leap day falls at its end
    let z = i64::from(days_since_epoch) + EPOCH_SHIFT;
    let era = z / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;

    let day = (doy - (153 * mp + 2) / 5 + 1) as u8;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u8;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year as u16, month, day)
}

fn days_from_civil(year: u16, month: u8, day: u8) -> i64 {
    let (y, m) = if month <= 2 {
        (i64::from(year) - 1, i64::from(month) + 9)
    } else {
        (i64::from(year), i64::from(month) - 3)
    };
    let era = y.div_euclid(400);
    let yoe = y - era * 400;
    let doy = (153 * m + 2) / 5 + i64::from(day) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - EPOCH_SHIFT
}

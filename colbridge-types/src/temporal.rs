//! Date, time and timestamp values.
//!
//! Engine timestamps are kept as epoch seconds plus nanoseconds so every
//! supported precision (0 through 9 fractional digits) is exact. Rendering
//! always prints exactly the declared number of fractional digits.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime};

pub const NANOS_PER_SECOND: u32 = 1_000_000_000;
pub const NANOS_PER_MILLI: u32 = 1_000_000;
pub const NANOS_PER_DAY: i64 = 86_400 * NANOS_PER_SECOND as i64;

/// Timestamp without time zone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    seconds: i64,
    nanos: u32,
}

impl Timestamp {
    /// Build from epoch seconds and a nanosecond adjustment; whole seconds in
    /// `nanos` are carried into `seconds`.
    pub fn new(seconds: i64, nanos: u32) -> Self {
        Self {
            seconds: seconds + (nanos / NANOS_PER_SECOND) as i64,
            nanos: nanos % NANOS_PER_SECOND,
        }
    }

    pub fn from_epoch_millis(millis: i64) -> Self {
        Self {
            seconds: millis.div_euclid(1_000),
            nanos: millis.rem_euclid(1_000) as u32 * NANOS_PER_MILLI,
        }
    }

    pub fn from_epoch_nanos(nanos: i128) -> Option<Self> {
        let per_second = NANOS_PER_SECOND as i128;
        let seconds = i64::try_from(nanos.div_euclid(per_second)).ok()?;
        Some(Self {
            seconds,
            nanos: nanos.rem_euclid(per_second) as u32,
        })
    }

    /// Interpret a calendar date-time as UTC wall-clock time.
    pub fn from_datetime(datetime: PrimitiveDateTime) -> Self {
        let utc = datetime.assume_utc();
        Self::new(utc.unix_timestamp(), utc.nanosecond())
    }

    pub fn seconds(self) -> i64 {
        self.seconds
    }

    /// Nanoseconds within the second, always below one billion.
    pub fn nanos(self) -> u32 {
        self.nanos
    }

    pub fn epoch_nanos(self) -> i128 {
        self.seconds as i128 * NANOS_PER_SECOND as i128 + self.nanos as i128
    }

    /// Whether the value has no digits beyond `precision` fractional digits.
    pub fn fits_precision(self, precision: u8) -> bool {
        if precision >= 9 {
            return true;
        }
        self.nanos % 10_u32.pow(9 - precision as u32) == 0
    }

    /// Value as a count of `10^-digits` second units since the epoch.
    ///
    /// Returns `None` when digits beyond `digits` would be dropped or the
    /// count overflows `i64`.
    pub fn epoch_units(self, digits: u8) -> Option<i64> {
        if digits > 9 || !self.fits_precision(digits) {
            return None;
        }
        let per_second = 10_i64.pow(digits as u32);
        let fraction = (self.nanos / 10_u32.pow(9 - digits as u32)) as i64;
        self.seconds.checked_mul(per_second)?.checked_add(fraction)
    }

    /// Inverse of [`Timestamp::epoch_units`].
    pub fn from_epoch_units(units: i64, digits: u8) -> Option<Self> {
        if digits > 9 {
            return None;
        }
        let per_second = 10_i64.pow(digits as u32);
        let nanos = units.rem_euclid(per_second) as u32 * 10_u32.pow(9 - digits as u32);
        Some(Self {
            seconds: units.div_euclid(per_second),
            nanos,
        })
    }

    /// Render as `YYYY-MM-DDTHH:MM:SS` followed by exactly `precision`
    /// fractional digits.
    pub fn format(self, precision: u8) -> String {
        let Ok(datetime) = OffsetDateTime::from_unix_timestamp(self.seconds) else {
            return format!("{}.{:09}", self.seconds, self.nanos);
        };
        let date = datetime.date();
        let clock = datetime.time();
        let mut out = format!(
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
            date.year(),
            date.month() as u8,
            date.day(),
            clock.hour(),
            clock.minute(),
            clock.second()
        );
        push_fraction(&mut out, self.nanos, precision);
        out
    }
}

/// Timestamp with time zone: an instant plus the offset it is observed at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimestampTz {
    instant: Timestamp,
    offset_seconds: i32,
}

impl TimestampTz {
    pub fn new(instant: Timestamp, offset_seconds: i32) -> Self {
        Self {
            instant,
            offset_seconds,
        }
    }

    pub fn utc(instant: Timestamp) -> Self {
        Self::new(instant, 0)
    }

    /// The UTC instant.
    pub fn instant(self) -> Timestamp {
        self.instant
    }

    pub fn offset_seconds(self) -> i32 {
        self.offset_seconds
    }

    /// Render the local wall-clock time followed by the zone: `Z[UTC]` for
    /// UTC, otherwise the `+HH:MM` offset.
    pub fn format(self, precision: u8) -> String {
        let local = Timestamp::new(
            self.instant.seconds + self.offset_seconds as i64,
            self.instant.nanos,
        );
        let mut out = local.format(precision);
        if self.offset_seconds == 0 {
            out.push_str("Z[UTC]");
        } else {
            let sign = if self.offset_seconds < 0 { '-' } else { '+' };
            let abs = self.offset_seconds.unsigned_abs();
            let _ = write!(out, "{sign}{:02}:{:02}", abs / 3600, (abs % 3600) / 60);
        }
        out
    }
}

/// Days since 1970-01-01 for a calendar date.
pub fn days_from_date(date: Date) -> i32 {
    date.to_julian_day() - epoch_julian_day()
}

/// Render epoch days as `YYYY-MM-DD`.
pub fn format_date(days: i32) -> String {
    let julian = match epoch_julian_day().checked_add(days) {
        Some(value) => value,
        None => return days.to_string(),
    };

    match Date::from_julian_day(julian) {
        Ok(date) => {
            let (year, month, day) = date.to_calendar_date();
            let month_number = month as u8;
            format!("{:04}-{:02}-{:02}", year, month_number, day)
        }
        Err(_) => days.to_string(),
    }
}

/// Render nanoseconds of day as `HH:MM:SS` plus `precision` fractional digits.
pub fn format_time(nanos_of_day: i64, precision: u8) -> String {
    let nanos_of_day = nanos_of_day.rem_euclid(NANOS_PER_DAY);
    let seconds = nanos_of_day / NANOS_PER_SECOND as i64;
    let mut out = format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    );
    push_fraction(
        &mut out,
        (nanos_of_day % NANOS_PER_SECOND as i64) as u32,
        precision,
    );
    out
}

/// Whether nanoseconds of day carry digits beyond `precision`.
pub fn time_fits_precision(nanos_of_day: i64, precision: u8) -> bool {
    if precision >= 9 {
        return true;
    }
    nanos_of_day % 10_i64.pow(9 - precision as u32) == 0
}

fn push_fraction(out: &mut String, nanos: u32, precision: u8) {
    let precision = precision.min(9) as usize;
    if precision == 0 {
        return;
    }
    let digits = format!("{nanos:09}");
    out.push('.');
    out.push_str(&digits[..precision]);
}

fn epoch_julian_day() -> i32 {
    // 1970-01-01 is a valid calendar date.
    match Date::from_calendar_date(1970, Month::January, 1) {
        Ok(date) => date.to_julian_day(),
        Err(_) => 2_440_588,
    }
}

//! Timestamp conversions used by the filter loop and the exporters.
//!
//! Records carry unix milliseconds; the harmonic models consume time as a
//! fractional year (`2016.5` is mid-2016).

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{KalmanError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateFormat {
    /// Year plus the elapsed fraction of that year.
    FractionalYear,
    /// Milliseconds since the unix epoch.
    UnixMillis,
}

pub fn to_datetime(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
        KalmanError::InvalidParameters(format!("timestamp {} out of range", millis))
    })
}

fn start_of_year(year: i32) -> Result<DateTime<Utc>> {
    Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0)
        .single()
        .ok_or_else(|| KalmanError::InvalidParameters(format!("year {} out of range", year)))
}

/// Fraction of the calendar year elapsed at `millis`, in `[0, 1)`.
pub fn year_fraction(millis: i64) -> Result<f64> {
    let date = to_datetime(millis)?;
    let start = start_of_year(date.year())?;
    let end = start_of_year(date.year() + 1)?;

    let elapsed = (date - start).num_milliseconds() as f64;
    let length = (end - start).num_milliseconds() as f64;
    Ok(elapsed / length)
}

pub fn fractional_year(millis: i64) -> Result<f64> {
    let date = to_datetime(millis)?;
    Ok(date.year() as f64 + year_fraction(millis)?)
}

/// Convert a unix-millisecond timestamp into the requested representation.
pub fn convert_date(millis: i64, output: DateFormat) -> Result<f64> {
    match output {
        DateFormat::FractionalYear => fractional_year(millis),
        DateFormat::UnixMillis => Ok(millis as f64),
    }
}

/// `YYYY-MM-DD` label for tables and plot data.
pub fn format_date(millis: i64) -> Result<String> {
    Ok(to_datetime(millis)?.format("%Y-%m-%d").to_string())
}

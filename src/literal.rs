// Copyright (c) 2025 ADBC Drivers Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! SQL literal rendering for query parameters.
//!
//! Parameters are sent to the server inline, as the `USING` list of an
//! `EXECUTE` statement, so every argument must be rendered as Trino SQL text.

use crate::error::{Error, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};

const NANOS_PER_MILLI: i64 = 1_000_000;
const NANOS_PER_SECOND: i64 = 1_000_000_000;
const NANOS_PER_MINUTE: i64 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: i64 = 60 * NANOS_PER_MINUTE;

/// A query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Integer(i64),
    UnsignedInteger(u64),
    Boolean(bool),
    String(String),
    /// Decimal text, validated as a number before rendering.
    Numeric(String),
    Date(NaiveDate),
    Time(NaiveTime),
    TimeTz(NaiveTime, FixedOffset),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<FixedOffset>),
    Interval(TimeDelta),
    Array(Vec<Literal>),
    /// Not representable; rendering fails.
    Float(f64),
    /// Not representable; rendering fails.
    Bytes(Vec<u8>),
    /// Not representable; rendering fails.
    Map(Vec<(Literal, Literal)>),
}

impl Literal {
    /// Render as Trino SQL.
    pub fn to_sql(&self) -> Result<String> {
        match self {
            Literal::Null => Ok("NULL".to_string()),
            Literal::Integer(v) => Ok(v.to_string()),
            Literal::UnsignedInteger(v) => Ok(v.to_string()),
            Literal::Boolean(v) => Ok(v.to_string()),
            Literal::String(v) => Ok(quote(v)),
            Literal::Numeric(v) => {
                v.trim().parse::<f64>().map_err(|_| {
                    Error::UnsupportedArg(format!("numeric value {:?} is not a number", v))
                })?;
                Ok(v.trim().to_string())
            }
            Literal::Date(v) => Ok(format!("DATE '{}'", v.format("%Y-%m-%d"))),
            Literal::Time(v) => Ok(format!(
                "TIME '{}.{:09}'",
                v.format("%H:%M:%S"),
                v.nanosecond() % NANOS_PER_SECOND as u32
            )),
            Literal::TimeTz(time, offset) => Ok(format!(
                "TIME '{}{} {}'",
                time.format("%H:%M:%S"),
                fraction(time.nanosecond()),
                offset_suffix(offset)
            )),
            Literal::Timestamp(v) => Ok(format!(
                "TIMESTAMP '{}{}'",
                v.format("%Y-%m-%d %H:%M:%S"),
                fraction(v.nanosecond())
            )),
            Literal::TimestampTz(v) => Ok(format!(
                "TIMESTAMP '{}{} {}'",
                v.format("%Y-%m-%d %H:%M:%S"),
                fraction(v.nanosecond()),
                offset_suffix(v.offset())
            )),
            Literal::Interval(v) => interval(v),
            Literal::Array(items) => {
                let rendered = items
                    .iter()
                    .map(Literal::to_sql)
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!("ARRAY[{}]", rendered.join(", ")))
            }
            Literal::Float(_) => Err(Error::UnsupportedArg("float".to_string())),
            Literal::Bytes(_) => Err(Error::UnsupportedArg("bytes".to_string())),
            Literal::Map(_) => Err(Error::UnsupportedArg("map".to_string())),
        }
    }
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `.nnnnnnnnn` with trailing zeros removed; empty for whole seconds.
fn fraction(nanos: u32) -> String {
    let nanos = nanos % NANOS_PER_SECOND as u32;
    if nanos == 0 {
        return String::new();
    }
    let digits = format!("{:09}", nanos);
    format!(".{}", digits.trim_end_matches('0'))
}

fn offset_suffix(offset: &FixedOffset) -> String {
    let seconds = offset.local_minus_utc();
    if seconds == 0 {
        return "Z".to_string();
    }
    let sign = if seconds < 0 { '-' } else { '+' };
    let seconds = seconds.abs();
    format!("{}{:02}:{:02}", sign, seconds / 3600, (seconds % 3600) / 60)
}

/// Pick the coarsest unit that represents the duration exactly.
fn interval(duration: &TimeDelta) -> Result<String> {
    let nanos = duration.num_nanoseconds().ok_or_else(|| {
        Error::UnsupportedArg(format!("interval {} is out of range", duration))
    })?;

    if nanos % NANOS_PER_HOUR == 0 {
        return Ok(format!("INTERVAL '{}' HOUR", nanos / NANOS_PER_HOUR));
    }
    if nanos % NANOS_PER_MINUTE == 0 {
        return Ok(format!("INTERVAL '{}' MINUTE", nanos / NANOS_PER_MINUTE));
    }

    let seconds = nanos / NANOS_PER_SECOND;
    if nanos % NANOS_PER_SECOND == 0 {
        if seconds <= i32::MIN as i64 || seconds > i32::MAX as i64 {
            return Err(Error::UnsupportedArg(format!(
                "interval of {} seconds is out of range",
                seconds
            )));
        }
        return Ok(format!("INTERVAL '{}' SECOND", seconds));
    }

    if nanos % NANOS_PER_MILLI == 0 {
        let millis = (nanos / NANOS_PER_MILLI).abs() % 1000;
        let sign = if nanos < 0 && seconds == 0 { "-" } else { "" };
        let text = format!("{}{}.{:03}", sign, seconds, millis);
        let text = text.trim_end_matches('0');
        let limit = if nanos < 0 { 12 } else { 11 };
        if text.len() > limit {
            return Err(Error::UnsupportedArg(format!(
                "interval {} is out of range",
                text
            )));
        }
        return Ok(format!("INTERVAL '{}' SECOND", text));
    }

    Err(Error::UnsupportedArg(format!(
        "interval {} is not a whole number of milliseconds",
        duration
    )))
}

impl From<i64> for Literal {
    fn from(v: i64) -> Self {
        Literal::Integer(v)
    }
}

impl From<i32> for Literal {
    fn from(v: i32) -> Self {
        Literal::Integer(v.into())
    }
}

impl From<u64> for Literal {
    fn from(v: u64) -> Self {
        Literal::UnsignedInteger(v)
    }
}

impl From<u32> for Literal {
    fn from(v: u32) -> Self {
        Literal::UnsignedInteger(v.into())
    }
}

impl From<bool> for Literal {
    fn from(v: bool) -> Self {
        Literal::Boolean(v)
    }
}

impl From<&str> for Literal {
    fn from(v: &str) -> Self {
        Literal::String(v.to_string())
    }
}

impl From<String> for Literal {
    fn from(v: String) -> Self {
        Literal::String(v)
    }
}

impl From<f64> for Literal {
    fn from(v: f64) -> Self {
        Literal::Float(v)
    }
}

impl From<NaiveDate> for Literal {
    fn from(v: NaiveDate) -> Self {
        Literal::Date(v)
    }
}

impl From<NaiveTime> for Literal {
    fn from(v: NaiveTime) -> Self {
        Literal::Time(v)
    }
}

impl From<NaiveDateTime> for Literal {
    fn from(v: NaiveDateTime) -> Self {
        Literal::Timestamp(v)
    }
}

impl From<DateTime<FixedOffset>> for Literal {
    fn from(v: DateTime<FixedOffset>) -> Self {
        Literal::TimestampTz(v)
    }
}

impl<Tz: chrono::TimeZone> From<&DateTime<Tz>> for Literal {
    fn from(v: &DateTime<Tz>) -> Self {
        Literal::TimestampTz(v.fixed_offset())
    }
}

impl From<TimeDelta> for Literal {
    fn from(v: TimeDelta) -> Self {
        Literal::Interval(v)
    }
}

impl<T: Into<Literal>> From<Option<T>> for Literal {
    fn from(v: Option<T>) -> Self {
        v.map_or(Literal::Null, Into::into)
    }
}

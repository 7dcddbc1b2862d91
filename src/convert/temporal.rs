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

//! Parsers for the textual temporal grammar used on the wire.
//!
//! ```text
//! date      = YYYY-MM-DD
//! time      = HH:MM:SS[.fraction][[ ]zone]
//! timestamp = date SPACE time
//! zone      = +HH:MM | -HH:MM | zone-name
//! ```
//!
//! Fractions carry up to 9 significant digits; anything beyond is truncated.

use crate::convert::value::{Zone, ZonedDateTime, ZonedTime};
use chrono::{FixedOffset, NaiveDate, NaiveTime};
use chrono_tz::Tz;

const MAX_FRACTION_DIGITS: usize = 9;

pub(crate) fn parse_date(input: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .map_err(|e| format!("invalid date {:?}: {}", input, e))
}

pub(crate) fn parse_time(input: &str) -> Result<ZonedTime, String> {
    let (time, rest) = parse_clock(input)?;
    let zone = parse_zone(rest)?;
    Ok(ZonedTime { time, zone })
}

pub(crate) fn parse_timestamp(input: &str) -> Result<ZonedDateTime, String> {
    let (date, clock) = input
        .split_once(' ')
        .ok_or_else(|| format!("invalid timestamp {:?}: missing time", input))?;
    let date = parse_date(date)?;
    let (time, rest) = parse_clock(clock)?;
    let zone = parse_zone(rest)?;
    Ok(ZonedDateTime {
        datetime: date.and_time(time),
        zone,
    })
}

/// Parse `HH:MM:SS[.fraction]` and return the unparsed remainder.
fn parse_clock(input: &str) -> Result<(NaiveTime, &str), String> {
    let bytes = input.as_bytes();
    if bytes.len() < 8 || !bytes[..8].is_ascii() || bytes[2] != b':' || bytes[5] != b':' {
        return Err(format!("invalid time {:?}", input));
    }
    let field = |range: std::ops::Range<usize>| -> Result<u32, String> {
        input[range]
            .parse::<u32>()
            .map_err(|_| format!("invalid time {:?}", input))
    };
    let hour = field(0..2)?;
    let minute = field(3..5)?;
    let second = field(6..8)?;

    let mut rest = &input[8..];
    let mut nanos = 0u32;
    if let Some(fraction) = rest.strip_prefix('.') {
        let digits = fraction
            .bytes()
            .take_while(|b| b.is_ascii_digit())
            .count();
        let kept = &fraction[..digits.min(MAX_FRACTION_DIGITS)];
        if !kept.is_empty() {
            let scale = 10u32.pow((MAX_FRACTION_DIGITS - kept.len()) as u32);
            nanos = kept
                .parse::<u32>()
                .map_err(|_| format!("invalid fraction in {:?}", input))?
                * scale;
        }
        rest = &fraction[digits..];
    }

    let time = NaiveTime::from_hms_nano_opt(hour, minute, second, nanos)
        .ok_or_else(|| format!("time out of range {:?}", input))?;
    Ok((time, rest))
}

fn parse_zone(rest: &str) -> Result<Zone, String> {
    let zone = rest.trim();
    if zone.is_empty() {
        return Ok(Zone::Local);
    }
    if zone.starts_with('+') || zone.starts_with('-') {
        return parse_offset(zone).map(Zone::Fixed);
    }
    if zone == "UTC" || zone == "Z" {
        return Ok(Zone::Named(Tz::UTC));
    }
    zone.parse::<Tz>()
        .map(Zone::Named)
        .map_err(|_| format!("unknown time zone {:?}", zone))
}

fn parse_offset(zone: &str) -> Result<FixedOffset, String> {
    let sign = if zone.starts_with('-') { -1 } else { 1 };
    let body = &zone[1..];
    let (hours, minutes) = match body.split_once(':') {
        Some((h, m)) => (h, m),
        None if body.len() == 4 && body.is_ascii() => body.split_at(2),
        None => (body, "0"),
    };
    let hours: i32 = hours
        .parse()
        .map_err(|_| format!("invalid zone offset {:?}", zone))?;
    let minutes: i32 = minutes
        .parse()
        .map_err(|_| format!("invalid zone offset {:?}", zone))?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| format!("zone offset out of range {:?}", zone))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hms_nano(h: u32, m: u32, s: u32, n: u32) -> NaiveTime {
        NaiveTime::from_hms_nano_opt(h, m, s, n).unwrap()
    }

    fn offset(seconds: i32) -> Zone {
        Zone::Fixed(FixedOffset::east_opt(seconds).unwrap())
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2017-07-10").unwrap(),
            NaiveDate::from_ymd_opt(2017, 7, 10).unwrap()
        );
        assert!(parse_date("2017-13-10").is_err());
        assert!(parse_date("not a date").is_err());
    }

    #[test]
    fn test_parse_time_without_zone_is_local() {
        let parsed = parse_time("01:02:03.000").unwrap();
        assert_eq!(parsed.time, hms_nano(1, 2, 3, 0));
        assert_eq!(parsed.zone, Zone::Local);

        let parsed = parse_time("01:02:03").unwrap();
        assert_eq!(parsed.time, hms_nano(1, 2, 3, 0));
    }

    #[test]
    fn test_parse_time_zone_suffixes() {
        let cases = [
            ("01:02:03.000 UTC", Zone::Named(Tz::UTC)),
            ("01:02:03.000 +03:00", offset(3 * 3600)),
            ("01:02:03.000+03:00", offset(3 * 3600)),
            ("01:02:03.000 -05:00", offset(-5 * 3600)),
            ("01:02:03.000-05:00", offset(-5 * 3600)),
            (
                "01:02:03.000 Europe/Paris",
                Zone::Named(chrono_tz::Europe::Paris),
            ),
        ];
        for (input, zone) in cases {
            let parsed = parse_time(input).unwrap();
            assert_eq!(parsed.time, hms_nano(1, 2, 3, 0), "{}", input);
            assert_eq!(parsed.zone, zone, "{}", input);
        }
    }

    #[test]
    fn test_fraction_precision() {
        assert_eq!(parse_time("01:02:03.1").unwrap().time, hms_nano(1, 2, 3, 100_000_000));
        assert_eq!(
            parse_time("01:02:03.123456789").unwrap().time,
            hms_nano(1, 2, 3, 123_456_789)
        );
        // Picosecond precision is truncated, never rounded up.
        assert_eq!(
            parse_time("01:02:03.999999999999").unwrap().time,
            hms_nano(1, 2, 3, 999_999_999)
        );
    }

    #[test]
    fn test_parse_timestamp_with_named_zone() {
        let parsed = parse_timestamp("2017-07-10 01:02:03.123456789 Europe/Paris").unwrap();
        assert_eq!(
            parsed.datetime,
            NaiveDate::from_ymd_opt(2017, 7, 10)
                .unwrap()
                .and_time(hms_nano(1, 2, 3, 123_456_789))
        );
        assert_eq!(parsed.zone, Zone::Named(chrono_tz::Europe::Paris));
    }

    #[test]
    fn test_parse_timestamp_offsets() {
        let parsed = parse_timestamp("2017-07-10 01:02:03.000-04:00").unwrap();
        assert_eq!(parsed.zone, offset(-4 * 3600));
        let parsed = parse_timestamp("2017-07-10 01:02:03.000 +03:00").unwrap();
        assert_eq!(parsed.zone, offset(3 * 3600));
        let parsed = parse_timestamp("2017-07-10 01:02:03.000").unwrap();
        assert_eq!(parsed.zone, Zone::Local);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(parse_time("1:02:03").is_err());
        assert!(parse_time("25:00:00").is_err());
        assert!(parse_time("01:02:03 Mars/Olympus").is_err());
        assert!(parse_timestamp("2017-07-10").is_err());
        assert!(parse_timestamp("2017-07-10 01:02:03 +aa:00").is_err());
    }
}

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

//! Native values produced by converters and the typed views over them.

use crate::error::{Error, Result};
use chrono::{
    DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone,
};
use chrono_tz::Tz;
use std::collections::HashMap;

/// Time zone attached to a temporal value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Zone {
    /// No zone on the wire; interpreted in the process's local zone.
    Local,
    /// Numeric offset such as `+03:00`.
    Fixed(FixedOffset),
    /// Zone database name such as `Europe/Paris` or `UTC`.
    Named(Tz),
}

impl Zone {
    fn resolve(&self, datetime: &NaiveDateTime) -> Option<DateTime<FixedOffset>> {
        match self {
            Zone::Local => Local
                .from_local_datetime(datetime)
                .earliest()
                .map(|dt| dt.with_timezone(&dt.offset().fix())),
            Zone::Fixed(offset) => offset.from_local_datetime(datetime).earliest(),
            Zone::Named(tz) => tz
                .from_local_datetime(datetime)
                .earliest()
                .map(|dt| dt.with_timezone(&dt.offset().fix())),
        }
    }
}

/// Wall-clock time with its zone, for `time` and `time with time zone`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZonedTime {
    pub time: NaiveTime,
    pub zone: Zone,
}

/// Date and time with its zone, for `timestamp` and `timestamp with time zone`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZonedDateTime {
    pub datetime: NaiveDateTime,
    pub zone: Zone,
}

impl ZonedDateTime {
    /// Resolve to an absolute instant. `None` when the wall time does not
    /// exist in the zone (DST gap).
    pub fn to_fixed_offset(&self) -> Option<DateTime<FixedOffset>> {
        self.zone.resolve(&self.datetime)
    }
}

/// A decoded cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    /// Decimal kept as its exact textual form.
    Decimal(String),
    String(String),
    Binary(Vec<u8>),
    Date(NaiveDate),
    Time(ZonedTime),
    Timestamp(ZonedDateTime),
    Array(Vec<Value>),
    Map(HashMap<String, Value>),
    /// Row fields are passed through as loosely typed wire values.
    Row(Vec<serde_json::Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Decimal(_) => "decimal",
            Value::String(_) => "string",
            Value::Binary(_) => "binary",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::Timestamp(_) => "timestamp",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Row(_) => "row",
        }
    }
}

/// Conversion from a decoded [`Value`] into a Rust destination type.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self>;
}

fn mismatch(value: &Value, target: &str) -> Error {
    Error::decode(
        "scan",
        format!("cannot convert {} value into {}", value.type_name(), target),
    )
}

macro_rules! impl_from_value {
    ($ty:ty, $target:literal, $($pattern:pat => $out:expr),+ $(,)?) => {
        impl FromValue for $ty {
            fn from_value(value: &Value) -> Result<Self> {
                match value {
                    $($pattern => Ok($out),)+
                    other => Err(mismatch(other, $target)),
                }
            }
        }
    };
}

impl_from_value!(bool, "bool", Value::Boolean(b) => *b);
impl_from_value!(i64, "i64", Value::Integer(i) => *i);
impl_from_value!(f64, "f64",
    Value::Float(f) => *f,
    Value::Integer(i) => *i as f64,
);
impl_from_value!(String, "String",
    Value::String(s) => s.clone(),
    Value::Decimal(s) => s.clone(),
);
impl_from_value!(Vec<u8>, "bytes", Value::Binary(b) => b.clone());
impl_from_value!(NaiveDate, "NaiveDate", Value::Date(d) => *d);
impl_from_value!(ZonedTime, "ZonedTime", Value::Time(t) => *t);
impl_from_value!(ZonedDateTime, "ZonedDateTime", Value::Timestamp(ts) => *ts);
impl_from_value!(HashMap<String, Value>, "map", Value::Map(m) => m.clone());
impl_from_value!(Vec<serde_json::Value>, "row", Value::Row(r) => r.clone());

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide)
            .map_err(|_| Error::decode("scan", format!("value {} overflows i32", wide)))
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Nullable one-dimensional array.
#[derive(Debug, Clone, PartialEq)]
pub struct NullSlice<T> {
    pub values: Vec<Option<T>>,
    /// False when the array itself was null.
    pub valid: bool,
}

/// Nullable two-dimensional array.
#[derive(Debug, Clone, PartialEq)]
pub struct NullSlice2<T> {
    pub values: Vec<Option<Vec<Option<T>>>>,
    pub valid: bool,
}

/// Nullable three-dimensional array.
#[derive(Debug, Clone, PartialEq)]
pub struct NullSlice3<T> {
    pub values: Vec<Option<Vec<Option<Vec<Option<T>>>>>>,
    pub valid: bool,
}

/// Nullable map with string keys.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NullMap {
    pub values: HashMap<String, Value>,
    pub valid: bool,
}

impl<T> Default for NullSlice<T> {
    fn default() -> Self {
        Self {
            values: Vec::new(),
            valid: false,
        }
    }
}

impl<T> Default for NullSlice2<T> {
    fn default() -> Self {
        Self {
            values: Vec::new(),
            valid: false,
        }
    }
}

impl<T> Default for NullSlice3<T> {
    fn default() -> Self {
        Self {
            values: Vec::new(),
            valid: false,
        }
    }
}

fn array_items<'a>(value: &'a Value, target: &str) -> Result<&'a [Value]> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(mismatch(other, target)),
    }
}

fn level1<T: FromValue>(value: &Value) -> Result<Vec<Option<T>>> {
    array_items(value, "array")?
        .iter()
        .map(Option::<T>::from_value)
        .collect()
}

fn level2<T: FromValue>(value: &Value) -> Result<Vec<Option<Vec<Option<T>>>>> {
    array_items(value, "2-level array")?
        .iter()
        .map(|item| match item {
            Value::Null => Ok(None),
            inner => level1(inner).map(Some),
        })
        .collect()
}

fn level3<T: FromValue>(value: &Value) -> Result<Vec<Option<Vec<Option<Vec<Option<T>>>>>>> {
    array_items(value, "3-level array")?
        .iter()
        .map(|item| match item {
            Value::Null => Ok(None),
            inner => level2(inner).map(Some),
        })
        .collect()
}

impl<T: FromValue> FromValue for NullSlice<T> {
    fn from_value(value: &Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        Ok(Self {
            values: level1(value)?,
            valid: true,
        })
    }
}

impl<T: FromValue> FromValue for NullSlice2<T> {
    fn from_value(value: &Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        Ok(Self {
            values: level2(value)?,
            valid: true,
        })
    }
}

impl<T: FromValue> FromValue for NullSlice3<T> {
    fn from_value(value: &Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        Ok(Self {
            values: level3(value)?,
            valid: true,
        })
    }
}

impl FromValue for NullMap {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Map(values) => Ok(Self {
                values: values.clone(),
                valid: true,
            }),
            other => Err(mismatch(other, "map")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_scans() {
        assert!(bool::from_value(&Value::Boolean(true)).unwrap());
        assert_eq!(i64::from_value(&Value::Integer(7)).unwrap(), 7);
        assert_eq!(f64::from_value(&Value::Integer(2)).unwrap(), 2.0);
        assert_eq!(
            String::from_value(&Value::Decimal("1.50".into())).unwrap(),
            "1.50"
        );
        assert!(i64::from_value(&Value::String("7".into())).is_err());
        assert!(i32::from_value(&Value::Integer(i64::MAX)).is_err());
    }

    #[test]
    fn test_option_maps_null_to_none() {
        assert_eq!(Option::<i64>::from_value(&Value::Null).unwrap(), None);
        assert_eq!(
            Option::<i64>::from_value(&Value::Integer(1)).unwrap(),
            Some(1)
        );
    }

    #[test]
    fn test_null_slice_from_null_is_invalid_not_empty() {
        let slice = NullSlice::<bool>::from_value(&Value::Null).unwrap();
        assert!(!slice.valid);
        assert!(slice.values.is_empty());

        let slice = NullSlice2::<bool>::from_value(&Value::Null).unwrap();
        assert!(!slice.valid);

        let slice = NullSlice3::<bool>::from_value(&Value::Null).unwrap();
        assert!(!slice.valid);
    }

    #[test]
    fn test_null_slice2_of_bool() {
        let value = Value::Array(vec![Value::Array(vec![Value::Boolean(true)])]);
        let slice = NullSlice2::<bool>::from_value(&value).unwrap();
        assert!(slice.valid);
        assert_eq!(slice.values, vec![Some(vec![Some(true)])]);
    }

    #[test]
    fn test_null_slice_keeps_null_elements() {
        let value = Value::Array(vec![Value::Integer(1), Value::Null]);
        let slice = NullSlice::<i64>::from_value(&value).unwrap();
        assert_eq!(slice.values, vec![Some(1), None]);

        let value = Value::Array(vec![Value::Array(vec![Value::Null])]);
        let slice = NullSlice3::<String>::from_value(&value).unwrap();
        assert_eq!(slice.values, vec![Some(vec![None])]);
    }

    #[test]
    fn test_null_slice_rejects_wrong_depth() {
        let value = Value::Array(vec![Value::Boolean(true)]);
        assert!(NullSlice2::<bool>::from_value(&value).is_err());
        assert!(NullSlice::<bool>::from_value(&Value::Boolean(true)).is_err());
    }

    #[test]
    fn test_null_map() {
        let map = NullMap::from_value(&Value::Null).unwrap();
        assert!(!map.valid);

        let value = Value::Map(HashMap::from([(
            "hello".to_string(),
            Value::String("world".to_string()),
        )]));
        let map = NullMap::from_value(&value).unwrap();
        assert!(map.valid);
        assert_eq!(
            map.values.get("hello"),
            Some(&Value::String("world".to_string()))
        );
    }

    #[test]
    fn test_zoned_timestamp_resolves_named_zone() {
        let datetime = NaiveDate::from_ymd_opt(2017, 7, 10)
            .unwrap()
            .and_hms_nano_opt(1, 2, 3, 123456789)
            .unwrap();
        let ts = ZonedDateTime {
            datetime,
            zone: Zone::Named(chrono_tz::Europe::Paris),
        };
        let resolved = ts.to_fixed_offset().unwrap();
        assert_eq!(resolved.offset().local_minus_utc(), 2 * 3600);
    }
}

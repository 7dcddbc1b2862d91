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

//! Type conversion from wire values to native [`Value`]s.
//!
//! A [`Converter`] is built once per column from its type signature, before
//! any row is read, so unsupported types fail fast. Each cell is then decoded
//! with [`Converter::convert`].
//!
//! ## Nesting rules
//!
//! - Arrays nest up to three levels (`array(array(array(T)))`); deeper nesting
//!   is rejected at construction time.
//! - An array whose elements are maps with array values cannot be represented
//!   by the nullable containers and is rejected too.
//! - `row(...)` fields are not typed: cells come back as raw wire values.
//! - `varbinary` is decoded from base64 only at the top level. Nested inside an
//!   array or map it stays a base64 string.

pub mod column;
mod temporal;
pub mod value;

pub use column::ColumnInfo;
pub use value::{
    FromValue, NullMap, NullSlice, NullSlice2, NullSlice3, Value, Zone, ZonedDateTime, ZonedTime,
};

use crate::error::{Error, Result};
use crate::types::protocol::TypeSignature;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Deepest array nesting with a dedicated container type.
pub const MAX_ARRAY_DEPTH: u8 = 3;

/// Per-column decoder, one variant per wire type family.
#[derive(Debug, Clone, PartialEq)]
pub enum Converter {
    Boolean,
    Integer,
    Float,
    /// Exact decimal, kept as text.
    Decimal,
    String,
    /// `nested` binaries are left base64-encoded.
    Binary { nested: bool },
    Date,
    Time,
    TimeTz,
    Timestamp,
    TimestampTz,
    /// `depth` levels of arrays around `element`.
    Array { element: Box<Converter>, depth: u8 },
    /// String-keyed map, values decoded with the inner converter.
    Map(Box<Converter>),
    Row,
    /// Type of a bare `NULL` literal.
    Unknown,
}

/// Types delivered as plain strings.
const STRING_TYPES: &[&str] = &[
    "varchar",
    "char",
    "json",
    "uuid",
    "ipaddress",
    "interval day to second",
    "interval year to month",
    "geometry",
    "sphericalgeography",
    "bingtile",
];

impl Converter {
    /// Build a converter for a column's type signature.
    pub fn from_signature(signature: &TypeSignature) -> Result<Self> {
        Self::build(signature, false)
    }

    fn build(signature: &TypeSignature, nested: bool) -> Result<Self> {
        let raw_type = signature.raw_type.to_ascii_lowercase();
        let converter = match raw_type.as_str() {
            "boolean" => Converter::Boolean,
            "tinyint" | "smallint" | "integer" | "bigint" => Converter::Integer,
            "real" | "double" => Converter::Float,
            "decimal" => Converter::Decimal,
            "varbinary" => Converter::Binary { nested },
            "date" => Converter::Date,
            "time" => Converter::Time,
            "time with time zone" => Converter::TimeTz,
            "timestamp" => Converter::Timestamp,
            "timestamp with time zone" => Converter::TimestampTz,
            "array" => Self::build_array(signature)?,
            "map" => {
                let value_type = Self::type_argument(signature, 1)?;
                Converter::Map(Box::new(Self::build(value_type, true)?))
            }
            "row" => Converter::Row,
            "unknown" => Converter::Unknown,
            other if STRING_TYPES.contains(&other) => Converter::String,
            other => {
                return Err(Error::decode(
                    "type",
                    format!("unsupported type: {}", other),
                ))
            }
        };
        Ok(converter)
    }

    fn build_array(signature: &TypeSignature) -> Result<Self> {
        let element_type = Self::type_argument(signature, 0)?;
        match Self::build(element_type, true)? {
            Converter::Array { element, depth } => {
                if depth >= MAX_ARRAY_DEPTH {
                    return Err(Error::decode(
                        "type",
                        format!(
                            "arrays nested deeper than {} levels are not supported",
                            MAX_ARRAY_DEPTH
                        ),
                    ));
                }
                Ok(Converter::Array {
                    element,
                    depth: depth + 1,
                })
            }
            Converter::Map(value) if value.contains_array() => Err(Error::decode(
                "type",
                "arrays of maps with array values are not supported",
            )),
            element => Ok(Converter::Array {
                element: Box::new(element),
                depth: 1,
            }),
        }
    }

    fn type_argument(signature: &TypeSignature, position: usize) -> Result<&TypeSignature> {
        signature
            .arguments
            .get(position)
            .and_then(|argument| argument.type_signature())
            .ok_or_else(|| {
                Error::decode(
                    "type",
                    format!(
                        "{} is missing type argument {}",
                        signature.raw_type, position
                    ),
                )
            })
    }

    fn contains_array(&self) -> bool {
        match self {
            Converter::Array { .. } => true,
            Converter::Map(value) => value.contains_array(),
            _ => false,
        }
    }

    /// Label used in decode errors.
    pub fn type_label(&self) -> &'static str {
        match self {
            Converter::Boolean => "boolean",
            Converter::Integer => "integer",
            Converter::Float => "double",
            Converter::Decimal => "decimal",
            Converter::String => "varchar",
            Converter::Binary { .. } => "varbinary",
            Converter::Date => "date",
            Converter::Time => "time",
            Converter::TimeTz => "time with time zone",
            Converter::Timestamp => "timestamp",
            Converter::TimestampTz => "timestamp with time zone",
            Converter::Array { .. } => "array",
            Converter::Map(_) => "map",
            Converter::Row => "row",
            Converter::Unknown => "unknown",
        }
    }

    /// Decode one wire value. Null always yields [`Value::Null`].
    pub fn convert(&self, raw: &JsonValue) -> Result<Value> {
        if raw.is_null() {
            return Ok(Value::Null);
        }
        match self {
            Converter::Boolean => match raw {
                JsonValue::Bool(b) => Ok(Value::Boolean(*b)),
                other => Err(self.unexpected(other)),
            },
            Converter::Integer => self.convert_integer(raw),
            Converter::Float => self.convert_float(raw),
            Converter::Decimal => match raw {
                JsonValue::String(s) => Ok(Value::Decimal(s.clone())),
                JsonValue::Number(n) => Ok(Value::Decimal(n.to_string())),
                other => Err(self.unexpected(other)),
            },
            Converter::String | Converter::Binary { nested: true } => match raw {
                JsonValue::String(s) => Ok(Value::String(s.clone())),
                other => Err(self.unexpected(other)),
            },
            Converter::Binary { nested: false } => {
                let encoded = self.expect_str(raw)?;
                STANDARD
                    .decode(encoded)
                    .map(Value::Binary)
                    .map_err(|e| Error::decode(self.type_label(), e))
            }
            Converter::Date => temporal::parse_date(self.expect_str(raw)?)
                .map(Value::Date)
                .map_err(|e| Error::decode(self.type_label(), e)),
            Converter::Time | Converter::TimeTz => temporal::parse_time(self.expect_str(raw)?)
                .map(Value::Time)
                .map_err(|e| Error::decode(self.type_label(), e)),
            Converter::Timestamp | Converter::TimestampTz => {
                temporal::parse_timestamp(self.expect_str(raw)?)
                    .map(Value::Timestamp)
                    .map_err(|e| Error::decode(self.type_label(), e))
            }
            Converter::Array { element, depth } => Self::convert_array(element, *depth, raw),
            Converter::Map(value_converter) => match raw {
                JsonValue::Object(entries) => {
                    let mut map = HashMap::with_capacity(entries.len());
                    for (key, value) in entries {
                        map.insert(key.clone(), value_converter.convert(value)?);
                    }
                    Ok(Value::Map(map))
                }
                other => Err(self.unexpected(other)),
            },
            Converter::Row => match raw {
                JsonValue::Array(fields) => Ok(Value::Row(fields.clone())),
                other => Err(self.unexpected(other)),
            },
            Converter::Unknown => Err(self.unexpected(raw)),
        }
    }

    fn convert_array(element: &Converter, depth: u8, raw: &JsonValue) -> Result<Value> {
        if raw.is_null() {
            return Ok(Value::Null);
        }
        if depth == 0 {
            return element.convert(raw);
        }
        match raw {
            JsonValue::Array(items) => items
                .iter()
                .map(|item| Self::convert_array(element, depth - 1, item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            other => Err(Error::decode(
                "array",
                format!("expected {}-level array, got {}", depth, json_kind(other)),
            )),
        }
    }

    fn convert_integer(&self, raw: &JsonValue) -> Result<Value> {
        let parsed = match raw {
            JsonValue::Number(n) => n.as_i64(),
            JsonValue::String(s) => s.parse::<i64>().ok(),
            other => return Err(self.unexpected(other)),
        };
        parsed
            .map(Value::Integer)
            .ok_or_else(|| Error::decode(self.type_label(), format!("invalid integer {}", raw)))
    }

    fn convert_float(&self, raw: &JsonValue) -> Result<Value> {
        let parsed = match raw {
            JsonValue::Number(n) => n.as_f64(),
            JsonValue::String(s) => match s.as_str() {
                "NaN" => Some(f64::NAN),
                "Infinity" => Some(f64::INFINITY),
                "-Infinity" => Some(f64::NEG_INFINITY),
                other => other.parse::<f64>().ok(),
            },
            other => return Err(self.unexpected(other)),
        };
        parsed
            .map(Value::Float)
            .ok_or_else(|| Error::decode(self.type_label(), format!("invalid number {}", raw)))
    }

    fn expect_str<'a>(&self, raw: &'a JsonValue) -> Result<&'a str> {
        raw.as_str().ok_or_else(|| self.unexpected(raw))
    }

    fn unexpected(&self, raw: &JsonValue) -> Error {
        Error::decode(
            self.type_label(),
            format!("cannot convert {} value", json_kind(raw)),
        )
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

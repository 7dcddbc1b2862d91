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

//! Statement protocol request/response types.
//!
//! These types map directly to the JSON documents returned by
//! `POST /v1/statement` and by every subsequent `nextUri` poll.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Raw row as it appears on the wire, one JSON value per column.
pub type RawRow = Vec<serde_json::Value>;

/// One page of a statement: the response to a submit or a poll.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub info_uri: Option<String>,
    #[serde(default)]
    pub partial_cancel_uri: Option<String>,
    #[serde(default)]
    pub next_uri: Option<String>,
    #[serde(default)]
    pub columns: Option<Vec<Column>>,
    #[serde(default)]
    pub data: Option<QueryData>,
    /// Statistics are advisory; a malformed object is treated as absent.
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub stats: Option<QueryStats>,
    #[serde(default)]
    pub error: Option<ServerError>,
    #[serde(default)]
    pub warnings: Vec<Warning>,
    #[serde(default)]
    pub update_type: Option<String>,
    #[serde(default)]
    pub update_count: Option<i64>,
}

/// Accept any JSON for the field and keep it only if it matches `T`.
fn deserialize_lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|value| match serde_json::from_value(value) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            debug!("Ignoring malformed field: {}", e);
            None
        }
    }))
}

/// Row payload of a page: either inline rows or a spooled segment list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum QueryData {
    Rows(Vec<RawRow>),
    Spooled(SpooledData),
}

/// Spooling descriptor: the negotiated encoding plus ordered segments.
#[derive(Debug, Clone, Deserialize)]
pub struct SpooledData {
    pub encoding: String,
    #[serde(default)]
    pub segments: Vec<Segment>,
}

/// One entry of `data.segments`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Segment {
    Inline {
        /// Base64 payload, decoded when the segment is loaded.
        data: String,
        metadata: SegmentMetadata,
    },
    Spooled {
        #[serde(default)]
        uri: Option<String>,
        #[serde(default, rename = "ackUri")]
        ack_uri: Option<String>,
        #[serde(default)]
        headers: HashMap<String, Vec<String>>,
        metadata: SegmentMetadata,
    },
}

impl Segment {
    pub fn metadata(&self) -> &SegmentMetadata {
        match self {
            Segment::Inline { metadata, .. } | Segment::Spooled { metadata, .. } => metadata,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentMetadata {
    /// Size of the payload as transmitted (compressed when a codec is used).
    pub segment_size: i64,
    #[serde(default)]
    pub uncompressed_size: Option<i64>,
    #[serde(default)]
    pub row_offset: i64,
    #[serde(default)]
    pub rows_count: Option<i64>,
}

/// Column descriptor as sent on the first page that carries columns.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub name: String,
    /// Full type string, e.g. `varchar(10)` or `array(row(x integer))`.
    #[serde(rename = "type")]
    pub type_name: String,
    pub type_signature: TypeSignature,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeSignature {
    pub raw_type: String,
    #[serde(default)]
    pub arguments: Vec<TypeArgument>,
}

impl TypeSignature {
    pub fn new(raw_type: impl Into<String>) -> Self {
        Self {
            raw_type: raw_type.into(),
            arguments: Vec::new(),
        }
    }

    pub fn with_arguments(mut self, arguments: Vec<TypeArgument>) -> Self {
        self.arguments = arguments;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TypeArgument {
    Type(TypeSignature),
    NamedType(NamedTypeSignature),
    Long(i64),
    Variable(String),
}

impl TypeArgument {
    /// Nested type signature, for `TYPE` and `NAMED_TYPE` arguments.
    pub fn type_signature(&self) -> Option<&TypeSignature> {
        match self {
            TypeArgument::Type(signature) => Some(signature),
            TypeArgument::NamedType(named) => Some(&named.type_signature),
            TypeArgument::Long(_) | TypeArgument::Variable(_) => None,
        }
    }

    pub fn long(&self) -> Option<i64> {
        match self {
            TypeArgument::Long(value) => Some(*value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedTypeSignature {
    #[serde(default)]
    pub field_name: Option<RowFieldName>,
    pub type_signature: TypeSignature,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RowFieldName {
    pub name: String,
}

/// Progress statistics attached to each page.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryStats {
    pub state: String,
    pub queued: bool,
    pub scheduled: bool,
    pub nodes: i64,
    pub total_splits: i64,
    pub queued_splits: i64,
    pub running_splits: i64,
    pub completed_splits: i64,
    pub cpu_time_millis: i64,
    pub wall_time_millis: i64,
    pub queued_time_millis: i64,
    pub elapsed_time_millis: i64,
    pub processed_rows: i64,
    pub processed_bytes: i64,
    pub physical_input_bytes: i64,
    pub peak_memory_bytes: i64,
    pub spilled_bytes: i64,
    pub progress_percentage: Option<f64>,
    pub running_percentage: Option<f64>,
}

/// Structured error reported by the server for a failed query.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerError {
    pub message: String,
    pub sql_state: Option<String>,
    pub error_code: i64,
    pub error_name: String,
    pub error_type: String,
    pub error_location: Option<ErrorLocation>,
    pub failure_info: Option<FailureInfo>,
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if !self.error_name.is_empty() {
            write!(f, " [{} {}", self.error_name, self.error_code)?;
            if !self.error_type.is_empty() {
                write!(f, " {}", self.error_type)?;
            }
            write!(f, "]")?;
        }
        if let Some(location) = &self.error_location {
            write!(
                f,
                " at line {}, column {}",
                location.line_number, location.column_number
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ErrorLocation {
    pub line_number: i64,
    pub column_number: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FailureInfo {
    #[serde(rename = "type")]
    pub failure_type: String,
    pub message: Option<String>,
    pub cause: Option<Box<FailureInfo>>,
    pub stack: Vec<String>,
    pub error_location: Option<ErrorLocation>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Warning {
    #[serde(rename = "warningCode")]
    pub warning_code: Option<serde_json::Value>,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_page_with_inline_rows() {
        let json = r#"{
            "id": "20210817_140827_00000_arvdv",
            "columns": [{
                "name": "_col0",
                "type": "integer",
                "typeSignature": {"rawType": "integer", "arguments": []}
            }],
            "data": [[1]],
            "stats": {"state": "FINISHED", "progressPercentage": 100.0}
        }"#;

        let page: QueryResponse = serde_json::from_str(json).unwrap();
        assert_eq!(page.id, "20210817_140827_00000_arvdv");
        assert!(page.next_uri.is_none());
        assert_eq!(page.columns.as_ref().unwrap()[0].type_name, "integer");
        match page.data {
            Some(QueryData::Rows(rows)) => assert_eq!(rows, vec![vec![serde_json::json!(1)]]),
            other => panic!("unexpected data: {:?}", other),
        }
        let stats = page.stats.unwrap();
        assert_eq!(stats.state, "FINISHED");
        assert_eq!(stats.progress_percentage, Some(100.0));
    }

    #[test]
    fn test_malformed_stats_are_dropped() {
        let json = r#"{"stats": {"progressPercentage": ""}}"#;
        let page: QueryResponse = serde_json::from_str(json).unwrap();
        assert!(page.stats.is_none());
        assert!(page.data.is_none());
    }

    #[test]
    fn test_spooled_data_with_both_segment_kinds() {
        let json = r#"{
            "id": "q",
            "data": {
                "encoding": "json+zstd",
                "segments": [
                    {
                        "type": "inline",
                        "data": "W1sxMDAwXSwgWzEwMDAxXV0=",
                        "metadata": {"segmentSize": 17, "rowOffset": 0, "rowsCount": 2}
                    },
                    {
                        "type": "spooled",
                        "uri": "http://storage/v1/spooled/download/abc",
                        "headers": {"x-amz-server-side-encryption-customer-key": ["key"]},
                        "metadata": {"segmentSize": 29, "uncompressedSize": 16, "rowOffset": 2}
                    }
                ]
            }
        }"#;

        let page: QueryResponse = serde_json::from_str(json).unwrap();
        let spooled = match page.data {
            Some(QueryData::Spooled(spooled)) => spooled,
            other => panic!("unexpected data: {:?}", other),
        };
        assert_eq!(spooled.encoding, "json+zstd");
        assert_eq!(spooled.segments.len(), 2);

        match &spooled.segments[0] {
            Segment::Inline { data, metadata } => {
                assert_eq!(data, "W1sxMDAwXSwgWzEwMDAxXV0=");
                assert_eq!(metadata.rows_count, Some(2));
            }
            other => panic!("expected inline segment, got {:?}", other),
        }
        match &spooled.segments[1] {
            Segment::Spooled {
                uri,
                headers,
                metadata,
                ..
            } => {
                assert!(uri.as_deref().unwrap().contains("/v1/spooled/download/"));
                assert_eq!(headers.len(), 1);
                assert_eq!(metadata.uncompressed_size, Some(16));
                assert_eq!(metadata.row_offset, 2);
            }
            other => panic!("expected spooled segment, got {:?}", other),
        }
    }

    #[test]
    fn test_row_type_signature() {
        let json = r#"{
            "rawType": "row",
            "arguments": [
                {"kind": "NAMED_TYPE", "value": {
                    "fieldName": {"name": "x"},
                    "typeSignature": {"rawType": "integer", "arguments": []}
                }},
                {"kind": "NAMED_TYPE", "value": {
                    "typeSignature": {"rawType": "varchar", "arguments": [{"kind": "LONG", "value": 1}]}
                }}
            ]
        }"#;

        let signature: TypeSignature = serde_json::from_str(json).unwrap();
        assert_eq!(signature.raw_type, "row");
        assert_eq!(signature.arguments.len(), 2);
        let second = signature.arguments[1].type_signature().unwrap();
        assert_eq!(second.raw_type, "varchar");
        assert_eq!(second.arguments[0].long(), Some(1));
    }

    #[test]
    fn test_server_error_display() {
        let json = r#"{
            "error": {
                "message": "line 1:15: Table 'x' does not exist",
                "sqlState": "42000",
                "errorCode": 46,
                "errorName": "TABLE_NOT_FOUND",
                "errorType": "USER_ERROR",
                "errorLocation": {"lineNumber": 1, "columnNumber": 15},
                "failureInfo": {"type": "io.trino.spi.TrinoException", "message": "Table 'x' does not exist"}
            }
        }"#;

        let page: QueryResponse = serde_json::from_str(json).unwrap();
        let error = page.error.unwrap();
        assert_eq!(error.error_code, 46);
        assert_eq!(error.sql_state.as_deref(), Some("42000"));
        assert_eq!(
            error.failure_info.as_ref().unwrap().failure_type,
            "io.trino.spi.TrinoException"
        );
        assert_eq!(
            error.to_string(),
            "line 1:15: Table 'x' does not exist [TABLE_NOT_FOUND 46 USER_ERROR] at line 1, column 15"
        );
    }
}

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

//! Column metadata derived from a wire type signature.

use crate::convert::Converter;
use crate::error::Result;
use crate::types::protocol::Column;

/// Length reported for unbounded character and binary types.
pub const UNBOUNDED_LENGTH: i64 = i32::MAX as i64;

/// A result column together with its converter.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    column: Column,
    converter: Converter,
}

impl ColumnInfo {
    /// Build the converter for `column`; fails for unsupported types.
    pub fn new(column: Column) -> Result<Self> {
        let converter = Converter::from_signature(&column.type_signature)
            .map_err(|e| e.in_context(format!("column {}", column.name)))?;
        Ok(Self { column, converter })
    }

    pub fn name(&self) -> &str {
        &self.column.name
    }

    /// Full type string as sent by the server, e.g. `varchar(10)`.
    pub fn type_name(&self) -> &str {
        &self.column.type_name
    }

    pub fn converter(&self) -> &Converter {
        &self.converter
    }

    /// Upper-case raw type name, e.g. `VARCHAR` or `ARRAY`.
    pub fn database_type_name(&self) -> String {
        self.column.type_signature.raw_type.to_uppercase()
    }

    /// Declared length of character and binary columns.
    pub fn length(&self) -> Option<i64> {
        match self.column.type_signature.raw_type.as_str() {
            "varchar" | "char" | "varbinary" => Some(
                self.column
                    .type_signature
                    .arguments
                    .first()
                    .and_then(|argument| argument.long())
                    .unwrap_or(UNBOUNDED_LENGTH),
            ),
            _ => None,
        }
    }

    /// Precision and scale of decimal columns.
    pub fn decimal_size(&self) -> Option<(i64, i64)> {
        if self.column.type_signature.raw_type != "decimal" {
            return None;
        }
        let mut longs = self
            .column
            .type_signature
            .arguments
            .iter()
            .filter_map(|argument| argument.long());
        let precision = longs.next()?;
        let scale = longs.next().unwrap_or(0);
        Some((precision, scale))
    }

    /// Every Trino column may hold nulls.
    pub fn nullable(&self) -> bool {
        true
    }
}

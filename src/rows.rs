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

//! Row cursor over a statement's results.

use crate::convert::{ColumnInfo, FromValue, Value};
use crate::error::{Error, Result};
use crate::statement::{Statement, StatementState};
use crate::types::protocol::{QueryStats, Warning};
use std::sync::Arc;

/// Pull-based cursor over the rows of one query.
///
/// Rows arrive in server order across pages and segments. Reading past the
/// end keeps returning `None`; reading after [`Rows::close`] fails with
/// [`Error::Closed`]. Dropping the cursor before the end cancels the query.
#[derive(Debug)]
pub struct Rows {
    statement: Statement,
    closed: bool,
}

impl Rows {
    pub(crate) fn new(statement: Statement) -> Self {
        Self {
            statement,
            closed: false,
        }
    }

    /// The next row, converted with the column converters.
    pub async fn next(&mut self) -> Result<Option<Row>> {
        if self.closed {
            return Err(Error::Closed);
        }
        let Some(raw) = self.statement.next_row().await? else {
            return Ok(None);
        };
        let Some(columns) = self.statement.columns().cloned() else {
            return Err(Error::invalid_state("row received before column metadata"));
        };
        if raw.len() != columns.len() {
            let error = Error::decode(
                "row",
                format!("expected {} values, got {}", columns.len(), raw.len()),
            );
            return Err(self.statement.fail(error));
        }

        let values = columns
            .iter()
            .zip(raw.iter())
            .map(|(column, value)| {
                column
                    .converter()
                    .convert(value)
                    .map_err(|e| e.in_context(format!("column {}", column.name())))
            })
            .collect::<Result<Vec<_>>>();
        match values {
            Ok(values) => Ok(Some(Row { columns, values })),
            // A row that cannot be decoded ends the stream.
            Err(e) => Err(self.statement.fail(e)),
        }
    }

    /// Columns of the result; empty until the server has sent them.
    pub fn columns(&self) -> &[ColumnInfo] {
        self.statement
            .columns()
            .map(|columns| columns.as_slice())
            .unwrap_or_default()
    }

    pub fn query_id(&self) -> &str {
        self.statement.query_id()
    }

    pub fn stats(&self) -> Option<&QueryStats> {
        self.statement.stats()
    }

    pub fn warnings(&self) -> &[Warning] {
        self.statement.warnings()
    }

    pub fn state(&self) -> StatementState {
        self.statement.state()
    }

    /// Release the cursor; a running query is cancelled on the server.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.statement.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// One converted row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<Vec<ColumnInfo>>,
    values: Vec<Value>,
}

impl Row {
    /// Convert the value at `index` into `T`.
    pub fn get<T: FromValue>(&self, index: usize) -> Result<T> {
        let value = self.values.get(index).ok_or_else(|| {
            Error::decode(
                "scan",
                format!(
                    "column index {} out of range for {} columns",
                    index,
                    self.values.len()
                ),
            )
        })?;
        T::from_value(value)
            .map_err(|e| e.in_context(format!("column {}", self.columns[index].name())))
    }

    /// Convert the value of the column called `name` into `T`.
    pub fn get_by_name<T: FromValue>(&self, name: &str) -> Result<T> {
        let index = self
            .columns
            .iter()
            .position(|column| column.name() == name)
            .ok_or_else(|| Error::decode("scan", format!("no column named {}", name)))?;
        self.get(index)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

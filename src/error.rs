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

//! Error types for the Trino client.
//!
//! Every fallible operation returns [`Result`]. Callers that need to branch on
//! the failure class should match on [`Error::kind`] rather than on message
//! text.

use crate::types::protocol::ServerError;
use reqwest::StatusCode;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Non-retryable HTTP status returned by the coordinator or storage.
    Http,
    /// Network failure that persisted through the retry budget.
    Transport,
    /// The server reported a structured query error.
    QueryFailed,
    /// The query was cancelled by the caller, a deadline, or the server.
    Cancelled,
    /// A payload, segment or value could not be decoded.
    Decode,
    /// Invalid client configuration, detected before any network call.
    Config,
    /// The server asked the client to track session state it does not support.
    UnsupportedHeader,
    /// A value cannot be rendered as a SQL literal.
    UnsupportedArg,
    /// The cursor was used after `close`.
    Closed,
    /// Internal state violation.
    InvalidState,
}

/// Errors returned by the Trino client.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("trino: query failed ({status}): {body:?}")]
    Http { status: StatusCode, body: String },

    #[error("trino: request failed after {attempts} attempts: {message}")]
    Transport { attempts: u32, message: String },

    #[error("trino: query failed: {0}")]
    QueryFailed(Box<ServerError>),

    #[error("trino: query cancelled: {0}")]
    Cancelled(String),

    #[error("trino: {context}: {message}")]
    Decode { context: String, message: String },

    #[error("trino: {0}")]
    Config(String),

    #[error("trino: response header {0} is not supported")]
    UnsupportedHeader(String),

    #[error("trino: unsupported arg type: {0}")]
    UnsupportedArg(String),

    #[error("trino: rows are closed")]
    Closed,

    #[error("trino: invalid state: {0}")]
    InvalidState(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Http { .. } => ErrorKind::Http,
            Error::Transport { .. } => ErrorKind::Transport,
            Error::QueryFailed(_) => ErrorKind::QueryFailed,
            Error::Cancelled(_) => ErrorKind::Cancelled,
            Error::Decode { .. } => ErrorKind::Decode,
            Error::Config(_) => ErrorKind::Config,
            Error::UnsupportedHeader(_) => ErrorKind::UnsupportedHeader,
            Error::UnsupportedArg(_) => ErrorKind::UnsupportedArg,
            Error::Closed => ErrorKind::Closed,
            Error::InvalidState(_) => ErrorKind::InvalidState,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    pub fn decode(context: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Error::Decode {
            context: context.into(),
            message: message.to_string(),
        }
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        Error::Cancelled(reason.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Error::InvalidState(message.into())
    }

    /// Prefix the context of a decode error, leaving other kinds untouched.
    pub(crate) fn in_context(self, outer: impl std::fmt::Display) -> Self {
        match self {
            Error::Decode { context, message } => Error::Decode {
                context: format!("{}: {}", outer, context),
                message,
            },
            other => other,
        }
    }

    /// Structured server error, if this is a query failure.
    pub fn server_error(&self) -> Option<&ServerError> {
        match self {
            Error::QueryFailed(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_carries_status_text() {
        let err = Error::Http {
            status: StatusCode::NOT_FOUND,
            body: "no such query".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Http);
        assert!(err.to_string().contains("404 Not Found"));
    }

    #[test]
    fn test_in_context_only_touches_decode_errors() {
        let err = Error::decode("column x", "bad value").in_context("row 3");
        assert_eq!(err.to_string(), "trino: row 3: column x: bad value");

        let err = Error::cancelled("deadline").in_context("row 3");
        assert_eq!(err.to_string(), "trino: query cancelled: deadline");
    }

    #[test]
    fn test_server_error_accessor() {
        let server = ServerError {
            message: "line 1:8: Column 'x' cannot be resolved".to_string(),
            error_name: "COLUMN_NOT_FOUND".to_string(),
            ..Default::default()
        };
        let err = Error::QueryFailed(Box::new(server));
        assert_eq!(err.kind(), ErrorKind::QueryFailed);
        assert_eq!(err.server_error().unwrap().error_name, "COLUMN_NOT_FOUND");
        assert!(Error::Closed.server_error().is_none());
    }
}

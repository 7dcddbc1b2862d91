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

//! Async Trino client for Rust
//!
//! This crate speaks the Trino HTTP statement protocol: it submits SQL to a
//! coordinator, follows `nextUri` until the query finishes, and converts the
//! returned rows into native values.
//!
//! ## Overview
//!
//! - [`Connection`] - Entry point; submits queries with per-query [`QueryOptions`]
//! - [`Rows`] - Pull-based cursor over a query's rows
//! - [`Statement`] - The submit/poll state machine behind a cursor
//! - [`convert`] - Wire type to [`Value`] conversion
//! - [`Literal`] - Rendering of parameters as SQL literals
//!
//! ## Features
//!
//! - **Spooling**: segmented results (`json`, `json+lz4`, `json+zstd`) fetched
//!   by a bounded pool of download workers and delivered in order
//! - **Retries**: transport failures and `502`/`503`/`504` are retried with
//!   capped exponential backoff
//! - **Cancellation**: every wait honours a [`CancellationToken`] and the
//!   query deadline; a cancelled query is deleted on the server
//!
//! ## Example
//!
//! ```ignore
//! use trino_client::{Config, Connection, Encoding, QueryOptions};
//!
//! let mut config = Config::new("http://localhost:8080");
//! config.user = Some("alice".into());
//! config.spooling.encodings = vec![Encoding::JsonZstd, Encoding::Json];
//!
//! let connection = Connection::new(config)?;
//! let mut rows = connection.query("SELECT 1", QueryOptions::default()).await?;
//! while let Some(row) = rows.next().await? {
//!     let value: i64 = row.get(0)?;
//! }
//! ```
//!
//! ## Spooling Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `encodings` | empty | Encodings offered to the server, most preferred first |
//! | `worker_count` | 5 | Concurrent segment downloads |
//! | `max_out_of_order_segments` | 10 | Segments held before delivery; must be at least `worker_count` |
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

pub mod auth;
pub mod client;
pub mod config;
pub mod connection;
pub mod convert;
pub mod error;
pub mod literal;
pub mod logging;
pub mod reader;
pub mod rows;
pub mod statement;
pub mod types;

// Re-export main types
pub use config::{Config, ProgressUpdater, QueryOptions, QueryProgressInfo};
pub use connection::{Connection, ExecResult};
pub use convert::{FromValue, NullMap, NullSlice, NullSlice2, NullSlice3, Value};
pub use error::{Error, ErrorKind, Result};
pub use literal::Literal;
pub use rows::{Row, Rows};
pub use statement::{Statement, StatementState};

// Re-export client types for advanced users
pub use auth::Auth;
pub use client::{HttpClientConfig, HttpRequester, StatementClient};
pub use logging::LogConfig;

// Re-export configuration types
pub use types::spooling::{Encoding, SpoolingConfig};

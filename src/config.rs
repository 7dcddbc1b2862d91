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

//! Connection configuration and per-query overrides.
//!
//! [`Config`] is a resolved configuration: there is no connection-string
//! parsing here. Every check runs before the first network call.

use crate::auth::Auth;
use crate::client::http::HttpClientConfig;
use crate::client::rest::{
    header_value, role_header_value, session_header_value, TRINO_CATALOG_HEADER,
    TRINO_CLIENT_INFO_HEADER, TRINO_CLIENT_TAGS_HEADER, TRINO_ENCODING_HEADER, TRINO_ROLE_HEADER,
    TRINO_SCHEMA_HEADER, TRINO_SESSION_HEADER, TRINO_SOURCE_HEADER, TRINO_USER_HEADER,
};
use crate::error::{Error, Result};
use crate::logging::LogConfig;
use crate::types::protocol::QueryStats;
use crate::types::spooling::{Encoding, SpoolingConfig};
use reqwest::header::{HeaderMap, HeaderName, AUTHORIZATION};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default value of the source header.
pub const DEFAULT_SOURCE: &str = "trino-rust-client";

/// Snapshot handed to a [`ProgressUpdater`].
#[derive(Debug, Clone, PartialEq)]
pub struct QueryProgressInfo {
    pub query_id: String,
    pub stats: QueryStats,
}

/// Receives query progress while the statement is polled.
///
/// Called on the polling path; a slow implementation delays the query.
pub trait ProgressUpdater: Send + Sync {
    fn update(&self, info: QueryProgressInfo);
}

/// Resolved connection configuration.
#[derive(Clone)]
pub struct Config {
    /// Coordinator base URL, e.g. `http://localhost:8080`.
    pub server_uri: String,
    pub user: Option<String>,
    pub source: String,
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub session_properties: BTreeMap<String, String>,
    pub client_tags: Vec<String>,
    pub client_info: Option<String>,
    /// Catalog to role.
    pub roles: BTreeMap<String, String>,
    /// Sent verbatim on every coordinator request.
    pub extra_headers: BTreeMap<String, String>,
    pub auth: Auth,
    pub http: HttpClientConfig,
    pub spooling: SpoolingConfig,
    /// Deadline for a whole query, submit to last row.
    pub query_timeout: Option<Duration>,
    /// Send parameterised queries with a prepared-statement header instead
    /// of `EXECUTE IMMEDIATE`.
    pub explicit_prepare: bool,
    pub progress_callback: Option<Arc<dyn ProgressUpdater>>,
    pub progress_callback_period: Option<Duration>,
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_uri: String::new(),
            user: None,
            source: DEFAULT_SOURCE.to_string(),
            catalog: None,
            schema: None,
            session_properties: BTreeMap::new(),
            client_tags: Vec::new(),
            client_info: None,
            roles: BTreeMap::new(),
            extra_headers: BTreeMap::new(),
            auth: Auth::None,
            http: HttpClientConfig::default(),
            spooling: SpoolingConfig::default(),
            query_timeout: None,
            explicit_prepare: true,
            progress_callback: None,
            progress_callback_period: None,
            log: LogConfig::default(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("server_uri", &self.server_uri)
            .field("user", &self.user)
            .field("source", &self.source)
            .field("catalog", &self.catalog)
            .field("schema", &self.schema)
            .field("session_properties", &self.session_properties)
            .field("roles", &self.roles)
            .field("auth", &self.auth)
            .field("http", &self.http)
            .field("spooling", &self.spooling)
            .field("query_timeout", &self.query_timeout)
            .field("explicit_prepare", &self.explicit_prepare)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<set>"),
            )
            .field("progress_callback_period", &self.progress_callback_period)
            .finish()
    }
}

impl Config {
    pub fn new(server_uri: impl Into<String>) -> Self {
        Self {
            server_uri: server_uri.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.server_uri.trim().is_empty() {
            return Err(Error::config("server URI must not be empty"));
        }
        url::Url::parse(&self.server_uri)
            .map_err(|e| Error::config(format!("invalid server URI {:?}: {}", self.server_uri, e)))?;
        self.auth.validate()?;
        self.spooling.validate()?;
        validate_progress(self.progress_callback.as_ref(), self.progress_callback_period)?;
        extra_headers(&self.extra_headers)?;
        Ok(())
    }

    /// Merge per-query overrides and build the request headers.
    pub(crate) fn resolve(&self, options: QueryOptions) -> Result<ResolvedQuery> {
        let mut spooling = self.spooling.clone();
        if let Some(encodings) = options.encodings {
            spooling.encodings = encodings;
        }
        if let Some(count) = options.spooling_worker_count {
            spooling.worker_count = count;
        }
        if let Some(limit) = options.max_out_of_order_segments {
            spooling.max_out_of_order_segments = limit;
        }
        spooling.validate()?;

        let progress_callback = options
            .progress_callback
            .or_else(|| self.progress_callback.clone());
        let period = options
            .progress_callback_period
            .or(self.progress_callback_period);
        validate_progress(progress_callback.as_ref(), period)?;
        let progress = progress_callback.zip(period);

        if options.access_token.is_some() && matches!(self.auth, Auth::Basic { .. }) {
            return Err(Error::config(
                "an access token cannot be combined with basic authentication",
            ));
        }

        let user = options.user.as_ref().or(self.user.as_ref());
        let mut roles = self.roles.clone();
        roles.extend(options.roles);

        let mut poll_headers = extra_headers(&self.extra_headers)?;
        poll_headers.extend(extra_headers(&options.extra_headers)?);
        if let Some(user) = user {
            poll_headers.insert(TRINO_USER_HEADER, header_value(&TRINO_USER_HEADER, user)?);
        }
        if let Some(token) = &options.access_token {
            if token.is_empty() {
                return Err(Error::config("access token must not be empty"));
            }
            poll_headers.insert(
                AUTHORIZATION,
                header_value(&AUTHORIZATION, &format!("Bearer {}", token))?,
            );
        }

        let mut submit_headers = poll_headers.clone();
        let mut set = |name: HeaderName, value: &str| -> Result<()> {
            if !value.is_empty() {
                submit_headers.insert(name.clone(), header_value(&name, value)?);
            }
            Ok(())
        };
        set(TRINO_SOURCE_HEADER, &self.source)?;
        set(TRINO_CATALOG_HEADER, self.catalog.as_deref().unwrap_or(""))?;
        set(TRINO_SCHEMA_HEADER, self.schema.as_deref().unwrap_or(""))?;
        set(TRINO_SESSION_HEADER, &session_header_value(&self.session_properties))?;
        set(TRINO_CLIENT_TAGS_HEADER, &self.client_tags.join(","))?;
        set(TRINO_CLIENT_INFO_HEADER, self.client_info.as_deref().unwrap_or(""))?;
        set(TRINO_ROLE_HEADER, &role_header_value(&roles))?;
        set(
            TRINO_ENCODING_HEADER,
            &spooling.encoding_header().unwrap_or_default(),
        )?;

        Ok(ResolvedQuery {
            submit_headers,
            poll_headers,
            spooling,
            progress,
            timeout: options.timeout.or(self.query_timeout),
            cancel: options.cancel.unwrap_or_default(),
        })
    }
}

fn validate_progress(
    callback: Option<&Arc<dyn ProgressUpdater>>,
    period: Option<Duration>,
) -> Result<()> {
    if callback.is_some() && period.map_or(true, |p| p.is_zero()) {
        return Err(Error::config(
            "progress callback requires a positive callback period",
        ));
    }
    Ok(())
}

fn extra_headers(headers: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::config(format!("invalid header name {:?}: {}", name, e)))?;
        let value = header_value(&name, value)?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Per-query overrides of [`Config`].
#[derive(Clone, Default)]
pub struct QueryOptions {
    /// Impersonated user.
    pub user: Option<String>,
    /// Merged over the configured roles.
    pub roles: BTreeMap<String, String>,
    pub encodings: Option<Vec<Encoding>>,
    pub spooling_worker_count: Option<usize>,
    pub max_out_of_order_segments: Option<usize>,
    pub progress_callback: Option<Arc<dyn ProgressUpdater>>,
    pub progress_callback_period: Option<Duration>,
    /// Forwarded as a bearer token.
    pub access_token: Option<String>,
    pub extra_headers: BTreeMap<String, String>,
    /// Cancelling this token aborts the query.
    pub cancel: Option<CancellationToken>,
    pub timeout: Option<Duration>,
}

impl fmt::Debug for QueryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryOptions")
            .field("user", &self.user)
            .field("roles", &self.roles)
            .field("encodings", &self.encodings)
            .field("spooling_worker_count", &self.spooling_worker_count)
            .field("max_out_of_order_segments", &self.max_out_of_order_segments)
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// A query's effective settings.
#[derive(Clone)]
pub(crate) struct ResolvedQuery {
    pub submit_headers: HeaderMap,
    pub poll_headers: HeaderMap,
    pub spooling: SpoolingConfig,
    pub progress: Option<(Arc<dyn ProgressUpdater>, Duration)>,
    pub timeout: Option<Duration>,
    pub cancel: CancellationToken,
}

impl fmt::Debug for ResolvedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedQuery")
            .field("submit_headers", &self.submit_headers.keys().collect::<Vec<_>>())
            .field("poll_headers", &self.poll_headers.keys().collect::<Vec<_>>())
            .field("spooling", &self.spooling)
            .field("progress_period", &self.progress.as_ref().map(|(_, period)| period))
            .field("timeout", &self.timeout)
            .finish()
    }
}

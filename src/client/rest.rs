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

//! Statement protocol client.
//!
//! Implements [`StatementClient`] over the coordinator's REST endpoints:
//! `POST /v1/statement` to submit, `GET nextUri` to poll and
//! `DELETE nextUri` to cancel.

use crate::client::{HttpRequest, HttpResponse, StatementClient, TrinoHttpClient};
use crate::error::{Error, Result};
use crate::types::protocol::QueryResponse;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const TRINO_USER_HEADER: HeaderName = HeaderName::from_static("x-trino-user");
pub const TRINO_SOURCE_HEADER: HeaderName = HeaderName::from_static("x-trino-source");
pub const TRINO_CATALOG_HEADER: HeaderName = HeaderName::from_static("x-trino-catalog");
pub const TRINO_SCHEMA_HEADER: HeaderName = HeaderName::from_static("x-trino-schema");
pub const TRINO_SESSION_HEADER: HeaderName = HeaderName::from_static("x-trino-session");
pub const TRINO_CLIENT_TAGS_HEADER: HeaderName = HeaderName::from_static("x-trino-client-tags");
pub const TRINO_CLIENT_INFO_HEADER: HeaderName = HeaderName::from_static("x-trino-client-info");
pub const TRINO_ROLE_HEADER: HeaderName = HeaderName::from_static("x-trino-role");
pub const TRINO_ENCODING_HEADER: HeaderName =
    HeaderName::from_static("x-trino-query-data-encoding");
pub const TRINO_PREPARED_STATEMENT_HEADER: HeaderName =
    HeaderName::from_static("x-trino-prepared-statement");

/// Session-state headers this client does not track.
const UNSUPPORTED_RESPONSE_HEADERS: [&str; 4] = [
    "X-Trino-Set-Catalog",
    "X-Trino-Set-Schema",
    "X-Trino-Set-Path",
    "X-Trino-Set-Role",
];

/// REST client for the statement protocol.
#[derive(Debug)]
pub struct RestClient {
    http_client: Arc<TrinoHttpClient>,
    server_uri: String,
}

impl RestClient {
    pub fn new(http_client: Arc<TrinoHttpClient>, server_uri: impl Into<String>) -> Self {
        Self {
            http_client,
            server_uri: server_uri.into(),
        }
    }

    pub fn http_client(&self) -> &Arc<TrinoHttpClient> {
        &self.http_client
    }

    fn statement_url(&self) -> String {
        format!("{}/v1/statement", self.server_uri.trim_end_matches('/'))
    }

    fn parse_response(response: &HttpResponse, what: &str) -> Result<QueryResponse> {
        for name in UNSUPPORTED_RESPONSE_HEADERS {
            if response.headers.contains_key(name) {
                return Err(Error::UnsupportedHeader(name.to_string()));
            }
        }
        serde_json::from_slice(&response.body).map_err(|e| {
            Error::decode(
                "response",
                format!(
                    "Failed to parse {} response: {} - body: {}",
                    what,
                    e,
                    response.text()
                ),
            )
        })
    }
}

#[async_trait]
impl StatementClient for RestClient {
    async fn submit(
        &self,
        sql: &str,
        headers: &HeaderMap,
        cancel: &CancellationToken,
    ) -> Result<QueryResponse> {
        let url = self.statement_url();
        debug!("Submitting statement at {}: {}", url, sql);

        let mut headers = headers.clone();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        let request = HttpRequest::new(Method::POST, url)
            .with_headers(headers)
            .with_body(sql.as_bytes());

        let response = self.http_client.execute(request, cancel).await?;
        let page = Self::parse_response(&response, "submit")?;
        debug!(
            "Submit response: id={}, next_uri={:?}",
            page.id, page.next_uri
        );
        Ok(page)
    }

    async fn poll(
        &self,
        next_uri: &str,
        headers: &HeaderMap,
        cancel: &CancellationToken,
    ) -> Result<QueryResponse> {
        let request = HttpRequest::new(Method::GET, next_uri).with_headers(headers.clone());
        let response = self.http_client.execute(request, cancel).await?;
        Self::parse_response(&response, "poll")
    }

    async fn cancel(&self, next_uri: &str, headers: &HeaderMap) {
        debug!("Cancelling statement at {}", next_uri);
        let request = HttpRequest::new(Method::DELETE, next_uri).with_headers(headers.clone());
        // The caller's token is usually already cancelled here.
        if let Err(e) = self
            .http_client
            .execute(request, &CancellationToken::new())
            .await
        {
            debug!("Ignoring cancel failure for {}: {}", next_uri, e);
        }
    }
}

/// `k=v` pairs joined with `,` as used by the session header.
pub(crate) fn session_header_value(properties: &BTreeMap<String, String>) -> String {
    properties
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// `catalog=ROLE{role}` pairs; `ALL` and `NONE` are sent verbatim.
pub(crate) fn role_header_value(roles: &BTreeMap<String, String>) -> String {
    roles
        .iter()
        .map(|(catalog, role)| {
            if role == "ALL" || role == "NONE" {
                format!("{}={}", catalog, role)
            } else {
                format!("{}=ROLE{{{}}}", catalog, url_encode(role))
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Form-encode a header component (space becomes `+`).
pub(crate) fn url_encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

pub(crate) fn header_value(name: &HeaderName, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| Error::config(format!("invalid value for header {}: {}", name, e)))
}

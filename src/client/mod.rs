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

//! Client implementations for communicating with a Trino coordinator.
//!
//! This module provides:
//! - `HttpRequester` trait: the transport capability (method, URL, headers,
//!   body in; status, headers, body out)
//! - `TrinoHttpClient`: retry, backoff and cancellation on top of a requester
//! - `StatementClient` trait and `RestClient`: the statement protocol
//!   (submit, poll `nextUri`, cancel)

pub mod http;
pub mod rest;

use crate::error::Result;
use crate::types::protocol::QueryResponse;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use tokio_util::sync::CancellationToken;

pub use http::{HttpClientConfig, ReqwestRequester, TrinoHttpClient};
pub use rest::RestClient;

/// A transport-level request. Cheap to clone so it can be replayed on retry.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// A fully-read response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Transport capability consumed by the client.
///
/// Implementations return [`crate::Error::Transport`] for failures that may
/// succeed on retry (connect, timeout, reset); any other error is terminal.
/// A non-success status is not an error at this level.
#[async_trait]
pub trait HttpRequester: Send + Sync + std::fmt::Debug {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Statement protocol operations against a coordinator.
#[async_trait]
pub trait StatementClient: Send + Sync + std::fmt::Debug {
    /// POST the statement text; returns the first page.
    async fn submit(
        &self,
        sql: &str,
        headers: &HeaderMap,
        cancel: &CancellationToken,
    ) -> Result<QueryResponse>;

    /// GET the page at `next_uri`.
    async fn poll(
        &self,
        next_uri: &str,
        headers: &HeaderMap,
        cancel: &CancellationToken,
    ) -> Result<QueryResponse>;

    /// DELETE `next_uri`. Best effort; errors are logged, not returned.
    async fn cancel(&self, next_uri: &str, headers: &HeaderMap);
}

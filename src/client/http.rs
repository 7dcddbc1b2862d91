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

//! HTTP client implementation for the Trino REST protocol.
//!
//! This module provides:
//! - `ReqwestRequester`: the default [`HttpRequester`] (connection pooling,
//!   timeouts, user agent)
//! - `TrinoHttpClient`: automatic retry with capped exponential backoff,
//!   authentication and cancellation on top of any requester

use crate::auth::AuthProvider;
use crate::client::{HttpRequest, HttpRequester, HttpResponse};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Configuration for the HTTP client.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Connection timeout duration.
    pub connect_timeout: Duration,
    /// Timeout of a single request attempt.
    pub timeout: Duration,
    /// Maximum number of retry attempts after the first.
    pub max_retries: u32,
    /// Base delay between retry attempts (doubles each retry).
    pub retry_delay: Duration,
    /// Upper bound for the backoff delay.
    pub max_retry_delay: Duration,
    /// Maximum number of idle connections per host.
    pub max_connections_per_host: usize,
    /// User agent string.
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            timeout: Duration::from_secs(60),
            max_retries: 5,
            retry_delay: Duration::from_millis(100),
            max_retry_delay: Duration::from_secs(2),
            max_connections_per_host: 100,
            user_agent: format!("trino-rust-client/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// [`HttpRequester`] backed by a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestRequester {
    client: Client,
}

impl ReqwestRequester {
    pub fn new(config: &HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .pool_max_idle_per_host(config.max_connections_per_host)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| Error::config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Returns the underlying reqwest client.
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl HttpRequester for ReqwestRequester {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut builder = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        let request = builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build request: {}", e)))?;

        let response = self.client.execute(request).await.map_err(transport_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(transport_error)?;
        Ok(HttpResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}

fn transport_error(error: reqwest::Error) -> Error {
    Error::Transport {
        attempts: 1,
        message: error.to_string(),
    }
}

/// HTTP client for communicating with Trino coordinators and spooling storage.
///
/// This client handles:
/// - Automatic retry with exponential backoff for transient failures
/// - `Authorization` header injection for coordinator requests
/// - Prompt abort when the caller's cancellation token fires
#[derive(Debug)]
pub struct TrinoHttpClient {
    requester: Arc<dyn HttpRequester>,
    config: HttpClientConfig,
    auth_provider: Arc<dyn AuthProvider>,
}

impl TrinoHttpClient {
    pub fn new(
        requester: Arc<dyn HttpRequester>,
        config: HttpClientConfig,
        auth_provider: Arc<dyn AuthProvider>,
    ) -> Self {
        Self {
            requester,
            config,
            auth_provider,
        }
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Execute a coordinator request with retry and authentication.
    ///
    /// An `Authorization` header already present on the request (a per-query
    /// token) takes precedence over the configured provider.
    ///
    /// Retries are performed for:
    /// - Transport errors
    /// - 502 Bad Gateway
    /// - 503 Service Unavailable
    /// - 504 Gateway Timeout
    ///
    /// Any other non-success status is returned immediately as [`Error::Http`].
    pub async fn execute(
        &self,
        mut request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse> {
        if !request.headers.contains_key(AUTHORIZATION) {
            if let Some(value) = self.auth_provider.get_auth_header()? {
                let value = HeaderValue::from_str(&value)
                    .map_err(|e| Error::config(format!("invalid authorization header: {}", e)))?;
                request.headers.insert(AUTHORIZATION, value);
            }
        }
        self.execute_impl(request, cancel).await
    }

    /// Execute a request without authentication (spooled segment downloads).
    ///
    /// Segment URIs carry their own credentials in the URI or in the
    /// headers the server attached to the segment.
    pub async fn execute_without_auth(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse> {
        self.execute_impl(request, cancel).await
    }

    async fn execute_impl(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            debug!(
                "Executing {} {} (attempt {}/{})",
                request.method,
                request.url,
                attempts,
                self.config.max_retries + 1
            );

            // Each attempt replays a fresh copy of the request.
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(Error::cancelled(format!("{} {} aborted", request.method, request.url)));
                }
                outcome = self.requester.send(request.clone()) => outcome,
            };

            match outcome {
                Ok(response) => {
                    let status = response.status;

                    if status.is_success() {
                        return Ok(response);
                    }

                    if Self::is_retryable_status(status) && attempts <= self.config.max_retries {
                        warn!(
                            "Request failed with {} (attempt {}/{}), retrying...",
                            status,
                            attempts,
                            self.config.max_retries + 1
                        );
                        self.wait_for_retry(attempts, cancel).await?;
                        continue;
                    }

                    return Err(Error::Http {
                        status,
                        body: response.text(),
                    });
                }
                Err(Error::Transport { message, .. }) => {
                    if attempts <= self.config.max_retries {
                        warn!(
                            "Request failed with error (attempt {}/{}): {}, retrying...",
                            attempts,
                            self.config.max_retries + 1,
                            message
                        );
                        self.wait_for_retry(attempts, cancel).await?;
                        continue;
                    }

                    return Err(Error::Transport { attempts, message });
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// Check if the HTTP status code indicates a retryable error.
    fn is_retryable_status(status: StatusCode) -> bool {
        matches!(
            status,
            StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT | StatusCode::BAD_GATEWAY
        )
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let delay = self.config.retry_delay * 2u32.saturating_pow(attempt.saturating_sub(1));
        delay.min(self.config.max_retry_delay)
    }

    /// Wait with exponential backoff before retry.
    async fn wait_for_retry(&self, attempt: u32, cancel: &CancellationToken) -> Result<()> {
        let delay = self.retry_delay(attempt);
        debug!("Waiting {:?} before retry", delay);
        tokio::select! {
            _ = cancel.cancelled() => Err(Error::cancelled("cancelled while waiting to retry")),
            _ = sleep(delay) => Ok(()),
        }
    }
}

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

//! Segment loading: fetch (for spooled segments) and decode.

use crate::client::{HttpRequest, TrinoHttpClient};
use crate::error::{Error, Result};
use crate::reader::spooling::decoder::decode_segment;
use crate::types::protocol::RawRow;
use crate::types::spooling::{Encoding, SegmentDescriptor, SegmentSource};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Downloads the payload of a spooled segment.
#[async_trait]
pub trait SegmentFetcher: Send + Sync + std::fmt::Debug {
    /// GET `uri` with `headers` attached verbatim and return the body.
    async fn fetch(
        &self,
        uri: &str,
        headers: &HeaderMap,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>>;
}

/// Fetches segments over HTTP without coordinator credentials.
#[derive(Debug)]
pub struct HttpSegmentFetcher {
    http_client: Arc<TrinoHttpClient>,
}

impl HttpSegmentFetcher {
    pub fn new(http_client: Arc<TrinoHttpClient>) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl SegmentFetcher for HttpSegmentFetcher {
    async fn fetch(
        &self,
        uri: &str,
        headers: &HeaderMap,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let start = Instant::now();
        let request = HttpRequest::new(Method::GET, uri).with_headers(headers.clone());
        let response = self
            .http_client
            .execute_without_auth(request, cancel)
            .await?;
        debug!(
            "Downloaded segment {}: {} bytes in {:.2}s",
            uri,
            response.body.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(response.body)
    }
}

/// Turns a [`SegmentDescriptor`] into rows.
#[derive(Debug)]
pub struct SegmentLoader {
    fetcher: Arc<dyn SegmentFetcher>,
    encoding: Encoding,
}

impl SegmentLoader {
    pub fn new(fetcher: Arc<dyn SegmentFetcher>, encoding: Encoding) -> Self {
        Self { fetcher, encoding }
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub async fn load(
        &self,
        descriptor: &SegmentDescriptor,
        cancel: &CancellationToken,
    ) -> Result<Vec<RawRow>> {
        match &descriptor.source {
            SegmentSource::Inline(data) => {
                let payload = STANDARD.decode(data.as_bytes()).map_err(|e| {
                    Error::decode(
                        format!("segment at row offset {}", descriptor.row_offset()),
                        format!("invalid base64 in inline segment: {}", e),
                    )
                })?;
                decode_segment(self.encoding, &payload, &descriptor.metadata)
            }
            SegmentSource::Spooled { uri, headers } => {
                let headers = segment_headers(headers)?;
                let uri = uri.as_deref().ok_or_else(|| {
                    Error::decode(
                        format!("segment at row offset {}", descriptor.row_offset()),
                        "spooled segment has no uri",
                    )
                })?;
                let payload = self.fetcher.fetch(uri, &headers, cancel).await?;
                decode_segment(self.encoding, &payload, &descriptor.metadata)
            }
        }
    }
}

/// Build the request headers of a spooled segment.
///
/// Each header must carry exactly one value.
pub(crate) fn segment_headers(headers: &HashMap<String, Vec<String>>) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, values) in headers {
        let value = match values.as_slice() {
            [value] => value,
            [] => return Err(Error::config(format!("no value for header {}", name))),
            _ => {
                return Err(Error::config(format!(
                    "multiple values for header {}",
                    name
                )))
            }
        };
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::config(format!("invalid segment header {}: {}", name, e)))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|e| Error::config(format!("invalid value for header {}: {}", name, e)))?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::protocol::SegmentMetadata;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct RecordingFetcher {
        calls: AtomicUsize,
        headers: Mutex<Option<HeaderMap>>,
    }

    #[async_trait]
    impl SegmentFetcher for RecordingFetcher {
        async fn fetch(
            &self,
            _uri: &str,
            headers: &HeaderMap,
            _cancel: &CancellationToken,
        ) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.headers.lock().unwrap() = Some(headers.clone());
            Ok(b"[[1000],[10001]]".to_vec())
        }
    }

    fn spooled(uri: Option<&str>, headers: HashMap<String, Vec<String>>) -> SegmentDescriptor {
        SegmentDescriptor {
            index: 0,
            source: SegmentSource::Spooled {
                uri: uri.map(str::to_string),
                headers,
            },
            metadata: SegmentMetadata {
                segment_size: 16,
                row_offset: 4,
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_spooled_segment_headers_are_forwarded() {
        let fetcher = Arc::new(RecordingFetcher::default());
        let loader = SegmentLoader::new(fetcher.clone(), Encoding::Json);
        let headers = HashMap::from([(
            "x-amz-server-side-encryption-customer-algorithm".to_string(),
            vec!["AES256".to_string()],
        )]);
        let rows = loader
            .load(
                &spooled(Some("http://storage/v1/spooled/download/1"), headers),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);

        let seen = fetcher.headers.lock().unwrap().clone().unwrap();
        assert_eq!(
            seen.get("x-amz-server-side-encryption-customer-algorithm")
                .unwrap(),
            "AES256"
        );
    }

    #[tokio::test]
    async fn test_duplicate_header_values_fail_before_fetch() {
        let fetcher = Arc::new(RecordingFetcher::default());
        let loader = SegmentLoader::new(fetcher.clone(), Encoding::JsonZstd);
        let headers = HashMap::from([(
            "x-amz-server-side-encryption-customer-key-md5".to_string(),
            vec!["md5".to_string(), "md5".to_string()],
        )]);
        let err = loader
            .load(&spooled(None, headers), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "trino: multiple values for header x-amz-server-side-encryption-customer-key-md5"
        );
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_uri_is_a_decode_error() {
        let loader = SegmentLoader::new(Arc::new(RecordingFetcher::default()), Encoding::Json);
        let err = loader
            .load(&spooled(None, HashMap::new()), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("row offset 4"));
        assert!(err.to_string().contains("no uri"));
    }

    #[tokio::test]
    async fn test_inline_segment_does_not_fetch() {
        let fetcher = Arc::new(RecordingFetcher::default());
        let loader = SegmentLoader::new(fetcher.clone(), Encoding::Json);
        let descriptor = SegmentDescriptor {
            index: 0,
            source: SegmentSource::Inline("W1sxXV0=".to_string()),
            metadata: SegmentMetadata {
                segment_size: 5,
                ..Default::default()
            },
        };
        let rows = loader
            .load(&descriptor, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(rows, vec![vec![serde_json::json!(1)]]);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_inline_segment_with_invalid_base64_is_a_decode_error() {
        let loader = SegmentLoader::new(Arc::new(RecordingFetcher::default()), Encoding::Json);
        let descriptor = SegmentDescriptor {
            index: 1,
            source: SegmentSource::Inline("!!!".to_string()),
            metadata: SegmentMetadata {
                segment_size: 3,
                row_offset: 7,
                ..Default::default()
            },
        };
        let err = loader
            .load(&descriptor, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Decode);
        assert!(err.to_string().contains("row offset 7"));
    }
}

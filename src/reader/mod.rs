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

//! Result readers for the rows of a statement page.
//!
//! This module provides:
//! - `ResultReaderFactory`: creates the appropriate reader for a page's data
//! - `PageReader`: yields the raw rows of one page, inline or spooled
//! - `spooling`: the segment download pipeline behind spooled pages

pub mod spooling;

use crate::error::Result;
use crate::reader::spooling::{DeliveredSegment, SegmentFetcher, SpooledSegments};
use crate::types::protocol::{QueryData, RawRow};
use crate::types::spooling::{Encoding, SegmentDescriptor, SpoolingConfig};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Factory that creates the appropriate reader for a page's `data` field.
#[derive(Debug)]
pub struct ResultReaderFactory {
    fetcher: Arc<dyn SegmentFetcher>,
    config: SpoolingConfig,
}

impl ResultReaderFactory {
    pub fn new(fetcher: Arc<dyn SegmentFetcher>, config: SpoolingConfig) -> Self {
        Self { fetcher, config }
    }

    /// Create a reader for one page.
    ///
    /// Spooled pages start downloading immediately; `cancel` stops them.
    pub(crate) fn create_reader(
        &self,
        data: QueryData,
        cancel: &CancellationToken,
    ) -> Result<PageReader> {
        match data {
            QueryData::Rows(rows) => {
                debug!("Creating inline reader for {} rows", rows.len());
                Ok(PageReader::Inline(rows.into()))
            }
            QueryData::Spooled(spooled) => {
                let encoding: Encoding = spooled.encoding.parse()?;
                let descriptors: Vec<SegmentDescriptor> = spooled
                    .segments
                    .into_iter()
                    .enumerate()
                    .map(|(index, segment)| SegmentDescriptor::from_segment(index, segment))
                    .collect();
                debug!(
                    "Creating spooled reader for {} segments ({})",
                    descriptors.len(),
                    encoding
                );
                let segments = SpooledSegments::spawn(
                    descriptors,
                    encoding,
                    Arc::clone(&self.fetcher),
                    &self.config,
                    cancel,
                )?;
                Ok(PageReader::Spooled {
                    segments,
                    current: None,
                })
            }
        }
    }
}

/// Rows of one page.
#[derive(Debug)]
pub enum PageReader {
    Inline(VecDeque<RawRow>),
    Spooled {
        segments: SpooledSegments,
        current: Option<DeliveredSegment>,
    },
}

impl PageReader {
    /// The next row of the page, or `None` when the page is exhausted.
    pub async fn next_row(&mut self) -> Result<Option<RawRow>> {
        match self {
            PageReader::Inline(rows) => Ok(rows.pop_front()),
            PageReader::Spooled { segments, current } => loop {
                if let Some(row) = current.as_mut().and_then(DeliveredSegment::next_row) {
                    return Ok(Some(row));
                }
                // Release the exhausted segment's slot before waiting.
                *current = None;
                match segments.next_segment().await? {
                    Some(segment) => *current = Some(segment),
                    None => return Ok(None),
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::reader::spooling::segment_loader::SegmentFetcher;
    use async_trait::async_trait;
    use reqwest::header::HeaderMap;
    use serde_json::json;

    #[derive(Debug)]
    struct NoFetch;

    #[async_trait]
    impl SegmentFetcher for NoFetch {
        async fn fetch(
            &self,
            uri: &str,
            _headers: &HeaderMap,
            _cancel: &CancellationToken,
        ) -> Result<Vec<u8>> {
            panic!("unexpected fetch of {}", uri)
        }
    }

    fn factory() -> ResultReaderFactory {
        ResultReaderFactory::new(Arc::new(NoFetch), SpoolingConfig::default())
    }

    fn data(value: serde_json::Value) -> QueryData {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_inline_rows() {
        let mut reader = factory()
            .create_reader(data(json!([[1, "a"], [2, "b"]])), &CancellationToken::new())
            .unwrap();
        assert_eq!(reader.next_row().await.unwrap(), Some(vec![json!(1), json!("a")]));
        assert_eq!(reader.next_row().await.unwrap(), Some(vec![json!(2), json!("b")]));
        assert_eq!(reader.next_row().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_inline_segments_across_encodings() {
        let page = data(json!({
            "encoding": "json+zstd",
            "segments": [
                {
                    "type": "inline",
                    "data": "KLUv/QQAgQAAW1sxMDAwXSxbMTAwMDFdXZfUttw=",
                    "metadata": {"segmentSize": 29, "uncompressedSize": 16, "rowOffset": 0}
                },
                {
                    "type": "inline",
                    "data": "KLUv/QQAgQAAW1sxMDAwXSxbMTAwMDFdXZfUttw=",
                    "metadata": {"segmentSize": 29, "uncompressedSize": 16, "rowOffset": 2}
                }
            ]
        }));
        let mut reader = factory()
            .create_reader(page, &CancellationToken::new())
            .unwrap();
        let mut values = Vec::new();
        while let Some(row) = reader.next_row().await.unwrap() {
            values.push(row[0].as_i64().unwrap());
        }
        assert_eq!(values, vec![1000, 10001, 1000, 10001]);
    }

    #[tokio::test]
    async fn test_malformed_inline_segment_fails_after_earlier_rows() {
        let page = data(json!({
            "encoding": "json",
            "segments": [
                {
                    "type": "inline",
                    "data": "W1sxXV0=",
                    "metadata": {"segmentSize": 5, "rowOffset": 0}
                },
                {
                    "type": "inline",
                    "data": "!!!",
                    "metadata": {"segmentSize": 3, "rowOffset": 7}
                }
            ]
        }));
        let mut reader = factory()
            .create_reader(page, &CancellationToken::new())
            .unwrap();
        assert_eq!(reader.next_row().await.unwrap(), Some(vec![json!(1)]));
        let err = reader.next_row().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert!(err.to_string().contains("row offset 7"));
    }

    #[tokio::test]
    async fn test_unknown_encoding_is_rejected() {
        let page = data(json!({"encoding": "json+gzip", "segments": []}));
        let err = factory()
            .create_reader(page, &CancellationToken::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}

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

//! Spooling-specific types for segmented result downloads.
//!
//! These types are used by [`crate::reader::spooling`] to fetch and decode
//! the segments listed in a spooled page.

use crate::error::{Error, Result};
use crate::types::protocol::{Segment, SegmentMetadata};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Default number of concurrent segment downloads.
pub const DEFAULT_SPOOLING_WORKER_COUNT: usize = 5;

/// Default number of decoded segments allowed to wait for delivery.
pub const DEFAULT_MAX_OUT_OF_ORDER_SEGMENTS: usize = 10;

/// Configuration for the spooling downloader.
#[derive(Debug, Clone, PartialEq)]
pub struct SpoolingConfig {
    /// Number of worker tasks downloading segments concurrently.
    pub worker_count: usize,
    /// Maximum number of downloaded segments held before delivery.
    pub max_out_of_order_segments: usize,
    /// Encodings offered to the server, most preferred first. Empty disables
    /// spooling negotiation and the server answers with inline rows.
    pub encodings: Vec<Encoding>,
}

impl Default for SpoolingConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_SPOOLING_WORKER_COUNT,
            max_out_of_order_segments: DEFAULT_MAX_OUT_OF_ORDER_SEGMENTS,
            encodings: Vec::new(),
        }
    }
}

impl SpoolingConfig {
    /// Reject worker/slot combinations that cannot make progress.
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(Error::config("spooling worker count must be at least 1"));
        }
        if self.max_out_of_order_segments == 0 {
            return Err(Error::config(
                "max out of order segments must be at least 1",
            ));
        }
        if self.worker_count > self.max_out_of_order_segments {
            return Err(Error::config(format!(
                "spooling worker count ({}) must not exceed max out of order segments ({})",
                self.worker_count, self.max_out_of_order_segments
            )));
        }
        Ok(())
    }

    /// Value of the `X-Trino-Query-Data-Encoding` header, if any encoding is offered.
    pub fn encoding_header(&self) -> Option<String> {
        if self.encodings.is_empty() {
            return None;
        }
        Some(
            self.encodings
                .iter()
                .map(Encoding::as_str)
                .collect::<Vec<_>>()
                .join(","),
        )
    }
}

/// Result payload encoding negotiated with the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Json,
    JsonLz4,
    JsonZstd,
}

impl Encoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Json => "json",
            Encoding::JsonLz4 => "json+lz4",
            Encoding::JsonZstd => "json+zstd",
        }
    }

    pub fn is_compressed(&self) -> bool {
        !matches!(self, Encoding::Json)
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Encoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "json" => Ok(Encoding::Json),
            "json+lz4" => Ok(Encoding::JsonLz4),
            "json+zstd" => Ok(Encoding::JsonZstd),
            other => Err(Error::config(format!("unsupported encoding: {}", other))),
        }
    }
}

/// Where a segment's payload comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentSource {
    /// Base64 payload embedded in the page.
    Inline(String),
    /// Payload fetched with a GET to `uri`, attaching `headers` verbatim.
    Spooled {
        uri: Option<String>,
        headers: HashMap<String, Vec<String>>,
    },
}

/// A segment scheduled for download, tagged with its position in the page.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentDescriptor {
    /// Position in the page's segment list; defines delivery order.
    pub index: usize,
    pub source: SegmentSource,
    pub metadata: SegmentMetadata,
}

impl SegmentDescriptor {
    /// Convert from the wire representation.
    pub fn from_segment(index: usize, segment: Segment) -> Self {
        match segment {
            Segment::Inline { data, metadata } => Self {
                index,
                source: SegmentSource::Inline(data),
                metadata,
            },
            Segment::Spooled {
                uri,
                headers,
                metadata,
                ..
            } => Self {
                index,
                source: SegmentSource::Spooled { uri, headers },
                metadata,
            },
        }
    }

    pub fn row_offset(&self) -> i64 {
        self.metadata.row_offset
    }
}

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

//! Spooled result retrieval.
//!
//! A spooled page lists segments that are either inlined in the page or
//! stored externally. This module downloads them concurrently, decodes them
//! and hands their rows back in segment order:
//!
//! - `scheduler`: takes a download slot per segment and dispatches work
//! - `download_workers`: fetch and decode segments in parallel
//! - `provider`: the ordered consumer ([`SpooledSegments`])
//! - `decoder`: `json`, `json+lz4` and `json+zstd` payload decoding

pub mod decoder;
pub mod download_workers;
pub mod pipeline_types;
pub mod provider;
pub mod scheduler;
pub mod segment_loader;

pub use decoder::decode_segment;
pub use pipeline_types::DeliveredSegment;
pub use provider::SpooledSegments;
pub use segment_loader::{HttpSegmentFetcher, SegmentFetcher, SegmentLoader};

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

//! Segment payload decoding.
//!
//! The transmitted size is always checked against `segmentSize` first. For
//! compressed encodings the payload is then decompressed (`json+lz4` is a raw
//! LZ4 block, `json+zstd` a zstd frame) and checked against
//! `uncompressedSize`. The result is parsed as a JSON array of rows.

use crate::error::{Error, Result};
use crate::types::protocol::{RawRow, SegmentMetadata};
use crate::types::spooling::Encoding;
use std::borrow::Cow;
use tracing::trace;

/// Largest buffer tried when an LZ4 block overflows its declared size.
const MAX_LZ4_PROBE_BYTES: usize = 256 * 1024 * 1024;

/// Worst-case LZ4 expansion ratio.
const LZ4_MAX_RATIO: usize = 255;

/// Decode one segment payload into rows.
///
/// Errors are [`Error::Decode`] with the context `segment at row offset N`.
pub fn decode_segment(
    encoding: Encoding,
    payload: &[u8],
    metadata: &SegmentMetadata,
) -> Result<Vec<RawRow>> {
    let context = format!("segment at row offset {}", metadata.row_offset);

    if payload.len() as i64 != metadata.segment_size {
        return Err(Error::decode(
            context,
            format!(
                "segment size mismatch: expected {} bytes, got {} bytes",
                metadata.segment_size,
                payload.len()
            ),
        ));
    }

    let json: Cow<'_, [u8]> = match encoding {
        Encoding::Json => Cow::Borrowed(payload),
        Encoding::JsonLz4 | Encoding::JsonZstd => {
            let expected = metadata.uncompressed_size.ok_or_else(|| {
                Error::decode(
                    &context,
                    format!("{} segment is missing uncompressedSize", encoding),
                )
            })?;
            let decompressed = match encoding {
                Encoding::JsonLz4 => decompress_lz4(payload, expected),
                _ => zstd::stream::decode_all(payload).map_err(|e| e.to_string()),
            }
            .map_err(|e| Error::decode(&context, format!("{} decompression failed: {}", encoding, e)))?;

            if decompressed.len() as i64 != expected {
                return Err(Error::decode(
                    context,
                    format!(
                        "decompressed size mismatch: expected {} bytes, got {} bytes",
                        expected,
                        decompressed.len()
                    ),
                ));
            }
            Cow::Owned(decompressed)
        }
    };

    let rows: Vec<RawRow> = serde_json::from_slice(&json)
        .map_err(|e| Error::decode(&context, format!("malformed segment payload: {}", e)))?;
    trace!("Decoded {} rows at row offset {}", rows.len(), metadata.row_offset);
    Ok(rows)
}

/// Decompress a raw LZ4 block.
///
/// If the block does not fit in the declared size, decode again into a
/// worst-case buffer so the mismatch can report the real length.
fn decompress_lz4(payload: &[u8], expected: i64) -> std::result::Result<Vec<u8>, String> {
    let declared = usize::try_from(expected).map_err(|_| format!("invalid size {}", expected))?;
    match lz4_flex::block::decompress(payload, declared) {
        Ok(data) => Ok(data),
        Err(first) => {
            let probe = payload
                .len()
                .saturating_mul(LZ4_MAX_RATIO)
                .min(MAX_LZ4_PROBE_BYTES);
            if probe <= declared {
                return Err(first.to_string());
            }
            lz4_flex::block::decompress(payload, probe).map_err(|_| first.to_string())
        }
    }
}

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

//! Pipeline types for the two-channel spooling download pipeline.
//!
//! This module defines the types that flow through the download pipeline:
//! - `SegmentTask` - Sent through download_channel, owned by download workers
//! - `SegmentHandle` - Sent through result_channel in segment order, awaited by consumer
//!
//! ## Pipeline Architecture
//!
//! ```text
//! [Scheduler] --> download_channel --> [Download Workers]
//!      |                |                     |
//!      |          SegmentTask          (fetch + decode)
//!      |                                      |
//!      |                                      v
//!      +--> result_channel --> SegmentHandle (in order) --> [Consumer]
//! ```
//!
//! Each handle owns one download slot (a semaphore permit). The slot is
//! taken by the scheduler before the task is dispatched and travels with
//! the decoded rows until the consumer has read all of them.

use crate::error::Result;
use crate::types::protocol::RawRow;
use crate::types::spooling::SegmentDescriptor;
use std::collections::VecDeque;
use tokio::sync::{oneshot, OwnedSemaphorePermit};

/// A download task sent to download workers via download_channel.
///
/// The worker loads the segment described by `descriptor` and sends either
/// the decoded rows or the error through `result_tx`.
#[derive(Debug)]
pub struct SegmentTask {
    pub descriptor: SegmentDescriptor,
    pub result_tx: oneshot::Sender<Result<Vec<RawRow>>>,
}

/// A handle for the consumer to await one segment's rows.
///
/// Sent through `result_channel` in segment order so the consumer can await
/// results in the correct sequence regardless of download completion order.
#[derive(Debug)]
pub struct SegmentHandle {
    /// Position of the segment in the page.
    pub index: usize,
    pub row_offset: i64,
    pub result_rx: oneshot::Receiver<Result<Vec<RawRow>>>,
    /// Download slot held until the segment is fully delivered.
    pub slot: OwnedSemaphorePermit,
}

/// Creates a connected (SegmentTask, SegmentHandle) pair.
pub fn create_segment_pair(
    descriptor: SegmentDescriptor,
    slot: OwnedSemaphorePermit,
) -> (SegmentTask, SegmentHandle) {
    let (result_tx, result_rx) = oneshot::channel();

    let handle = SegmentHandle {
        index: descriptor.index,
        row_offset: descriptor.row_offset(),
        result_rx,
        slot,
    };

    let task = SegmentTask {
        descriptor,
        result_tx,
    };

    (task, handle)
}

/// A segment whose rows are being handed to the consumer.
///
/// Dropping it releases the download slot.
#[derive(Debug)]
pub struct DeliveredSegment {
    pub index: usize,
    pub row_offset: i64,
    rows: VecDeque<RawRow>,
    _slot: OwnedSemaphorePermit,
}

impl DeliveredSegment {
    pub(crate) fn new(
        index: usize,
        row_offset: i64,
        rows: Vec<RawRow>,
        slot: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            index,
            row_offset,
            rows: rows.into(),
            _slot: slot,
        }
    }

    pub fn next_row(&mut self) -> Option<RawRow> {
        self.rows.pop_front()
    }

    /// Rows not yet handed out.
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.rows.is_empty()
    }
}

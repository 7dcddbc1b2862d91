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

//! Scheduler for the spooling download pipeline.
//!
//! The scheduler walks a page's segments in order. For each one it takes a
//! download slot, creates a oneshot channel pair, sends the
//! [`SegmentHandle`] to the result channel and then the [`SegmentTask`] to
//! the download channel.
//!
//! ## Backpressure
//!
//! Slots come from a semaphore with `max_out_of_order_segments` permits. A
//! permit is only returned once the consumer has read every row of the
//! segment that holds it, so at most that many segments are ever in flight
//! or waiting for delivery. Slots are taken in segment order, so the next
//! segment due for delivery always has one.
//!
//! ## Ordering Invariant
//!
//! The scheduler always sends `SegmentHandle` to `result_channel` BEFORE
//! sending `SegmentTask` to `download_channel`, so the consumer receives
//! handles in segment order whatever order the downloads finish in.

use crate::reader::spooling::pipeline_types::{create_segment_pair, SegmentHandle, SegmentTask};
use crate::types::spooling::{SegmentDescriptor, SpoolingConfig};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Channels returned by the scheduler for consumption by other pipeline components.
pub struct SchedulerChannels {
    /// Download workers pull `SegmentTask` from this channel.
    pub download_rx: mpsc::UnboundedReceiver<SegmentTask>,
    /// The consumer pulls `SegmentHandle` from this channel in segment order.
    pub result_rx: mpsc::Receiver<SegmentHandle>,
    /// Download slots shared by the whole page.
    pub slots: Arc<Semaphore>,
    pub scheduler_handle: JoinHandle<()>,
}

/// Spawns the scheduler task and returns the pipeline channels.
///
/// The scheduler task runs until every segment has been enqueued, the
/// consumer goes away, or the cancellation token is triggered.
pub fn spawn_scheduler(
    segments: Vec<SegmentDescriptor>,
    config: &SpoolingConfig,
    cancel_token: CancellationToken,
) -> SchedulerChannels {
    let limit = config.max_out_of_order_segments;

    // download_channel is unbounded - backpressure comes from the slots
    let (download_tx, download_rx) = mpsc::unbounded_channel::<SegmentTask>();
    let (result_tx, result_rx) = mpsc::channel::<SegmentHandle>(limit);
    let slots = Arc::new(Semaphore::new(limit));

    debug!(
        "Spawning scheduler for {} segments with max_out_of_order_segments={}",
        segments.len(),
        limit
    );

    let scheduler_handle = tokio::spawn(scheduler_task(
        segments,
        Arc::clone(&slots),
        download_tx,
        result_tx,
        cancel_token,
    ));

    SchedulerChannels {
        download_rx,
        result_rx,
        slots,
        scheduler_handle,
    }
}

async fn scheduler_task(
    segments: Vec<SegmentDescriptor>,
    slots: Arc<Semaphore>,
    download_tx: mpsc::UnboundedSender<SegmentTask>,
    result_tx: mpsc::Sender<SegmentHandle>,
    cancel_token: CancellationToken,
) {
    debug!("Scheduler task started");

    for descriptor in segments {
        let index = descriptor.index;

        let slot = tokio::select! {
            _ = cancel_token.cancelled() => {
                debug!("Scheduler cancelled while waiting for a slot for segment {}", index);
                return;
            }
            slot = Arc::clone(&slots).acquire_owned() => match slot {
                Ok(slot) => slot,
                Err(_) => {
                    debug!("Scheduler: slot pool closed at segment {}", index);
                    return;
                }
            },
        };

        let (task, handle) = create_segment_pair(descriptor, slot);

        // Handle first: this is what keeps delivery in segment order.
        let send_result = tokio::select! {
            _ = cancel_token.cancelled() => {
                debug!("Scheduler cancelled while sending handle for segment {}", index);
                return;
            }
            result = result_tx.send(handle) => result,
        };
        if send_result.is_err() {
            debug!(
                "Scheduler: result channel closed, stopping at segment {}",
                index
            );
            return;
        }

        if download_tx.send(task).is_err() {
            debug!(
                "Scheduler: download channel closed, stopping at segment {}",
                index
            );
            return;
        }

        trace!("Scheduler: enqueued segment {} (handle first, then task)", index);
    }

    debug!("Scheduler task completed");
    // Channels are dropped here, signaling end of stream to workers and consumer
}

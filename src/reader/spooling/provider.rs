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

//! Ordered consumer for one spooled page.
//!
//! [`SpooledSegments`] wires the scheduler and download workers together and
//! hands decoded segments to the caller strictly in segment order. The
//! first failure in delivery order is terminal: the pipeline is cancelled
//! and every later call returns the same error.

use crate::error::{Error, Result};
use crate::reader::spooling::download_workers::spawn_download_workers;
use crate::reader::spooling::pipeline_types::DeliveredSegment;
use crate::reader::spooling::pipeline_types::SegmentHandle;
use crate::reader::spooling::scheduler::spawn_scheduler;
use crate::reader::spooling::segment_loader::{SegmentFetcher, SegmentLoader};
use crate::types::spooling::{Encoding, SegmentDescriptor, SpoolingConfig};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct SpooledSegments {
    result_rx: mpsc::Receiver<SegmentHandle>,
    cancel_token: CancellationToken,
    terminal_error: Option<Error>,
    finished: bool,
    segment_count: usize,
    delivered: usize,
    scheduler_handle: JoinHandle<()>,
    worker_handles: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for SpooledSegments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpooledSegments")
            .field("segment_count", &self.segment_count)
            .field("delivered", &self.delivered)
            .field("finished", &self.finished)
            .field("failed", &self.terminal_error.is_some())
            .finish()
    }
}

impl SpooledSegments {
    /// Start downloading `segments`.
    ///
    /// Fails with a configuration error, before any fetch, when the worker
    /// count exceeds the out-of-order limit. Cancelling `parent` cancels the
    /// pipeline. Must be called from within a tokio runtime.
    pub fn spawn(
        segments: Vec<SegmentDescriptor>,
        encoding: Encoding,
        fetcher: Arc<dyn SegmentFetcher>,
        config: &SpoolingConfig,
        parent: &CancellationToken,
    ) -> Result<Self> {
        config.validate()?;

        let segment_count = segments.len();
        let cancel_token = parent.child_token();
        let channels = spawn_scheduler(segments, config, cancel_token.clone());
        let loader = Arc::new(SegmentLoader::new(fetcher, encoding));
        let worker_handles = spawn_download_workers(
            channels.download_rx,
            config.worker_count,
            loader,
            cancel_token.clone(),
        );

        debug!(
            "Spooled page started: {} segments, {} workers, {} slots, encoding {}",
            segment_count, config.worker_count, config.max_out_of_order_segments, encoding
        );

        Ok(Self {
            result_rx: channels.result_rx,
            cancel_token,
            terminal_error: None,
            finished: false,
            segment_count,
            delivered: 0,
            scheduler_handle: channels.scheduler_handle,
            worker_handles,
        })
    }

    /// The next segment in order, or `None` once every segment was delivered.
    ///
    /// The returned segment holds a download slot until it is dropped.
    pub async fn next_segment(&mut self) -> Result<Option<DeliveredSegment>> {
        if let Some(e) = &self.terminal_error {
            return Err(e.clone());
        }
        if self.finished {
            return Ok(None);
        }

        let handle = tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => None,
            handle = self.result_rx.recv() => handle,
        };

        let Some(handle) = handle else {
            if self.cancel_token.is_cancelled() {
                return Err(self.fail(Error::cancelled("segment download cancelled")));
            }
            if self.delivered < self.segment_count {
                return Err(self.fail(Error::invalid_state(format!(
                    "segment pipeline closed after {} of {} segments",
                    self.delivered, self.segment_count
                ))));
            }
            debug!("Spooled page complete: {} segments", self.delivered);
            self.finished = true;
            return Ok(None);
        };

        let SegmentHandle {
            index,
            row_offset,
            result_rx,
            slot,
        } = handle;

        let result = tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => {
                return Err(self.fail(Error::cancelled("segment download cancelled")));
            }
            result = result_rx => result,
        };

        match result {
            Ok(Ok(rows)) => {
                self.delivered += 1;
                Ok(Some(DeliveredSegment::new(index, row_offset, rows, slot)))
            }
            Ok(Err(e)) => Err(self.fail(e)),
            Err(_) if self.cancel_token.is_cancelled() => {
                Err(self.fail(Error::cancelled("segment download cancelled")))
            }
            Err(_) => Err(self.fail(Error::invalid_state(format!(
                "download worker exited without a result for segment {}",
                index
            )))),
        }
    }

    fn fail(&mut self, error: Error) -> Error {
        debug!("Spooled page failed: {}", error);
        self.cancel_token.cancel();
        self.terminal_error = Some(error.clone());
        error
    }
}

impl Drop for SpooledSegments {
    fn drop(&mut self) {
        self.cancel_token.cancel();
        self.scheduler_handle.abort();
        for handle in &self.worker_handles {
            handle.abort();
        }
    }
}

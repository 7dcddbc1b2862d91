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

//! Download workers for the spooling pipeline.
//!
//! Workers are long-lived tokio tasks that pull [`SegmentTask`] from the
//! download channel, load and decode the segment through a
//! [`SegmentLoader`], and send the result through the task's oneshot
//! channel. Transport retries happen inside the HTTP client, so a worker
//! never retries on its own.

use crate::error::Error;
use crate::reader::spooling::pipeline_types::SegmentTask;
use crate::reader::spooling::segment_loader::SegmentLoader;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Spawns `worker_count` download workers sharing one download channel.
///
/// Returns the `JoinHandle`s of the spawned tasks.
pub fn spawn_download_workers(
    download_rx: mpsc::UnboundedReceiver<SegmentTask>,
    worker_count: usize,
    loader: Arc<SegmentLoader>,
    cancel_token: CancellationToken,
) -> Vec<JoinHandle<()>> {
    // Wrap the receiver in Arc<Mutex> so workers can share it
    let download_rx = Arc::new(tokio::sync::Mutex::new(download_rx));

    debug!(
        "Spawning {} download workers for encoding {}",
        worker_count,
        loader.encoding()
    );

    (0..worker_count)
        .map(|worker_id| {
            let rx = Arc::clone(&download_rx);
            let loader = Arc::clone(&loader);
            let token = cancel_token.clone();
            tokio::spawn(async move {
                worker_task(worker_id, rx, loader, token).await;
            })
        })
        .collect()
}

/// Runs until the download channel closes or the token is cancelled.
async fn worker_task(
    worker_id: usize,
    download_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<SegmentTask>>>,
    loader: Arc<SegmentLoader>,
    cancel_token: CancellationToken,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if cancel_token.is_cancelled() {
            debug!("Worker {} cancelled", worker_id);
            break;
        }

        let task = {
            let mut rx = download_rx.lock().await;
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    debug!("Worker {} cancelled while waiting for task", worker_id);
                    return;
                }
                task = rx.recv() => task
            }
        };

        let Some(task) = task else {
            debug!("Worker {} exiting: download channel closed", worker_id);
            break;
        };

        let index = task.descriptor.index;
        trace!("Worker {} received task for segment {}", worker_id, index);

        let start = Instant::now();
        let result = tokio::select! {
            _ = cancel_token.cancelled() => Err(Error::cancelled("segment download cancelled")),
            result = loader.load(&task.descriptor, &cancel_token) => result,
        };

        match &result {
            Ok(rows) => trace!(
                "Worker {}: segment {} decoded {} rows in {:?}",
                worker_id,
                index,
                rows.len(),
                start.elapsed()
            ),
            Err(e) if e.is_cancelled() => {
                debug!("Worker {}: segment {} cancelled", worker_id, index)
            }
            Err(e) => warn!("Worker {}: segment {} failed: {}", worker_id, index, e),
        }

        // Receiver may have been dropped (consumer cancelled)
        if task.result_tx.send(result).is_err() {
            debug!(
                "Worker {}: result receiver dropped for segment {}",
                worker_id, index
            );
        }
    }

    debug!("Worker {} exiting", worker_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::reader::spooling::pipeline_types::create_segment_pair;
    use crate::reader::spooling::segment_loader::SegmentFetcher;
    use crate::types::protocol::SegmentMetadata;
    use crate::types::spooling::{Encoding, SegmentDescriptor, SegmentSource};
    use async_trait::async_trait;
    use reqwest::header::HeaderMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Semaphore;
    use tokio::time::timeout;

    /// Serves `[[n]]` where n is the last path component.
    #[derive(Debug, Default)]
    struct NumberFetcher {
        fetch_count: AtomicUsize,
        fail_on: Option<usize>,
        delay: Duration,
    }

    #[async_trait]
    impl SegmentFetcher for NumberFetcher {
        async fn fetch(
            &self,
            uri: &str,
            _headers: &HeaderMap,
            _cancel: &CancellationToken,
        ) -> Result<Vec<u8>> {
            self.fetch_count.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            let n: usize = uri.rsplit('/').next().unwrap().parse().unwrap();
            if self.fail_on == Some(n) {
                return Err(Error::Http {
                    status: reqwest::StatusCode::NOT_FOUND,
                    body: "gone".to_string(),
                });
            }
            Ok(format!("[[{}]]", n).into_bytes())
        }
    }

    fn descriptor(index: usize) -> SegmentDescriptor {
        let payload_len = format!("[[{}]]", index).len() as i64;
        SegmentDescriptor {
            index,
            source: SegmentSource::Spooled {
                uri: Some(format!("http://storage/segment/{}", index)),
                headers: Default::default(),
            },
            metadata: SegmentMetadata {
                segment_size: payload_len,
                row_offset: index as i64,
                rows_count: Some(1),
                ..Default::default()
            },
        }
    }

    fn task_and_handle(
        index: usize,
    ) -> (
        SegmentTask,
        crate::reader::spooling::pipeline_types::SegmentHandle,
    ) {
        let slot = Arc::new(Semaphore::new(1)).try_acquire_owned().unwrap();
        create_segment_pair(descriptor(index), slot)
    }

    #[tokio::test]
    async fn test_workers_deliver_results_through_oneshot() {
        let fetcher = Arc::new(NumberFetcher::default());
        let loader = Arc::new(SegmentLoader::new(fetcher.clone(), Encoding::Json));
        let (tx, rx) = mpsc::unbounded_channel();
        let handles = spawn_download_workers(rx, 3, loader, CancellationToken::new());

        let mut results = Vec::new();
        for i in 0..6 {
            let (task, handle) = task_and_handle(i);
            tx.send(task).unwrap();
            results.push(handle);
        }
        drop(tx);

        for (i, handle) in results.into_iter().enumerate() {
            let rows = handle.result_rx.await.unwrap().unwrap();
            assert_eq!(rows, vec![vec![serde_json::json!(i)]]);
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(fetcher.fetch_count.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_worker_forwards_errors() {
        let fetcher = Arc::new(NumberFetcher {
            fail_on: Some(1),
            ..Default::default()
        });
        let loader = Arc::new(SegmentLoader::new(fetcher, Encoding::Json));
        let (tx, rx) = mpsc::unbounded_channel();
        let _handles = spawn_download_workers(rx, 1, loader, CancellationToken::new());

        let (task, handle) = task_and_handle(1);
        tx.send(task).unwrap();
        let err = handle.result_rx.await.unwrap().unwrap_err();
        assert!(err.to_string().contains("404 Not Found"));
    }

    #[tokio::test]
    async fn test_cancellation_stops_workers() {
        let fetcher = Arc::new(NumberFetcher {
            delay: Duration::from_secs(30),
            ..Default::default()
        });
        let loader = Arc::new(SegmentLoader::new(fetcher, Encoding::Json));
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handles = spawn_download_workers(rx, 2, loader, cancel.clone());

        let (task, handle) = task_and_handle(0);
        tx.send(task).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let result = timeout(Duration::from_secs(1), handle.result_rx)
            .await
            .unwrap()
            .unwrap();
        assert!(result.unwrap_err().is_cancelled());
        for handle in handles {
            timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        }
    }
}

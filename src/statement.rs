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

//! Statement lifecycle: submit, poll `nextUri`, complete or fail.
//!
//! A [`Statement`] is driven by its single consumer. Every network wait is
//! raced against the caller's cancellation token and the query deadline;
//! when either fires, the statement stops, issues a best-effort `DELETE` to
//! the current `nextUri` and reports [`Error::Cancelled`].
//!
//! Polling is a plain loop: a query that needs hundreds of empty pages
//! before producing data does not grow the stack.

use crate::client::StatementClient;
use crate::config::{ProgressUpdater, QueryProgressInfo, ResolvedQuery};
use crate::convert::ColumnInfo;
use crate::error::{Error, Result};
use crate::reader::{PageReader, ResultReaderFactory};
use crate::types::protocol::{QueryResponse, RawRow, ServerError, Warning};
use crate::types::QueryStats;
use reqwest::header::HeaderMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Server error names reported for a query cancelled by its user.
const USER_CANCELLED_ERROR_NAMES: [&str; 2] = ["USER_CANCELED", "USER_CANCELLED"];

/// Lifecycle state of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementState {
    /// Submitted; the server still lists a `nextUri`.
    Polling,
    Completed,
    Failed,
    Cancelled,
}

impl StatementState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StatementState::Polling)
    }
}

/// Rate-limited progress reporting.
struct ProgressReporter {
    updater: Arc<dyn ProgressUpdater>,
    period: Duration,
    last_report: Option<Instant>,
}

impl ProgressReporter {
    fn report(&mut self, query_id: &str, stats: &QueryStats, terminal: bool) {
        let now = Instant::now();
        let due = self
            .last_report
            .map_or(true, |last| now.duration_since(last) >= self.period);
        if !due && !terminal {
            return;
        }
        self.last_report = Some(now);
        self.updater.update(QueryProgressInfo {
            query_id: query_id.to_string(),
            stats: stats.clone(),
        });
    }
}

/// A submitted query.
pub struct Statement {
    client: Arc<dyn StatementClient>,
    reader_factory: ResultReaderFactory,
    poll_headers: HeaderMap,
    cancel_token: CancellationToken,
    deadline: Option<Instant>,
    progress: Option<ProgressReporter>,

    state: StatementState,
    query_id: String,
    next_uri: Option<String>,
    columns: Option<Arc<Vec<ColumnInfo>>>,
    stats: Option<QueryStats>,
    warnings: Vec<Warning>,
    update_type: Option<String>,
    update_count: Option<i64>,
    page: Option<PageReader>,
    terminal_error: Option<Error>,
    poll_count: usize,
}

impl std::fmt::Debug for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("query_id", &self.query_id)
            .field("state", &self.state)
            .field("next_uri", &self.next_uri)
            .field("poll_count", &self.poll_count)
            .finish()
    }
}

impl Statement {
    /// POST `sql` and process the first page.
    pub(crate) async fn submit(
        client: Arc<dyn StatementClient>,
        reader_factory: ResultReaderFactory,
        sql: &str,
        query: ResolvedQuery,
    ) -> Result<Self> {
        let deadline = query.timeout.map(|timeout| Instant::now() + timeout);
        let progress = query
            .progress
            .map(|(updater, period)| ProgressReporter {
                updater,
                period,
                last_report: None,
            });

        let mut statement = Self {
            client,
            reader_factory,
            poll_headers: query.poll_headers,
            cancel_token: query.cancel.child_token(),
            deadline,
            progress,
            state: StatementState::Polling,
            query_id: String::new(),
            next_uri: None,
            columns: None,
            stats: None,
            warnings: Vec::new(),
            update_type: None,
            update_count: None,
            page: None,
            terminal_error: None,
            poll_count: 0,
        };

        let cancel = statement.cancel_token.clone();
        let submitted = guard(
            &cancel,
            deadline,
            statement.client.submit(sql, &query.submit_headers, &cancel),
        )
        .await;
        let response = match submitted {
            Ok(response) => response,
            Err(e) => return Err(statement.fail(e)),
        };
        debug!("Statement submitted: query_id={}", response.id);

        statement.apply_page(response)?;
        Ok(statement)
    }

    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    pub fn state(&self) -> StatementState {
        self.state
    }

    /// Columns, once the server has sent them.
    pub fn columns(&self) -> Option<&Arc<Vec<ColumnInfo>>> {
        self.columns.as_ref()
    }

    /// Statistics of the latest page.
    pub fn stats(&self) -> Option<&QueryStats> {
        self.stats.as_ref()
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn update_type(&self) -> Option<&str> {
        self.update_type.as_deref()
    }

    pub fn update_count(&self) -> Option<i64> {
        self.update_count
    }

    /// Number of `nextUri` requests issued so far.
    pub fn poll_count(&self) -> usize {
        self.poll_count
    }

    /// The next raw row, polling further pages as needed.
    ///
    /// `None` means the statement completed and every row was delivered.
    pub async fn next_row(&mut self) -> Result<Option<RawRow>> {
        loop {
            if let Some(e) = &self.terminal_error {
                return Err(e.clone());
            }

            if let Some(page) = self.page.as_mut() {
                let cancel = self.cancel_token.clone();
                match guard(&cancel, self.deadline, page.next_row()).await {
                    Ok(Some(row)) => return Ok(Some(row)),
                    Ok(None) => self.page = None,
                    Err(e) => return Err(self.fail(e)),
                }
                continue;
            }

            if self.state.is_terminal() {
                return Ok(None);
            }
            self.poll().await?;
        }
    }

    /// Read and discard every remaining row.
    pub async fn drain(&mut self) -> Result<()> {
        while self.next_row().await?.is_some() {}
        Ok(())
    }

    /// Stop the statement. A running query is cancelled on the server.
    pub fn close(&mut self) {
        if !self.state.is_terminal() || self.page.is_some() {
            self.abort(Error::cancelled("statement closed"));
        }
    }

    /// Fetch the page at `nextUri`.
    async fn poll(&mut self) -> Result<()> {
        let Some(next_uri) = self.next_uri.clone() else {
            return Err(self.fail(Error::invalid_state(
                "statement is polling without a next uri",
            )));
        };
        self.poll_count += 1;

        let cancel = self.cancel_token.clone();
        let polled = guard(
            &cancel,
            self.deadline,
            self.client.poll(&next_uri, &self.poll_headers, &cancel),
        )
        .await;
        match polled {
            Ok(response) => self.apply_page(response),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Fold one response into the statement state.
    fn apply_page(&mut self, response: QueryResponse) -> Result<()> {
        if !response.id.is_empty() {
            self.query_id = response.id;
        }
        self.next_uri = response.next_uri;
        if !response.warnings.is_empty() {
            for warning in &response.warnings {
                warn!("Query {} warning: {}", self.query_id, warning.message);
            }
            self.warnings = response.warnings;
        }
        let has_stats = response.stats.is_some();
        if has_stats {
            self.stats = response.stats;
        }
        if response.update_type.is_some() {
            self.update_type = response.update_type;
        }
        if response.update_count.is_some() {
            self.update_count = response.update_count;
        }

        if let Some(error) = response.error {
            // The server already ended the query.
            self.next_uri = None;
            return Err(self.fail(query_error(error)));
        }

        if self.columns.is_none() {
            if let Some(columns) = response.columns {
                let columns = columns
                    .into_iter()
                    .map(ColumnInfo::new)
                    .collect::<Result<Vec<_>>>();
                match columns {
                    Ok(columns) => self.columns = Some(Arc::new(columns)),
                    Err(e) => return Err(self.fail(e)),
                }
            }
        }

        if let Some(data) = response.data {
            match self.reader_factory.create_reader(data, &self.cancel_token) {
                Ok(page) => self.page = Some(page),
                Err(e) => return Err(self.fail(e)),
            }
        }

        if self.next_uri.is_none() {
            debug!(
                "Query {} completed after {} polls",
                self.query_id, self.poll_count
            );
            self.state = StatementState::Completed;
            self.report_terminal_progress();
        } else if has_stats {
            if let (Some(progress), Some(stats)) = (self.progress.as_mut(), self.stats.as_ref()) {
                progress.report(&self.query_id, stats, false);
            }
        }
        Ok(())
    }

    /// Record a terminal error and stop the statement.
    pub(crate) fn fail(&mut self, error: Error) -> Error {
        if error.is_cancelled() || self.cancel_token.is_cancelled() {
            let error = if error.is_cancelled() {
                error
            } else {
                Error::cancelled("query cancelled")
            };
            self.abort(error.clone());
            return error;
        }
        debug!("Query {} failed: {}", self.query_id, error);
        self.send_server_cancel();
        self.state = StatementState::Failed;
        self.page = None;
        self.cancel_token.cancel();
        self.terminal_error = Some(error.clone());
        self.report_terminal_progress();
        error
    }

    fn abort(&mut self, error: Error) {
        debug!("Query {} cancelled: {}", self.query_id, error);
        self.send_server_cancel();
        self.state = StatementState::Cancelled;
        self.page = None;
        self.cancel_token.cancel();
        self.terminal_error = Some(error);
    }

    /// Fire-and-forget `DELETE` of the current `nextUri`.
    fn send_server_cancel(&mut self) {
        let Some(next_uri) = self.next_uri.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No runtime available to cancel {}", next_uri);
            return;
        };
        let client = Arc::clone(&self.client);
        let headers = self.poll_headers.clone();
        runtime.spawn(async move {
            client.cancel(&next_uri, &headers).await;
        });
    }

    fn report_terminal_progress(&mut self) {
        if let (Some(progress), Some(stats)) = (self.progress.as_mut(), self.stats.as_ref()) {
            progress.report(&self.query_id, stats, true);
        }
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            self.send_server_cancel();
        }
        self.cancel_token.cancel();
    }
}

fn query_error(error: ServerError) -> Error {
    if USER_CANCELLED_ERROR_NAMES.contains(&error.error_name.as_str()) {
        let reason = if error.message.is_empty() {
            "query cancelled by user".to_string()
        } else {
            error.message
        };
        return Error::cancelled(reason);
    }
    Error::QueryFailed(Box::new(error))
}

/// Race `future` against cancellation and the deadline.
async fn guard<T>(
    cancel: &CancellationToken,
    deadline: Option<Instant>,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::cancelled("query cancelled")),
        _ = wait_until(deadline) => Err(Error::cancelled("query deadline exceeded")),
        result = future => result,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::reader::spooling::SegmentFetcher;
    use crate::types::spooling::SpoolingConfig;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::timeout;

    /// Replays scripted pages; `None` hangs until cancelled.
    #[derive(Debug, Default)]
    struct ScriptedClient {
        pages: Mutex<VecDeque<Option<Result<QueryResponse>>>>,
        poll_count: AtomicUsize,
        cancelled: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn new(pages: Vec<Option<Result<QueryResponse>>>) -> Arc<Self> {
            Arc::new(Self {
                pages: Mutex::new(pages.into()),
                ..Default::default()
            })
        }

        async fn next_page(&self, cancel: &CancellationToken) -> Result<QueryResponse> {
            let page = self.pages.lock().unwrap().pop_front();
            match page {
                Some(Some(result)) => result,
                Some(None) => {
                    cancel.cancelled().await;
                    Err(Error::cancelled("request cancelled"))
                }
                None => Err(Error::invalid_state("script exhausted")),
            }
        }
    }

    #[async_trait]
    impl StatementClient for ScriptedClient {
        async fn submit(
            &self,
            _sql: &str,
            _headers: &HeaderMap,
            cancel: &CancellationToken,
        ) -> Result<QueryResponse> {
            self.next_page(cancel).await
        }

        async fn poll(
            &self,
            _next_uri: &str,
            _headers: &HeaderMap,
            cancel: &CancellationToken,
        ) -> Result<QueryResponse> {
            self.poll_count.fetch_add(1, Ordering::SeqCst);
            self.next_page(cancel).await
        }

        async fn cancel(&self, next_uri: &str, _headers: &HeaderMap) {
            self.cancelled.lock().unwrap().push(next_uri.to_string());
        }
    }

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
            Err(Error::invalid_state(format!("unexpected fetch of {}", uri)))
        }
    }

    #[derive(Default)]
    struct RecordingProgress {
        updates: Mutex<Vec<QueryProgressInfo>>,
    }

    impl ProgressUpdater for RecordingProgress {
        fn update(&self, info: QueryProgressInfo) {
            self.updates.lock().unwrap().push(info);
        }
    }

    fn page(value: serde_json::Value) -> Option<Result<QueryResponse>> {
        Some(Ok(serde_json::from_value(value).unwrap()))
    }

    fn resolved() -> ResolvedQuery {
        ResolvedQuery {
            submit_headers: HeaderMap::new(),
            poll_headers: HeaderMap::new(),
            spooling: SpoolingConfig::default(),
            progress: None,
            timeout: None,
            cancel: CancellationToken::new(),
        }
    }

    async fn submit(client: Arc<ScriptedClient>, query: ResolvedQuery) -> Result<Statement> {
        let factory = ResultReaderFactory::new(Arc::new(NoFetch), query.spooling.clone());
        Statement::submit(client, factory, "SELECT 1", query).await
    }

    fn columns() -> serde_json::Value {
        json!([{"name": "_col0", "type": "integer", "typeSignature": {"rawType": "integer", "arguments": []}}])
    }

    #[tokio::test]
    async fn test_single_page_query() {
        let client = ScriptedClient::new(vec![page(json!({
            "id": "q1",
            "columns": columns(),
            "data": [[1]],
            "stats": {"state": "FINISHED"}
        }))]);
        let mut statement = submit(client.clone(), resolved()).await.unwrap();
        assert_eq!(statement.query_id(), "q1");
        assert_eq!(statement.state(), StatementState::Completed);
        assert_eq!(statement.columns().unwrap()[0].name(), "_col0");

        assert_eq!(statement.next_row().await.unwrap(), Some(vec![json!(1)]));
        assert_eq!(statement.next_row().await.unwrap(), None);
        assert_eq!(statement.next_row().await.unwrap(), None);
        assert_eq!(client.poll_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_many_empty_polls_then_failure() {
        let mut pages = vec![page(json!({"id": "q1", "nextUri": "http://c/q1/1"}))];
        for _ in 0..200 {
            pages.push(page(json!({"id": "q1", "nextUri": "http://c/q1/1"})));
        }
        pages.push(page(json!({
            "id": "q1",
            "error": {"message": "boom", "errorName": "TEST", "errorCode": 1, "errorType": "USER_ERROR"}
        })));
        let client = ScriptedClient::new(pages);
        let mut statement = submit(client.clone(), resolved()).await.unwrap();

        let err = statement.next_row().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::QueryFailed);
        assert_eq!(err.server_error().unwrap().error_name, "TEST");
        assert_eq!(statement.poll_count(), 201);
        assert_eq!(statement.state(), StatementState::Failed);
        // The server ended the query itself.
        assert!(client.cancelled.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_user_cancelled_error_maps_to_cancelled() {
        let client = ScriptedClient::new(vec![page(json!({
            "id": "q1",
            "error": {"errorName": "USER_CANCELLED"}
        }))]);
        let err = submit(client, resolved()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn test_malformed_stats_are_ignored() {
        let client = ScriptedClient::new(vec![page(json!({
            "stats": {"progressPercentage": ""}
        }))]);
        let mut statement = submit(client, resolved()).await.unwrap();
        assert!(statement.stats().is_none());
        assert_eq!(statement.next_row().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cancellation_while_polling_sends_delete() {
        let client = ScriptedClient::new(vec![
            page(json!({"id": "q1", "nextUri": "http://c/q1/1", "columns": columns()})),
            None,
        ]);
        let query = resolved();
        let caller_token = query.cancel.clone();
        let mut statement = submit(client.clone(), query).await.unwrap();

        let canceller = caller_token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = timeout(Duration::from_secs(2), statement.next_row())
            .await
            .unwrap()
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(statement.state(), StatementState::Cancelled);
        assert!(statement.next_row().await.unwrap_err().is_cancelled());

        // The DELETE runs on a spawned task.
        timeout(Duration::from_secs(1), async {
            while client.cancelled.lock().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(
            client.cancelled.lock().unwrap().as_slice(),
            &["http://c/q1/1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_deadline_cancels_query() {
        let client = ScriptedClient::new(vec![
            page(json!({"id": "q1", "nextUri": "http://c/q1/1"})),
            None,
        ]);
        let query = ResolvedQuery {
            timeout: Some(Duration::from_millis(30)),
            ..resolved()
        };
        let mut statement = submit(client, query).await.unwrap();
        let err = timeout(Duration::from_secs(2), statement.next_row())
            .await
            .unwrap()
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(err.to_string().contains("deadline"));
    }

    #[tokio::test]
    async fn test_close_running_statement_cancels_on_server() {
        let client = ScriptedClient::new(vec![page(
            json!({"id": "q1", "nextUri": "http://c/q1/1"}),
        )]);
        let mut statement = submit(client.clone(), resolved()).await.unwrap();
        statement.close();
        assert_eq!(statement.state(), StatementState::Cancelled);
        timeout(Duration::from_secs(1), async {
            while client.cancelled.lock().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_unsupported_column_type_fails_statement() {
        let client = ScriptedClient::new(vec![page(json!({
            "id": "q1",
            "nextUri": "http://c/q1/1",
            "columns": [{"name": "g", "type": "hyperloglog", "typeSignature": {"rawType": "hyperloglog", "arguments": []}}]
        }))]);
        let err = submit(client, resolved()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert!(err.to_string().contains("column g"));
    }

    #[tokio::test]
    async fn test_update_count_is_recorded() {
        let client = ScriptedClient::new(vec![
            page(json!({"id": "q1", "nextUri": "http://c/q1/1", "updateType": "INSERT"})),
            page(json!({"id": "q1", "updateType": "INSERT", "updateCount": 3})),
        ]);
        let mut statement = submit(client, resolved()).await.unwrap();
        statement.drain().await.unwrap();
        assert_eq!(statement.update_type(), Some("INSERT"));
        assert_eq!(statement.update_count(), Some(3));
    }

    #[tokio::test]
    async fn test_progress_is_rate_limited_with_terminal_report() {
        let mut pages = vec![page(json!({
            "id": "q1", "nextUri": "http://c/q1/1", "stats": {"state": "QUEUED"}
        }))];
        for _ in 0..5 {
            pages.push(page(json!({
                "id": "q1", "nextUri": "http://c/q1/1", "stats": {"state": "RUNNING"}
            })));
        }
        pages.push(page(json!({"id": "q1", "stats": {"state": "FINISHED"}})));

        let progress = Arc::new(RecordingProgress::default());
        let query = ResolvedQuery {
            progress: Some((progress.clone(), Duration::from_secs(3600))),
            ..resolved()
        };
        let mut statement = submit(ScriptedClient::new(pages), query).await.unwrap();
        statement.drain().await.unwrap();

        let updates = progress.updates.lock().unwrap();
        let states: Vec<&str> = updates.iter().map(|u| u.stats.state.as_str()).collect();
        assert_eq!(states, vec!["QUEUED", "FINISHED"]);
        assert!(updates.iter().all(|u| u.query_id == "q1"));
    }
}

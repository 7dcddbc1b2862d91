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

//! Connection to a Trino coordinator.

use crate::client::rest::{header_value, url_encode, TRINO_PREPARED_STATEMENT_HEADER};
use crate::client::{HttpRequester, ReqwestRequester, RestClient, StatementClient, TrinoHttpClient};
use crate::config::{Config, QueryOptions};
use crate::error::Result;
use crate::literal::Literal;
use crate::logging::init_logging;
use crate::reader::spooling::HttpSegmentFetcher;
use crate::reader::ResultReaderFactory;
use crate::rows::Rows;
use crate::statement::Statement;
use std::sync::Arc;
use tracing::debug;

/// Name under which parameterised queries are prepared.
pub const PREPARED_STATEMENT_NAME: &str = "_trino_rs";

/// Outcome of [`Connection::exec`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// e.g. `INSERT`, `CREATE TABLE`.
    pub update_type: Option<String>,
    /// Rows affected, when the server reports it.
    pub update_count: Option<i64>,
}

/// An open connection.
///
/// Cheap to share: every query builds its own statement on top of the
/// shared HTTP client.
#[derive(Debug)]
pub struct Connection {
    config: Config,
    http_client: Arc<TrinoHttpClient>,
    client: Arc<dyn StatementClient>,
}

impl Connection {
    /// Validate `config` and connect through reqwest.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        init_logging(&config.log);
        let requester = Arc::new(ReqwestRequester::new(&config.http)?);
        Self::with_requester(config, requester)
    }

    /// Connect through a caller-supplied transport.
    pub fn with_requester(config: Config, requester: Arc<dyn HttpRequester>) -> Result<Self> {
        config.validate()?;
        let auth_provider = config.auth.provider()?;
        let http_client = Arc::new(TrinoHttpClient::new(
            requester,
            config.http.clone(),
            auth_provider,
        ));
        let client: Arc<dyn StatementClient> = Arc::new(RestClient::new(
            Arc::clone(&http_client),
            config.server_uri.clone(),
        ));
        debug!("Connection created for {}", config.server_uri);
        Ok(Self {
            config,
            http_client,
            client,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Submit `sql` and return a cursor over its rows.
    pub async fn query(&self, sql: &str, options: QueryOptions) -> Result<Rows> {
        self.query_with_args(sql, &[], options).await
    }

    /// Submit `sql` with positional `?` parameters bound to `args`.
    pub async fn query_with_args(
        &self,
        sql: &str,
        args: &[Literal],
        options: QueryOptions,
    ) -> Result<Rows> {
        let statement = self.submit(sql, args, options).await?;
        Ok(Rows::new(statement))
    }

    /// Run `sql` to completion, discarding rows.
    pub async fn exec(&self, sql: &str, options: QueryOptions) -> Result<ExecResult> {
        self.exec_with_args(sql, &[], options).await
    }

    pub async fn exec_with_args(
        &self,
        sql: &str,
        args: &[Literal],
        options: QueryOptions,
    ) -> Result<ExecResult> {
        let mut statement = self.submit(sql, args, options).await?;
        statement.drain().await?;
        Ok(ExecResult {
            update_type: statement.update_type().map(str::to_string),
            update_count: statement.update_count(),
        })
    }

    async fn submit(&self, sql: &str, args: &[Literal], options: QueryOptions) -> Result<Statement> {
        let mut query = self.config.resolve(options)?;

        let sql = if args.is_empty() {
            sql.to_string()
        } else {
            let rendered = args
                .iter()
                .map(Literal::to_sql)
                .collect::<Result<Vec<_>>>()?
                .join(", ");
            if self.config.explicit_prepare {
                let prepared = format!("{}={}", PREPARED_STATEMENT_NAME, url_encode(sql));
                query.submit_headers.insert(
                    TRINO_PREPARED_STATEMENT_HEADER,
                    header_value(&TRINO_PREPARED_STATEMENT_HEADER, &prepared)?,
                );
                format!("EXECUTE {} USING {}", PREPARED_STATEMENT_NAME, rendered)
            } else {
                format!(
                    "EXECUTE IMMEDIATE '{}' USING {}",
                    sql.replace('\'', "''"),
                    rendered
                )
            }
        };

        let fetcher = Arc::new(HttpSegmentFetcher::new(Arc::clone(&self.http_client)));
        let reader_factory = ResultReaderFactory::new(fetcher, query.spooling.clone());
        Statement::submit(Arc::clone(&self.client), reader_factory, &sql, query).await
    }
}

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

//! Logging configuration for the Trino client.
//!
//! Installs a `tracing-subscriber` writing to a file or stderr.
//!
//! ## Configuration priority
//!
//! 1. [`LogConfig::level`] / [`LogConfig::file`] on the connection config (highest)
//! 2. `RUST_LOG` environment variable
//! 3. Default: `trino_client=warn`
//!
//! Applications that install their own subscriber should leave `level`
//! unset and skip `RUST_LOG`; the first installed subscriber wins.
//!
//! ```bash
//! RUST_LOG=trino_client=debug ./my_app
//! ```

use std::sync::{Mutex, OnceLock};
use tracing_subscriber::fmt::{self, time::SystemTime, writer::BoxMakeWriter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static LOGGING_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Logging configuration carried by [`crate::Config`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogConfig {
    /// Log level: "OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE".
    pub level: Option<String>,
    /// Log file path. If unset, logs go to stderr.
    pub file: Option<String>,
}

/// Filter for `config`, or `None` when logging is switched off.
fn crate_filter(config: &LogConfig) -> Option<EnvFilter> {
    match config.level.as_deref() {
        Some(level) if level.eq_ignore_ascii_case("off") => None,
        Some(level) => Some(EnvFilter::new(format!(
            "trino_client={}",
            level.to_lowercase()
        ))),
        None => Some(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("trino_client=warn")),
        ),
    }
}

/// Initialize the tracing subscriber.
///
/// Runs at most once per process; the first `Connection::new` configures
/// logging and later calls are no-ops.
pub(crate) fn init_logging(config: &LogConfig) {
    LOGGING_INITIALIZED.get_or_init(|| {
        let Some(filter) = crate_filter(config) else {
            return;
        };
        let (writer, ansi) = match config.file.as_deref() {
            Some(path) => match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
            {
                Ok(file) => (BoxMakeWriter::new(Mutex::new(file)), false),
                Err(e) => {
                    eprintln!("trino-client: failed to open log file {}: {}", path, e);
                    return;
                }
            },
            None => (BoxMakeWriter::new(std::io::stderr), true),
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .with_target(false)
                    .with_ansi(ansi)
                    .with_timer(SystemTime),
            )
            .try_init()
            .ok();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_off_disables_logging_in_any_case() {
        for level in ["off", "OFF", "Off"] {
            let config = LogConfig {
                level: Some(level.to_string()),
                file: None,
            };
            assert!(crate_filter(&config).is_none());
        }
    }

    #[test]
    fn test_explicit_level_builds_crate_filter() {
        let config = LogConfig {
            level: Some("DEBUG".to_string()),
            file: Some("/tmp/trino-client-test.log".to_string()),
        };
        let filter = crate_filter(&config).unwrap();
        assert_eq!(filter.to_string(), "trino_client=debug");
    }

    #[test]
    fn test_default_config_still_logs() {
        assert!(crate_filter(&LogConfig::default()).is_some());
    }
}

//! Worker process configuration
//!
//! Read from a TOML file, then overridden from the environment:
//!
//! ```toml
//! [worker]
//! deduplication_duration_secs = 30
//! max_operation_retry_count = 3
//! message_extend_margin_secs = 30
//! min_message_lock_duration_secs = 5
//! max_operation_concurrency = 3
//!
//! [storage]
//! path = "/var/lib/converge/converge.db"
//!
//! [logging]
//! profile = "production"
//! ```
//!
//! Every key is optional. Unset worker keys take the worker defaults, no
//! storage path means an in-memory database.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use converge_core::logging_facility::Profile;
use converge_store::{DatabaseClient, InMemoryClient, SqliteClient};
use serde::Deserialize;

use crate::errors::{config_error, Result};
use crate::worker::WorkerOptions;

pub const ENV_MAX_OPERATION_CONCURRENCY: &str = "CONVERGE_MAX_OPERATION_CONCURRENCY";
pub const ENV_MAX_OPERATION_RETRY_COUNT: &str = "CONVERGE_MAX_OPERATION_RETRY_COUNT";

/// `[worker]` table
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerSection {
    pub deduplication_duration_secs: Option<u64>,
    pub max_operation_retry_count: Option<u32>,
    pub message_extend_margin_secs: Option<u64>,
    pub min_message_lock_duration_secs: Option<u64>,
    pub max_operation_concurrency: Option<usize>,
    pub message_lock_duration_secs: Option<u64>,
    pub poll_interval_ms: Option<u64>,
}

/// `[storage]` table
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSection {
    /// SQLite database file; in-memory when unset
    pub path: Option<PathBuf>,
}

/// `[logging]` table
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    pub profile: Profile,
}

/// Complete worker configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerConfig {
    pub worker: WorkerSection,
    pub storage: StorageSection,
    pub logging: LoggingSection,
}

impl WorkerConfig {
    /// Parse a TOML document
    ///
    /// # Errors
    ///
    /// Returns `Invalid` if the document is malformed or has unknown keys.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| config_error(format!("invalid worker config: {}", e)))
    }

    /// Read a config file and apply environment overrides
    ///
    /// # Errors
    ///
    /// Returns `Invalid` if the file cannot be read or parsed, or an
    /// override is not a number.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            config_error(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_toml_str(&text)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply `CONVERGE_*` overrides from the process environment
    ///
    /// # Errors
    ///
    /// Returns `Invalid` if an override is not a number.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides read through `lookup`
    ///
    /// # Errors
    ///
    /// Returns `Invalid` if an override is not a number.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_MAX_OPERATION_CONCURRENCY) {
            self.worker.max_operation_concurrency =
                Some(parse_override(ENV_MAX_OPERATION_CONCURRENCY, &raw)?);
        }
        if let Some(raw) = lookup(ENV_MAX_OPERATION_RETRY_COUNT) {
            self.worker.max_operation_retry_count =
                Some(parse_override(ENV_MAX_OPERATION_RETRY_COUNT, &raw)?);
        }
        Ok(())
    }

    /// Worker options with defaults filled in
    pub fn worker_options(&self) -> WorkerOptions {
        let w = &self.worker;
        WorkerOptions {
            deduplication_duration: secs(w.deduplication_duration_secs),
            max_operation_retry_count: w.max_operation_retry_count.unwrap_or_default(),
            message_extend_margin: secs(w.message_extend_margin_secs),
            min_message_lock_duration: secs(w.min_message_lock_duration_secs),
            max_operation_concurrency: w.max_operation_concurrency.unwrap_or_default(),
            message_lock_duration: secs(w.message_lock_duration_secs),
            poll_interval: Duration::from_millis(w.poll_interval_ms.unwrap_or_default()),
        }
        .resolved()
    }

    /// Open the configured database
    ///
    /// # Errors
    ///
    /// Returns a `Persistence` error if the SQLite file cannot be opened or
    /// migrated.
    pub fn open_database(&self) -> Result<Arc<dyn DatabaseClient>> {
        match &self.storage.path {
            Some(path) => {
                tracing::info!(path = %path.display(), "opening sqlite database");
                Ok(Arc::new(SqliteClient::open(path)?))
            }
            None => {
                tracing::info!("using in-memory database");
                Ok(Arc::new(InMemoryClient::new()))
            }
        }
    }
}

fn secs(value: Option<u64>) -> Duration {
    Duration::from_secs(value.unwrap_or_default())
}

fn parse_override<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| config_error(format!("{} must be a non-negative integer, got '{}'", key, raw)))
}

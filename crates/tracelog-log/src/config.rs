use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use tracelog_pipeline::PipelineConfig;
use tracelog_store::{SegmentConfig, SyncMode};

use crate::error::{LogError, LogResult};

/// Where and how trace documents are stored.
///
/// `addresses`, `database`, `collection`, the credentials, and
/// `connect_timeout_ms` are handed through to networked store adapters;
/// the bundled segment store uses `path` and `max_size_bytes`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub addresses: Vec<String>,
    pub database: String,
    pub collection: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub max_size_bytes: u64,
    pub connect_timeout_ms: u64,
    pub sync_every_write: bool,
}

impl StoreConfig {
    /// `database.collection`, used to label log lines.
    pub fn namespace(&self) -> String {
        format!("{}.{}", self.database, self.collection)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn segment_config(&self) -> SegmentConfig {
        SegmentConfig {
            max_size_bytes: self.max_size_bytes,
            sync_mode: if self.sync_every_write {
                SyncMode::EveryWrite
            } else {
                SyncMode::OsDefault
            },
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("traces.seg"),
            addresses: Vec::new(),
            database: "tracelog".into(),
            collection: "traces".into(),
            username: None,
            password: None,
            max_size_bytes: 64 * 1024 * 1024,
            connect_timeout_ms: 5_000,
            sync_every_write: false,
        }
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("path", &self.path)
            .field("addresses", &self.addresses)
            .field("database", &self.database)
            .field("collection", &self.collection)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("max_size_bytes", &self.max_size_bytes)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("sync_every_write", &self.sync_every_write)
            .finish()
    }
}

/// Tailing reader tuning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Sleep between polls when the cursor is idle or the buffer is full.
    pub poll_interval_ms: u64,
    /// Pause after a cursor failure before resyncing.
    pub error_backoff_ms: u64,
    /// Upper bound on records buffered per reader.
    pub max_buffered: usize,
}

impl ReaderConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            error_backoff_ms: 1_000,
            max_buffered: 10_000,
        }
    }
}

/// Complete tracelog configuration, usually loaded from TOML.
///
/// ```toml
/// read_enabled = true
/// write_enabled = true
///
/// [store]
/// path = "/var/lib/app/traces.seg"
/// max_size_bytes = 16777216
///
/// [reader]
/// poll_interval_ms = 50
///
/// [pipeline]
/// queue_capacity = 15000
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceLogConfig {
    pub read_enabled: bool,
    pub write_enabled: bool,
    pub store: StoreConfig,
    pub reader: ReaderConfig,
    pub pipeline: PipelineConfig,
}

impl Default for TraceLogConfig {
    fn default() -> Self {
        Self {
            read_enabled: true,
            write_enabled: true,
            store: StoreConfig::default(),
            reader: ReaderConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl TraceLogConfig {
    pub fn from_toml_str(text: &str) -> LogResult<Self> {
        toml::from_str(text).map_err(|e| LogError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> LogResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Serialize to TOML with the store password masked.
    pub fn to_toml_redacted(&self) -> LogResult<String> {
        let mut shown = self.clone();
        if shown.store.password.is_some() {
            shown.store.password = Some("<redacted>".into());
        }
        toml::to_string_pretty(&shown).map_err(|e| LogError::Config(e.to_string()))
    }
}

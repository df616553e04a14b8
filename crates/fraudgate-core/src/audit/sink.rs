//! Audit sinks for storing audit records

use super::event::{AuditEvent, AuditRecord};
use crate::error::AuditError;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

/// Default audit log location, relative to the working directory.
pub const DEFAULT_AUDIT_LOG_PATH: &str = "logs/audit.log";

/// Trait for audit sinks
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Timestamp a copy of `event` and append it as one record.
    async fn append(&self, event: &AuditEvent) -> Result<AuditRecord, AuditError>;
}

/// In-memory audit sink for testing
#[derive(Default)]
pub struct MemoryAuditSink {
    records: RwLock<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.read().clone()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, event: &AuditEvent) -> Result<AuditRecord, AuditError> {
        let record = AuditRecord::stamp(event, Utc::now());
        self.records.write().push(record.clone());
        Ok(record)
    }
}

/// JSON Lines file sink with append-only writes.
///
/// Each record is written with a single `write_all` of the complete line while
/// holding the sink's lock, so concurrent appends never interleave.
pub struct FileAuditSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileAuditSink {
    /// Create a sink at `path`, creating parent directories as needed.
    pub async fn new(path: impl Into<PathBuf>) -> Result<Self, AuditError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all records back, skipping blank lines.
    pub async fn read_all(&self) -> Result<Vec<AuditRecord>, AuditError> {
        let file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut lines = BufReader::new(file).lines();
        let mut records = Vec::new();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }

        Ok(records)
    }
}

#[async_trait]
impl AuditSink for FileAuditSink {
    async fn append(&self, event: &AuditEvent) -> Result<AuditRecord, AuditError> {
        let record = AuditRecord::stamp(event, Utc::now());
        let line = record.to_line()?;

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        Ok(record)
    }
}

mod buffer;
mod multiplexer;
mod rotation;
mod writer;

pub use buffer::{LineBuffer, LineBufferConfig};
pub use multiplexer::LogMultiplexer;
pub use rotation::{LogRotation, RotationConfig};
pub use writer::{AsyncLogWriter, LogWriterConfig};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use supctl_core::{ProcId, Result};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub base_dir: PathBuf,
    pub max_file_size: u64,
    pub max_files: u32,
    pub compression: bool,
    pub flush_interval: Duration,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("logs"),
            max_file_size: 10 * 1024 * 1024,
            max_files: 10,
            compression: true,
            flush_interval: Duration::from_millis(100),
        }
    }
}

/// Tail of one process's log, split by origin stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredLogs {
    pub output: Vec<String>,
    pub errors: Vec<String>,
}

/// One [`AsyncLogWriter`] per process, created lazily and shared with the
/// multiplexer's drain tasks.
#[derive(Debug, Clone)]
pub struct LogManager {
    writers: Arc<DashMap<ProcId, Arc<AsyncLogWriter>>>,
    config: LogConfig,
}

impl LogManager {
    pub fn new(config: LogConfig) -> Self {
        debug!(dir = %config.base_dir.display(), "log manager ready");
        Self {
            writers: Arc::new(DashMap::new()),
            config,
        }
    }

    pub fn log_path(&self, id: &ProcId) -> PathBuf {
        self.config.base_dir.join(format!("{id}.log"))
    }

    pub async fn writer(&self, id: &ProcId) -> Result<Arc<AsyncLogWriter>> {
        if let Some(writer) = self.writers.get(id) {
            return Ok(writer.clone());
        }

        let writer = Arc::new(
            AsyncLogWriter::new(LogWriterConfig {
                path: self.log_path(id),
                rotation: RotationConfig {
                    max_file_size: self.config.max_file_size,
                    max_files: self.config.max_files,
                    compression: self.config.compression,
                },
                flush_interval: self.config.flush_interval,
            })
            .await?,
        );
        self.writers.insert(id.clone(), writer.clone());
        Ok(writer)
    }

    /// Flush and drop a process's writer. The log file itself stays behind.
    pub async fn close_writer(&self, id: &ProcId) {
        if let Some((_, writer)) = self.writers.remove(id) {
            let _ = writer.close().await;
        }
    }

    pub async fn flush_all(&self) -> Result<()> {
        for writer in self.writers.iter() {
            writer.flush().await?;
        }
        Ok(())
    }

    pub async fn rotate_all(&self) -> Result<()> {
        for writer in self.writers.iter() {
            writer.rotate().await?;
        }
        Ok(())
    }

    pub async fn close_all(&self) {
        let ids: Vec<ProcId> = self.writers.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.close_writer(&id).await;
        }
    }

    /// Last `lines` lines of a process's log file, oldest first. A missing
    /// file reads as empty.
    pub async fn read_logs(&self, id: &ProcId, lines: usize) -> Result<Vec<String>> {
        let path = self.log_path(id);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&path).await?;
        let mut reader = BufReader::new(file).lines();
        let mut all = Vec::new();
        while let Some(line) = reader.next_line().await? {
            all.push(line);
        }

        let start = all.len().saturating_sub(lines);
        Ok(all.split_off(start))
    }

    /// Like [`read_logs`](Self::read_logs), but split into stdout and stderr
    /// by the `[stderr]` tag the multiplexer writes.
    pub async fn read_structured_logs(&self, id: &ProcId, lines: usize) -> Result<StructuredLogs> {
        let mut output = Vec::new();
        let mut errors = Vec::new();
        for line in self.read_logs(id, lines).await? {
            if line.contains("[stderr]") {
                errors.push(line);
            } else {
                output.push(line);
            }
        }
        Ok(StructuredLogs { output, errors })
    }

    /// Tail every log file in the base directory, keyed and sorted by
    /// process name. Covers files left by processes no longer managed.
    pub async fn read_all_logs(&self, lines: usize) -> Result<Vec<(String, StructuredLogs)>> {
        let mut all = Vec::new();
        let Ok(mut entries) = tokio::fs::read_dir(&self.config.base_dir).await else {
            return Ok(all);
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if let Some(name) = path.file_name().and_then(|n| n.to_str())
                && let Some(proc_name) = name.strip_suffix(".log")
                && let Ok(id) = ProcId::new(proc_name)
            {
                let logs = self.read_structured_logs(&id, lines).await?;
                all.push((proc_name.to_string(), logs));
            }
        }

        all.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(all)
    }
}

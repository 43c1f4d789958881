use crate::{LineBuffer, LineBufferConfig, LogRotation, RotationConfig};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::time::Duration;
use supctl_core::{Error, Result};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct LogWriterConfig {
    pub path: PathBuf,
    pub rotation: RotationConfig,
    pub flush_interval: Duration,
}

impl LogWriterConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            rotation: RotationConfig::default(),
            flush_interval: Duration::from_millis(100),
        }
    }
}

enum Command {
    Write(Bytes),
    Flush(oneshot::Sender<()>),
    Rotate(oneshot::Sender<Result<()>>),
    Close,
}

/// Append-only log file fed through a channel. Producers never touch the
/// file; a background task batches lines, flushes on an interval, and
/// rotates when the size threshold is crossed.
pub struct AsyncLogWriter {
    path: PathBuf,
    tx: mpsc::Sender<Command>,
    shutdown_rx: parking_lot::Mutex<Option<oneshot::Receiver<()>>>,
}

impl std::fmt::Debug for AsyncLogWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncLogWriter")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl AsyncLogWriter {
    pub async fn new(config: LogWriterConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = open_append(&config.path).await?;
        let existing = file.metadata().await.map(|m| m.len()).unwrap_or(0);

        let mut rotation = LogRotation::new(config.rotation.clone());
        rotation.set_size(existing);

        let (tx, rx) = mpsc::channel::<Command>(10_000);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = WriterTask {
            path: config.path.clone(),
            file: BufWriter::new(file),
            buffer: LineBuffer::new(LineBufferConfig::default()),
            rotation,
            flush_interval: config.flush_interval,
        };
        tokio::spawn(async move {
            task.run(rx).await;
            let _ = shutdown_tx.send(());
        });

        Ok(Self {
            path: config.path,
            tx,
            shutdown_rx: parking_lot::Mutex::new(Some(shutdown_rx)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Non-blocking append. Data is dropped with a warning if the channel is
    /// full, so a wedged disk cannot stall the supervisor.
    pub fn write(&self, data: impl Into<Bytes>) {
        if self.tx.try_send(Command::Write(data.into())).is_err() {
            warn!(path = %self.path.display(), "log channel full, dropping output");
        }
    }

    pub fn write_line(&self, line: impl AsRef<str>) {
        let line = line.as_ref();
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        if !data.ends_with(b"\n") {
            data.push(b'\n');
        }
        self.write(data);
    }

    /// Wait for everything queued so far to reach the file.
    pub async fn flush(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(Command::Flush(done_tx))
            .await
            .map_err(|_| Error::Other(anyhow::anyhow!("log writer task is gone")))?;
        time::timeout(Duration::from_secs(5), done_rx)
            .await
            .map_err(|_| Error::Timeout("log flush".into()))?
            .map_err(|_| Error::Other(anyhow::anyhow!("log writer task is gone")))
    }

    /// Force a rotation regardless of size.
    pub async fn rotate(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(Command::Rotate(done_tx))
            .await
            .map_err(|_| Error::Other(anyhow::anyhow!("log writer task is gone")))?;
        done_rx
            .await
            .map_err(|_| Error::Other(anyhow::anyhow!("log writer task is gone")))?
    }

    /// Flush remaining output and stop the background task.
    pub async fn close(&self) -> Result<()> {
        let _ = self.tx.send(Command::Close).await;
        let rx = self.shutdown_rx.lock().take();
        if let Some(rx) = rx
            && time::timeout(Duration::from_secs(5), rx).await.is_err()
        {
            warn!(path = %self.path.display(), "log writer did not shut down in time");
        }
        Ok(())
    }
}

struct WriterTask {
    path: PathBuf,
    file: BufWriter<File>,
    buffer: LineBuffer,
    rotation: LogRotation,
    flush_interval: Duration,
}

impl WriterTask {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        let mut interval = time::interval(self.flush_interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.flush().await;
                }
                cmd = rx.recv() => {
                    match cmd {
                        Some(Command::Write(data)) => self.buffer.push(&data),
                        Some(Command::Flush(done)) => {
                            self.flush().await;
                            let _ = done.send(());
                        }
                        Some(Command::Rotate(done)) => {
                            let _ = done.send(self.rotate().await);
                        }
                        Some(Command::Close) | None => break,
                    }
                }
            }
        }

        // Drain whatever the channel still holds before the final flush.
        while let Ok(cmd) = rx.try_recv() {
            if let Command::Write(data) = cmd {
                self.buffer.push(&data);
            }
        }
        self.flush().await;
        self.flush_tail().await;
        if let Err(e) = self.file.flush().await {
            warn!(path = %self.path.display(), error = %e, "final flush failed");
        }
    }

    async fn flush(&mut self) {
        let lines = self.buffer.drain();
        if lines.is_empty() {
            return;
        }
        let mut written = 0u64;
        for line in lines {
            if let Err(e) = self.file.write_all(&line).await {
                warn!(path = %self.path.display(), error = %e, "log write failed");
                return;
            }
            written += line.len() as u64;
        }
        if let Err(e) = self.file.flush().await {
            warn!(path = %self.path.display(), error = %e, "log flush failed");
            return;
        }
        self.rotation.record_write(written);

        if self.rotation.should_rotate()
            && let Err(e) = self.rotate().await
        {
            warn!(path = %self.path.display(), error = %e, "log rotation failed");
        }
    }

    async fn flush_tail(&mut self) {
        if let Some(tail) = self.buffer.take_partial() {
            let _ = self.file.write_all(&tail).await;
            let _ = self.file.write_all(b"\n").await;
        }
    }

    async fn rotate(&mut self) -> Result<()> {
        self.file.flush().await?;
        self.rotation.rotate(&self.path).await?;
        self.file = BufWriter::new(open_append(&self.path).await?);
        Ok(())
    }
}

async fn open_append(path: &Path) -> Result<File> {
    Ok(OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lines_reach_disk_after_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let writer = AsyncLogWriter::new(LogWriterConfig::new(&path)).await.unwrap();

        writer.write_line("first");
        writer.write_line("second");
        writer.flush().await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content, "first\nsecond\n");
        writer.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_flushes_pending_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let writer = AsyncLogWriter::new(LogWriterConfig::new(&path)).await.unwrap();

        writer.write_line("last words");
        writer.close().await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(content.contains("last words"));
    }

    #[tokio::test]
    async fn appends_across_writer_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");

        for round in 0..2 {
            let writer = AsyncLogWriter::new(LogWriterConfig::new(&path)).await.unwrap();
            writer.write_line(format!("round {round}"));
            writer.close().await.unwrap();
        }

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content, "round 0\nround 1\n");
    }

    #[tokio::test]
    async fn oversized_file_is_rotated_on_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");

        let mut config = LogWriterConfig::new(&path);
        config.rotation = RotationConfig {
            max_file_size: 16,
            max_files: 4,
            compression: false,
        };
        let writer = AsyncLogWriter::new(config).await.unwrap();

        writer.write_line("a line well past sixteen bytes");
        writer.flush().await.unwrap();
        writer.close().await.unwrap();

        let mut archives = 0;
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            let name = entry.file_name();
            if name.to_string_lossy().contains(".log") && name != *"app.log" {
                archives += 1;
            }
        }
        assert_eq!(archives, 1, "expected one rotated archive");
    }

    #[tokio::test]
    async fn explicit_rotate_reopens_active_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let writer = AsyncLogWriter::new(LogWriterConfig::new(&path)).await.unwrap();

        writer.write_line("before");
        writer.flush().await.unwrap();
        writer.rotate().await.unwrap();
        writer.write_line("after");
        writer.flush().await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content, "after\n");
        writer.close().await.unwrap();
    }
}

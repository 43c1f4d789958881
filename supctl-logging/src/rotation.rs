use chrono::Local;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs;
use std::path::Path;
use supctl_core::{Error, Result};
use tokio::fs as tokio_fs;

#[derive(Debug, Clone)]
pub struct RotationConfig {
    /// Rotate once the active file reaches this many bytes. Zero disables
    /// rotation entirely.
    pub max_file_size: u64,
    /// Rotated archives kept per log file before the oldest are deleted.
    pub max_files: u32,
    /// Gzip archives as they are rotated out.
    pub compression: bool,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024,
            max_files: 10,
            compression: true,
        }
    }
}

/// Size-based rotation for a single log file. The writer owns one of these
/// and feeds it the byte count of every flush.
#[derive(Debug)]
pub struct LogRotation {
    config: RotationConfig,
    current_size: u64,
}

impl LogRotation {
    pub fn new(config: RotationConfig) -> Self {
        Self {
            config,
            current_size: 0,
        }
    }

    /// Seed the size counter from an existing file so an append after daemon
    /// restart still rotates at the configured threshold.
    pub fn set_size(&mut self, size: u64) {
        self.current_size = size;
    }

    pub fn record_write(&mut self, bytes: u64) {
        self.current_size += bytes;
    }

    pub fn should_rotate(&self) -> bool {
        self.config.max_file_size > 0 && self.current_size >= self.config.max_file_size
    }

    /// Move the active file aside under a timestamped name, then prune old
    /// archives down to `max_files`.
    pub async fn rotate(&mut self, log_path: &Path) -> Result<()> {
        if !log_path.exists() {
            self.current_size = 0;
            return Ok(());
        }

        let stem = log_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| Error::Validation(format!("bad log path {}", log_path.display())))?;
        let parent = log_path
            .parent()
            .ok_or_else(|| Error::Validation(format!("bad log path {}", log_path.display())))?;

        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let archive_name = if self.config.compression {
            format!("{stem}.{timestamp}.log.gz")
        } else {
            format!("{stem}.{timestamp}.log")
        };
        let archive_path = parent.join(&archive_name);

        if self.config.compression {
            compress_into(log_path, &archive_path).await?;
        } else {
            tokio_fs::rename(log_path, &archive_path).await?;
        }

        self.cleanup_old_archives(parent, &stem).await?;
        self.current_size = 0;
        Ok(())
    }

    async fn cleanup_old_archives(&self, parent: &Path, stem: &str) -> Result<()> {
        let active_name = format!("{stem}.log");
        let mut archives = Vec::new();

        let mut entries = tokio_fs::read_dir(parent).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with(stem) || name == active_name {
                continue;
            }
            if let Ok(metadata) = entry.metadata().await
                && let Ok(modified) = metadata.modified()
            {
                archives.push((path, modified));
            }
        }

        archives.sort_by(|a, b| b.1.cmp(&a.1));
        for (path, _) in archives.iter().skip(self.config.max_files as usize) {
            let _ = tokio_fs::remove_file(path).await;
        }
        Ok(())
    }
}

async fn compress_into(source: &Path, dest: &Path) -> Result<()> {
    let source = source.to_path_buf();
    let dest = dest.to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<()> {
        let input = fs::File::open(&source)?;
        let output = fs::File::create(&dest)?;
        let mut encoder = GzEncoder::new(output, Compression::default());
        let mut reader = std::io::BufReader::new(input);
        std::io::copy(&mut reader, &mut encoder)?;
        encoder.finish()?;
        fs::remove_file(&source)?;
        Ok(())
    })
    .await
    .map_err(|e| Error::Other(e.into()))?
}

use crate::{LogConfig, LogManager};
use async_trait::async_trait;
use chrono::Local;
use dashmap::DashMap;
use supctl_core::{OutputRouter, ProcId, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{ChildStderr, ChildStdout};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Funnels every process's stdout and stderr into one per-process log file,
/// each line tagged with its origin:
///
/// ```text
/// [server] [2026-08-29 14:03:11] [stderr] connection refused
/// ```
pub struct LogMultiplexer {
    manager: LogManager,
    drains: DashMap<ProcId, Vec<JoinHandle<()>>>,
}

impl LogMultiplexer {
    pub fn new(config: LogConfig) -> Self {
        Self {
            manager: LogManager::new(config),
            drains: DashMap::new(),
        }
    }

    pub fn manager(&self) -> &LogManager {
        &self.manager
    }

    fn spawn_drain<R>(&self, id: &ProcId, stream: &'static str, pipe: R) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let manager = self.manager.clone();
        let id = id.clone();
        tokio::spawn(async move {
            let writer = match manager.writer(&id).await {
                Ok(writer) => writer,
                Err(e) => {
                    debug!(proc = %id, stream, error = %e, "no log writer, discarding pipe");
                    let mut pipe = pipe;
                    let _ = tokio::io::copy(&mut pipe, &mut tokio::io::sink()).await;
                    return;
                }
            };

            let mut lines = BufReader::new(pipe).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let ts = Local::now().format("%Y-%m-%d %H:%M:%S");
                        writer.write_line(format!("[{id}] [{ts}] [{stream}] {line}"));
                    }
                    Ok(None) => break,
                    Err(e) => {
                        trace!(proc = %id, stream, error = %e, "pipe read error");
                        break;
                    }
                }
            }
            trace!(proc = %id, stream, "pipe closed");
        })
    }
}

#[async_trait]
impl OutputRouter for LogMultiplexer {
    async fn attach(
        &self,
        id: &ProcId,
        stdout: Option<ChildStdout>,
        stderr: Option<ChildStderr>,
    ) -> Result<()> {
        // Touch the writer up front so open errors surface at attach time,
        // not in a detached drain task.
        self.manager.writer(id).await?;

        let mut handles = Vec::new();
        if let Some(out) = stdout {
            handles.push(self.spawn_drain(id, "stdout", out));
        }
        if let Some(err) = stderr {
            handles.push(self.spawn_drain(id, "stderr", err));
        }

        // A restart replaces the previous attachment. Dropping the old
        // handles detaches those tasks; they finish on their own when their
        // pipes close, so no tail output is lost.
        self.drains.insert(id.clone(), handles);
        Ok(())
    }

    async fn detach(&self, id: &ProcId) {
        if let Some((_, handles)) = self.drains.remove(id) {
            for handle in handles {
                if !handle.is_finished() {
                    handle.abort();
                }
            }
        }
        self.manager.close_writer(id).await;
    }
}

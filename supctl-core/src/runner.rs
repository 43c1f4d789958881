use async_trait::async_trait;
use tokio::process::{ChildStderr, ChildStdout};

use crate::proc::ProcId;
use crate::process::{ProcessBuilder, ProcessHandle};
use crate::registry::ProcessSpec;

/// Launches one OS child per call. The seam exists so the supervisor core
/// does not care how children come to be; the shipped implementation is
/// [`NativeRunner`].
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn spawn(&self, spec: &ProcessSpec) -> crate::Result<ProcessHandle>;
}

#[derive(Debug, Default)]
pub struct NativeRunner;

impl NativeRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for NativeRunner {
    async fn spawn(&self, spec: &ProcessSpec) -> crate::Result<ProcessHandle> {
        let child = ProcessBuilder::from_spec(spec).spawn()?;
        ProcessHandle::new(spec.name.as_str(), child)
    }
}

/// Receives a child's freshly opened pipes right after spawn and keeps them
/// drained for the life of the child. Implemented by the log multiplexer;
/// [`DiscardRouter`] is for tests and log-less embedding.
#[async_trait]
pub trait OutputRouter: Send + Sync {
    async fn attach(
        &self,
        id: &ProcId,
        stdout: Option<ChildStdout>,
        stderr: Option<ChildStderr>,
    ) -> crate::Result<()>;

    /// Called when a process is retired via reload; sinks may release
    /// per-process resources.
    async fn detach(&self, id: &ProcId);
}

/// Drains pipes to nowhere. The draining still matters: an unread pipe
/// eventually blocks the child.
#[derive(Debug, Default)]
pub struct DiscardRouter;

#[async_trait]
impl OutputRouter for DiscardRouter {
    async fn attach(
        &self,
        _id: &ProcId,
        stdout: Option<ChildStdout>,
        stderr: Option<ChildStderr>,
    ) -> crate::Result<()> {
        if let Some(mut out) = stdout {
            tokio::spawn(async move {
                let _ = tokio::io::copy(&mut out, &mut tokio::io::sink()).await;
            });
        }
        if let Some(mut err) = stderr {
            tokio::spawn(async move {
                let _ = tokio::io::copy(&mut err, &mut tokio::io::sink()).await;
            });
        }
        Ok(())
    }

    async fn detach(&self, _id: &ProcId) {}
}

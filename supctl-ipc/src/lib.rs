#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::{IpcClient, IpcConnection, IpcServer};

use serde::{Deserialize, Serialize};
use supctl_core::{ProcSnapshot, ReloadSummary};

/// Control requests the CLI sends to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IpcMessage {
    /// `name: None` means every enabled process.
    Start { name: Option<String> },
    Stop { name: Option<String>, grace_secs: Option<u64> },
    Restart { name: String },
    Status { name: Option<String> },
    /// Re-read the registry file and apply the diff.
    Reload,
    Logs { name: Option<String>, lines: usize },
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IpcResponse {
    Ok { message: String },
    Error { message: String },
    Status { processes: Vec<StatusEntry> },
    Reloaded { summary: ReloadReport },
    Logs { logs: Vec<LogTail> },
}

/// Wire form of a process snapshot. States travel as their lowercase labels
/// so the CLI never depends on core's internal enum layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEntry {
    pub name: String,
    pub enabled: bool,
    pub state: String,
    pub pid: Option<u32>,
    pub uptime_secs: Option<u64>,
    pub restart_count: u32,
    pub last_exit_code: Option<i32>,
    pub last_exit_signal: Option<i32>,
}

impl From<&ProcSnapshot> for StatusEntry {
    fn from(snap: &ProcSnapshot) -> Self {
        Self {
            name: snap.name.clone(),
            enabled: snap.enabled,
            state: snap.state.label().to_string(),
            pid: snap.pid,
            uptime_secs: snap.uptime.map(|d| d.as_secs()),
            restart_count: snap.restart_count,
            last_exit_code: snap.last_exit.and_then(|e| e.code),
            last_exit_signal: snap.last_exit.and_then(|e| e.signal),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadReport {
    pub added: usize,
    pub removed: usize,
    pub started: usize,
    pub stopped: usize,
    pub updated: usize,
}

impl From<&ReloadSummary> for ReloadReport {
    fn from(s: &ReloadSummary) -> Self {
        Self {
            added: s.added,
            removed: s.removed,
            started: s.started,
            stopped: s.stopped,
            updated: s.updated,
        }
    }
}

/// Tail of one process's log, split by stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogTail {
    pub name: String,
    pub output: Vec<String>,
    pub errors: Vec<String>,
}

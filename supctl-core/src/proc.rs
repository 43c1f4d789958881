use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::{watch, Notify};

use crate::process::ExitStatus;
use crate::registry::ProcessSpec;

/// Identifier for one managed process. Sanitized so it is always safe as a
/// map key and a log file name.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ProcId(String);

impl ProcId {
    pub fn new(name: impl AsRef<str>) -> crate::Result<Self> {
        let name = name.as_ref();
        let sanitized = Self::sanitize(name);
        if sanitized.is_empty() {
            return Err(crate::Error::InvalidName(name.to_string()));
        }
        Ok(Self(sanitized))
    }

    fn sanitize(name: &str) -> String {
        name.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c.to_ascii_lowercase()
                } else {
                    '-'
                }
            })
            .collect::<String>()
            .trim_matches('-')
            .to_string()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProcId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProcState {
    Stopped,
    Starting,
    Running,
    /// Polite stop requested; grace period running.
    Stopping,
    /// Restart scheduled; the timer can be cancelled by a manual stop.
    Backoff { attempt: u32, until: Instant },
    /// Terminal: restart budget spent or unrecoverable spawn failure.
    Failed,
}

impl ProcState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// States from which `start` is accepted.
    pub fn is_startable(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }

    /// Terminal states a `stop` waits for.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Backoff { .. } => "backoff",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitRecord {
    pub at: SystemTime,
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitRecord {
    pub fn from_status(status: &ExitStatus) -> Self {
        Self {
            at: SystemTime::now(),
            code: status.code(),
            signal: status.signal(),
        }
    }
}

const EXIT_HISTORY_LIMIT: usize = 64;

/// All mutable bookkeeping for one process behind a single lock, so a
/// snapshot is always internally consistent.
#[derive(Debug)]
struct ProcInner {
    spec: ProcessSpec,
    state: ProcState,
    pid: Option<u32>,
    started_at: Option<Instant>,
    restart_count: u32,
    exit_history: VecDeque<ExitRecord>,
    stop_requested: bool,
}

/// Live-tracking record for one running-or-stoppable child. Owned by the
/// supervisor core; the control surface only sees snapshots.
#[derive(Debug)]
pub struct ManagedProc {
    pub id: ProcId,
    inner: RwLock<ProcInner>,
    state_tx: watch::Sender<ProcState>,
    stop_notify: Notify,
}

impl ManagedProc {
    pub fn new(id: ProcId, spec: ProcessSpec) -> Self {
        let (state_tx, _) = watch::channel(ProcState::Stopped);
        Self {
            id,
            inner: RwLock::new(ProcInner {
                spec,
                state: ProcState::Stopped,
                pid: None,
                started_at: None,
                restart_count: 0,
                exit_history: VecDeque::new(),
                stop_requested: false,
            }),
            state_tx,
            stop_notify: Notify::new(),
        }
    }

    pub fn spec(&self) -> ProcessSpec {
        self.inner.read().spec.clone()
    }

    pub fn update_spec(&self, spec: ProcessSpec) {
        self.inner.write().spec = spec;
    }

    pub fn state(&self) -> ProcState {
        self.inner.read().state
    }

    pub fn set_state(&self, state: ProcState) {
        {
            let mut inner = self.inner.write();
            inner.state = state;
            if !matches!(state, ProcState::Running | ProcState::Stopping) {
                inner.pid = None;
                inner.started_at = None;
            }
        }
        self.state_tx.send_replace(state);
    }

    /// Single transition `Starting -> Running`: state and pid change under
    /// one write lock so no reader ever sees `Running` without a pid.
    pub fn set_running(&self, pid: u32) {
        {
            let mut inner = self.inner.write();
            inner.state = ProcState::Running;
            inner.pid = Some(pid);
            inner.started_at = Some(Instant::now());
        }
        self.state_tx.send_replace(ProcState::Running);
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ProcState> {
        self.state_tx.subscribe()
    }

    pub fn restart_count(&self) -> u32 {
        self.inner.read().restart_count
    }

    pub fn increment_restart_count(&self) {
        self.inner.write().restart_count += 1;
    }

    pub fn record_exit(&self, status: &ExitStatus) {
        let mut inner = self.inner.write();
        inner.exit_history.push_back(ExitRecord::from_status(status));
        while inner.exit_history.len() > EXIT_HISTORY_LIMIT {
            inner.exit_history.pop_front();
        }
        inner.pid = None;
        inner.started_at = None;
    }

    pub fn request_stop(&self) {
        self.inner.write().stop_requested = true;
        // notify_one banks a permit for a waiter that has not polled yet;
        // notify_waiters wakes one that already has.
        self.stop_notify.notify_one();
        self.stop_notify.notify_waiters();
    }

    pub fn clear_stop_request(&self) {
        self.inner.write().stop_requested = false;
    }

    pub fn stop_requested(&self) -> bool {
        self.inner.read().stop_requested
    }

    /// Resolves when a manual stop cancels whatever the monitor is waiting
    /// on (used to interrupt a backoff timer).
    pub async fn stopped_notified(&self) {
        self.stop_notify.notified().await;
    }

    pub fn snapshot(&self) -> ProcSnapshot {
        let inner = self.inner.read();
        ProcSnapshot {
            name: inner.spec.name.clone(),
            enabled: inner.spec.enabled,
            state: inner.state,
            pid: inner.pid,
            uptime: inner.started_at.map(|t| t.elapsed()),
            restart_count: inner.restart_count,
            last_exit: inner.exit_history.back().copied(),
        }
    }
}

/// Point-in-time view of one process, copied out under the state lock.
#[derive(Debug, Clone)]
pub struct ProcSnapshot {
    pub name: String,
    pub enabled: bool,
    pub state: ProcState,
    pub pid: Option<u32>,
    pub uptime: Option<Duration>,
    pub restart_count: u32,
    pub last_exit: Option<ExitRecord>,
}

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::policy::{self, Decision};
use crate::proc::{ManagedProc, ProcId, ProcSnapshot, ProcState};
use crate::process::{self, ExitStatus, Signal};
use crate::registry::Registry;
use crate::runner::{OutputRouter, ProcessRunner};

#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    ProcessStarted { id: ProcId, pid: u32 },
    ProcessExited { id: ProcId, status: ExitStatus },
    SpawnFailed { id: ProcId, error: String },
    RestartScheduled { id: ProcId, attempt: u32, delay: Duration },
    RestartsExhausted { id: ProcId },
    RegistryReloaded { summary: ReloadSummary },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReloadSummary {
    pub added: usize,
    pub removed: usize,
    pub started: usize,
    pub stopped: usize,
    pub updated: usize,
}

#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// How long to wait after SIGKILL before giving up on a stop.
    pub kill_timeout: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            kill_timeout: Duration::from_secs(5),
        }
    }
}

/// Owns every managed process. One monitor task per started process; all
/// control operations go through here and are serialized per process.
pub struct Supervisor {
    procs: DashMap<ProcId, Arc<ManagedProc>>,
    order: RwLock<Vec<ProcId>>,
    op_locks: DashMap<ProcId, Arc<tokio::sync::Mutex<()>>>,
    runner: Arc<dyn ProcessRunner>,
    router: Arc<dyn OutputRouter>,
    events_tx: mpsc::UnboundedSender<SupervisorEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<SupervisorEvent>>>,
    options: SupervisorOptions,
}

impl Supervisor {
    pub fn new(
        registry: &Registry,
        runner: Arc<dyn ProcessRunner>,
        router: Arc<dyn OutputRouter>,
        options: SupervisorOptions,
    ) -> crate::Result<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let supervisor = Self {
            procs: DashMap::new(),
            order: RwLock::new(Vec::new()),
            op_locks: DashMap::new(),
            runner,
            router,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            options,
        };
        for spec in registry.list() {
            let id = ProcId::new(&spec.name)?;
            supervisor
                .procs
                .insert(id.clone(), Arc::new(ManagedProc::new(id.clone(), spec.clone())));
            supervisor.order.write().push(id);
        }
        Ok(supervisor)
    }

    /// Takes the event stream. Yields `None` on subsequent calls.
    pub fn events(&self) -> Option<mpsc::UnboundedReceiver<SupervisorEvent>> {
        self.events_rx.lock().take()
    }

    fn lookup(&self, name: &str) -> crate::Result<(ProcId, Arc<ManagedProc>)> {
        let id = ProcId::new(name)?;
        let proc = self
            .procs
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| crate::Error::NotFound(name.to_string()))?;
        Ok((id, proc))
    }

    fn op_lock(&self, id: &ProcId) -> Arc<tokio::sync::Mutex<()>> {
        self.op_locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Start every enabled, currently startable process. Returns the number
    /// of processes asked to start; does not wait for any of them to reach
    /// `Running`.
    pub async fn start_all(&self) -> usize {
        let order = self.order.read().clone();
        let mut started = 0;
        for id in order {
            let Some(proc) = self.procs.get(&id).map(|e| e.value().clone()) else {
                continue;
            };
            if !proc.spec().enabled || !proc.state().is_startable() {
                continue;
            }
            let lock = self.op_lock(&id);
            let _guard = lock.lock().await;
            match self.start_locked(&proc) {
                Ok(()) => started += 1,
                Err(e) => warn!(proc = %id, error = %e, "failed to start"),
            }
        }
        started
    }

    pub async fn start(&self, name: &str) -> crate::Result<()> {
        let (id, proc) = self.lookup(name)?;
        let lock = self.op_lock(&id);
        let _guard = lock.lock().await;
        self.start_locked(&proc)
    }

    fn start_locked(&self, proc: &Arc<ManagedProc>) -> crate::Result<()> {
        let spec = proc.spec();
        if !spec.enabled {
            return Err(crate::Error::Disabled(spec.name));
        }
        if !proc.state().is_startable() {
            return Err(crate::Error::AlreadyRunning(spec.name));
        }
        proc.clear_stop_request();
        proc.set_state(ProcState::Starting);

        let monitor = Monitor {
            proc: proc.clone(),
            runner: self.runner.clone(),
            router: self.router.clone(),
            events: self.events_tx.clone(),
        };
        tokio::spawn(monitor.run());
        Ok(())
    }

    /// Polite stop with escalation: SIGTERM, wait out the grace period,
    /// SIGKILL. Cancels a pending backoff timer. Takes precedence over any
    /// policy-driven restart.
    pub async fn stop(&self, name: &str, grace: Option<Duration>) -> crate::Result<()> {
        let (id, proc) = self.lookup(name)?;
        let lock = self.op_lock(&id);
        let _guard = lock.lock().await;
        self.stop_locked(&proc, grace).await
    }

    async fn stop_locked(&self, proc: &Arc<ManagedProc>, grace: Option<Duration>) -> crate::Result<()> {
        let snap = proc.snapshot();
        if snap.state.is_settled() {
            return Err(crate::Error::AlreadyStopped(snap.name));
        }
        let grace = grace.unwrap_or(proc.spec().stop_timeout);

        proc.request_stop();
        if let Some(pid) = snap.pid {
            proc.set_state(ProcState::Stopping);
            process::signal_pid(pid, Signal::Terminate)?;
        }

        if !self.await_settled(proc, grace).await {
            if let Some(pid) = proc.snapshot().pid {
                warn!(proc = %proc.id, pid, "grace period elapsed, sending SIGKILL");
                process::signal_pid(pid, Signal::Kill)?;
            }
            if !self.await_settled(proc, self.options.kill_timeout).await {
                return Err(crate::Error::Timeout(proc.id.to_string()));
            }
        }
        Ok(())
    }

    /// Wait until the process settles (`Stopped`/`Failed`). If the monitor
    /// was mid-spawn when the stop request landed, the child surfaces as
    /// `Running` afterwards; the pending stop request is re-applied with a
    /// SIGTERM here.
    async fn await_settled(&self, proc: &Arc<ManagedProc>, timeout: Duration) -> bool {
        let mut rx = proc.subscribe_state();
        let deadline = Instant::now() + timeout;
        loop {
            let state = *rx.borrow_and_update();
            if state.is_settled() {
                return true;
            }
            if state.is_running() && proc.stop_requested() {
                if let Some(pid) = proc.snapshot().pid {
                    let _ = process::signal_pid(pid, Signal::Terminate);
                }
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            match tokio::time::timeout(remaining, rx.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) | Err(_) => return proc.state().is_settled(),
            }
        }
    }

    /// Stop, then start. Restart counters are not reset.
    pub async fn restart(&self, name: &str) -> crate::Result<()> {
        let (id, proc) = self.lookup(name)?;
        let lock = self.op_lock(&id);
        let _guard = lock.lock().await;
        match self.stop_locked(&proc, None).await {
            Ok(()) | Err(crate::Error::AlreadyStopped(_)) => {}
            Err(e) => return Err(e),
        }
        self.start_locked(&proc)
    }

    /// Fan out polite stops to every process, in parallel. `None` lets each
    /// process use its own spec `stop_timeout`; a shared grace is for daemon
    /// shutdown, where one deadline covers everything so no child is leaked.
    pub async fn stop_all(self: &Arc<Self>, grace: Option<Duration>) {
        let ids: Vec<ProcId> = self.order.read().clone();
        let mut tasks = Vec::new();
        for id in ids {
            let this = self.clone();
            tasks.push(tokio::spawn(async move {
                let Some(proc) = this.procs.get(&id).map(|e| e.value().clone()) else {
                    return;
                };
                let lock = this.op_lock(&id);
                let _guard = lock.lock().await;
                match this.stop_locked(&proc, grace).await {
                    Ok(()) | Err(crate::Error::AlreadyStopped(_)) => {}
                    Err(e) => error!(proc = %id, error = %e, "stop failed"),
                }
            }));
        }
        for task in tasks {
            let _ = task.await;
        }
    }

    /// Consistent point-in-time snapshots, in registry declaration order.
    pub fn status(&self, name: Option<&str>) -> crate::Result<Vec<ProcSnapshot>> {
        match name {
            Some(name) => {
                let (_, proc) = self.lookup(name)?;
                Ok(vec![proc.snapshot()])
            }
            None => {
                let order = self.order.read().clone();
                Ok(order
                    .iter()
                    .filter_map(|id| self.procs.get(id).map(|e| e.value().snapshot()))
                    .collect())
            }
        }
    }

    /// Apply a new registry against the running set. Added or newly enabled
    /// entries are started, removed entries are stopped and retired,
    /// disabled entries are stopped but kept visible, everything else is
    /// left untouched. A changed declaration for a running process is
    /// stored and takes effect on its next restart.
    pub async fn reload(self: &Arc<Self>, new: &Registry) -> crate::Result<ReloadSummary> {
        let mut summary = ReloadSummary::default();
        let mut new_order = Vec::with_capacity(new.len());
        let mut kept = HashSet::new();

        for spec in new.list() {
            let id = ProcId::new(&spec.name)?;
            new_order.push(id.clone());
            kept.insert(id.clone());

            let existing = self.procs.get(&id).map(|e| e.value().clone());
            match existing {
                Some(proc) => {
                    let old = proc.spec();
                    if old != *spec {
                        proc.update_spec(spec.clone());
                        summary.updated += 1;
                    }
                    let lock = self.op_lock(&id);
                    let _guard = lock.lock().await;
                    if spec.enabled && !old.enabled && proc.state().is_startable() {
                        self.start_locked(&proc)?;
                        summary.started += 1;
                    } else if !spec.enabled && !proc.state().is_settled() {
                        match self.stop_locked(&proc, None).await {
                            Ok(()) => summary.stopped += 1,
                            Err(crate::Error::AlreadyStopped(_)) => {}
                            Err(e) => warn!(proc = %id, error = %e, "stop on disable failed"),
                        }
                    }
                }
                None => {
                    let proc = Arc::new(ManagedProc::new(id.clone(), spec.clone()));
                    self.procs.insert(id.clone(), proc.clone());
                    summary.added += 1;
                    if spec.enabled {
                        let lock = self.op_lock(&id);
                        let _guard = lock.lock().await;
                        self.start_locked(&proc)?;
                        summary.started += 1;
                    }
                }
            }
        }

        let removed: Vec<ProcId> = self
            .order
            .read()
            .iter()
            .filter(|id| !kept.contains(*id))
            .cloned()
            .collect();
        for id in removed {
            if let Some(proc) = self.procs.get(&id).map(|e| e.value().clone()) {
                let lock = self.op_lock(&id);
                let _guard = lock.lock().await;
                match self.stop_locked(&proc, None).await {
                    Ok(()) => summary.stopped += 1,
                    Err(crate::Error::AlreadyStopped(_)) => {}
                    Err(e) => warn!(proc = %id, error = %e, "stop on removal failed"),
                }
            }
            self.procs.remove(&id);
            self.op_locks.remove(&id);
            self.router.detach(&id).await;
            summary.removed += 1;
        }

        *self.order.write() = new_order;
        info!(?summary, "registry reloaded");
        let _ = self
            .events_tx
            .send(SupervisorEvent::RegistryReloaded { summary });
        Ok(summary)
    }
}

/// Per-process monitor: spawn, hand pipes to the router, suspend until the
/// child exits, consult the policy engine, loop through backoff. Exactly
/// one monitor runs per started process; a hung child here never blocks
/// siblings or the control surface.
struct Monitor {
    proc: Arc<ManagedProc>,
    runner: Arc<dyn ProcessRunner>,
    router: Arc<dyn OutputRouter>,
    events: mpsc::UnboundedSender<SupervisorEvent>,
}

impl Monitor {
    async fn run(self) {
        loop {
            if self.proc.stop_requested() {
                self.proc.set_state(ProcState::Stopped);
                return;
            }
            self.proc.set_state(ProcState::Starting);
            let spec = self.proc.spec();

            let decision = match self.runner.spawn(&spec).await {
                Ok(mut handle) => {
                    let pid = handle.pid;
                    self.proc.set_running(pid);
                    info!(proc = %self.proc.id, pid, "process started");
                    let _ = self.events.send(SupervisorEvent::ProcessStarted {
                        id: self.proc.id.clone(),
                        pid,
                    });

                    if let Err(e) = self
                        .router
                        .attach(&self.proc.id, handle.take_stdout(), handle.take_stderr())
                        .await
                    {
                        warn!(proc = %self.proc.id, error = %e, "failed to attach log sinks");
                    }

                    let status = match handle.wait().await {
                        Ok(status) => status,
                        Err(e) => {
                            error!(proc = %self.proc.id, error = %e, "wait failed");
                            ExitStatus::new(None, None)
                        }
                    };
                    self.proc.record_exit(&status);
                    info!(proc = %self.proc.id, %status, "process exited");
                    let _ = self.events.send(SupervisorEvent::ProcessExited {
                        id: self.proc.id.clone(),
                        status,
                    });

                    if self.proc.stop_requested() {
                        self.proc.set_state(ProcState::Stopped);
                        return;
                    }
                    policy::decide_exit(&spec, &status, self.proc.restart_count())
                }
                Err(e) => {
                    warn!(proc = %self.proc.id, error = %e, "spawn failed");
                    let _ = self.events.send(SupervisorEvent::SpawnFailed {
                        id: self.proc.id.clone(),
                        error: e.to_string(),
                    });
                    if self.proc.stop_requested() {
                        self.proc.set_state(ProcState::Stopped);
                        return;
                    }
                    policy::decide_spawn_failure(&spec, self.proc.restart_count())
                }
            };

            match decision {
                Decision::Stop => {
                    self.proc.set_state(ProcState::Stopped);
                    return;
                }
                Decision::GiveUp => {
                    warn!(proc = %self.proc.id, "restart budget exhausted");
                    self.proc.set_state(ProcState::Failed);
                    let _ = self.events.send(SupervisorEvent::RestartsExhausted {
                        id: self.proc.id.clone(),
                    });
                    return;
                }
                Decision::Retry(delay) => {
                    let attempt = self.proc.restart_count() + 1;
                    debug!(proc = %self.proc.id, attempt, ?delay, "restart scheduled");
                    self.proc.set_state(ProcState::Backoff {
                        attempt,
                        until: Instant::now() + delay,
                    });
                    let _ = self.events.send(SupervisorEvent::RestartScheduled {
                        id: self.proc.id.clone(),
                        attempt,
                        delay,
                    });
                    let sleep = tokio::time::sleep(delay);
                    tokio::pin!(sleep);
                    loop {
                        tokio::select! {
                            _ = &mut sleep => {
                                self.proc.increment_restart_count();
                                break;
                            }
                            // A stale permit from an earlier lifecycle can
                            // wake this arm; only a live stop request wins.
                            _ = self.proc.stopped_notified() => {
                                if self.proc.stop_requested() {
                                    self.proc.set_state(ProcState::Stopped);
                                    return;
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

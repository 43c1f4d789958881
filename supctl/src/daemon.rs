use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use supctl_core::config::{DaemonConfig, RegistryWatcher};
use supctl_core::{NativeRunner, ProcId, Supervisor, SupervisorEvent, SupervisorOptions};
use supctl_ipc::{IpcConnection, IpcMessage, IpcResponse, IpcServer, LogTail, ReloadReport, StatusEntry};
use supctl_logging::{LogConfig, LogMultiplexer};
use tokio::sync::mpsc;
use tokio::time;
use tracing::{error, info, warn};

use crate::cli::DaemonArgs;

const REGISTRY_CANDIDATES: &[&str] = &["ecosystem.config.json", "ecosystem.config", "supctl.json"];

pub struct Daemon {
    supervisor: Arc<Supervisor>,
    multiplexer: Arc<LogMultiplexer>,
    watcher: Arc<RegistryWatcher>,
    server: IpcServer,
    config: DaemonConfig,
}

fn registry_path(flag: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(path) = flag {
        return Ok(path);
    }
    for candidate in REGISTRY_CANDIDATES {
        let path = PathBuf::from(candidate);
        if path.exists() {
            return Ok(path);
        }
    }
    anyhow::bail!(
        "no registry file found; pass --config or create one of: {}",
        REGISTRY_CANDIDATES.join(", ")
    )
}

impl Daemon {
    pub async fn new(socket: PathBuf, args: DaemonArgs) -> anyhow::Result<Self> {
        let config_path = registry_path(args.config)?;
        // A broken registry at boot is fatal; a broken one at reload is not.
        let watcher = Arc::new(
            RegistryWatcher::new(&config_path)
                .await
                .with_context(|| format!("loading registry {}", config_path.display()))?,
        );

        let config = DaemonConfig {
            socket_path: socket.clone(),
            log_dir: args
                .log_dir
                .unwrap_or_else(supctl_core::config::default_log_dir),
            ..DaemonConfig::default()
        };

        let multiplexer = Arc::new(LogMultiplexer::new(LogConfig {
            base_dir: config.log_dir.clone(),
            ..LogConfig::default()
        }));

        let supervisor = Arc::new(Supervisor::new(
            &watcher.get(),
            Arc::new(NativeRunner::new()),
            multiplexer.clone(),
            SupervisorOptions::default(),
        )?);

        let server = IpcServer::bind(&socket).await?;
        info!(
            registry = %config_path.display(),
            socket = %socket.display(),
            "daemon initialized"
        );

        Ok(Self {
            supervisor,
            multiplexer,
            watcher,
            server,
            config,
        })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let started = self.supervisor.start_all().await;
        info!(count = started, "processes started");

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        setup_signal_handlers(shutdown_tx.clone());

        let mut events = self
            .supervisor
            .events()
            .context("supervisor events already taken")?;
        let mut reload_interval = time::interval(self.config.reload_poll());
        reload_interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        // The first tick fires immediately; consume it.
        reload_interval.tick().await;

        loop {
            tokio::select! {
                conn = self.server.accept() => {
                    match conn {
                        Ok(conn) => {
                            let handler = ConnectionHandler {
                                supervisor: self.supervisor.clone(),
                                multiplexer: self.multiplexer.clone(),
                                watcher: self.watcher.clone(),
                                shutdown: shutdown_tx.clone(),
                            };
                            tokio::spawn(handler.serve(conn));
                        }
                        Err(e) => warn!(error = %e, "accept failed"),
                    }
                }

                Some(event) = events.recv() => {
                    log_event(&event);
                }

                _ = reload_interval.tick() => {
                    match self.watcher.check_reload().await {
                        Ok(true) => {
                            let registry = self.watcher.get();
                            match self.supervisor.reload(&registry).await {
                                Ok(summary) => info!(?summary, "registry file changed, applied"),
                                Err(e) => error!(error = %e, "reload failed"),
                            }
                        }
                        Ok(false) => {}
                        Err(e) => warn!(error = %e, "registry check failed"),
                    }
                }

                _ = shutdown_rx.recv() => {
                    info!("shutdown requested");
                    break;
                }
            }
        }

        self.supervisor.stop_all(Some(self.config.grace())).await;
        if let Err(e) = self.multiplexer.manager().flush_all().await {
            warn!(error = %e, "final log flush failed");
        }
        self.multiplexer.manager().close_all().await;
        info!("daemon stopped");
        Ok(())
    }
}

struct ConnectionHandler {
    supervisor: Arc<Supervisor>,
    multiplexer: Arc<LogMultiplexer>,
    watcher: Arc<RegistryWatcher>,
    shutdown: mpsc::Sender<()>,
}

impl ConnectionHandler {
    async fn serve(self, mut conn: IpcConnection) {
        loop {
            let msg = match conn.recv_message().await {
                Ok(msg) => msg,
                // EOF or a garbled frame; either way the conversation is over.
                Err(_) => return,
            };
            let response = self.handle(msg).await;
            if conn.send_response(&response).await.is_err() {
                return;
            }
        }
    }

    async fn handle(&self, msg: IpcMessage) -> IpcResponse {
        match msg {
            IpcMessage::Start { name: Some(name) } => match self.supervisor.start(&name).await {
                Ok(()) => IpcResponse::Ok {
                    message: format!("started {name}"),
                },
                Err(e) => IpcResponse::Error {
                    message: e.to_string(),
                },
            },
            IpcMessage::Start { name: None } => {
                let count = self.supervisor.start_all().await;
                IpcResponse::Ok {
                    message: format!("started {count} processes"),
                }
            }
            IpcMessage::Stop { name: Some(name), grace_secs } => {
                let grace = grace_secs.map(Duration::from_secs);
                match self.supervisor.stop(&name, grace).await {
                    Ok(()) => IpcResponse::Ok {
                        message: format!("stopped {name}"),
                    },
                    Err(e) => IpcResponse::Error {
                        message: e.to_string(),
                    },
                }
            }
            IpcMessage::Stop { name: None, grace_secs } => {
                // Without an explicit timeout every process gets its own
                // spec `stop_timeout`, same as a single-name stop.
                self.supervisor
                    .stop_all(grace_secs.map(Duration::from_secs))
                    .await;
                IpcResponse::Ok {
                    message: "stopped all processes".to_string(),
                }
            }
            IpcMessage::Restart { name } => match self.supervisor.restart(&name).await {
                Ok(()) => IpcResponse::Ok {
                    message: format!("restarted {name}"),
                },
                Err(e) => IpcResponse::Error {
                    message: e.to_string(),
                },
            },
            IpcMessage::Status { name } => match self.supervisor.status(name.as_deref()) {
                Ok(snapshots) => IpcResponse::Status {
                    processes: snapshots.iter().map(StatusEntry::from).collect(),
                },
                Err(e) => IpcResponse::Error {
                    message: e.to_string(),
                },
            },
            IpcMessage::Reload => {
                let registry = match self.watcher.force_reload().await {
                    Ok(registry) => registry,
                    Err(e) => {
                        return IpcResponse::Error {
                            message: format!("registry reload failed: {e}"),
                        };
                    }
                };
                match self.supervisor.reload(&registry).await {
                    Ok(summary) => IpcResponse::Reloaded {
                        summary: ReloadReport::from(&summary),
                    },
                    Err(e) => IpcResponse::Error {
                        message: e.to_string(),
                    },
                }
            }
            IpcMessage::Logs { name, lines } => self.read_logs(name, lines).await,
            IpcMessage::Shutdown => {
                let _ = self.shutdown.send(()).await;
                IpcResponse::Ok {
                    message: "shutting down".to_string(),
                }
            }
        }
    }

    async fn read_logs(&self, name: Option<String>, lines: usize) -> IpcResponse {
        let manager = self.multiplexer.manager();
        match name {
            Some(name) => {
                let id = match ProcId::new(&name) {
                    Ok(id) => id,
                    Err(e) => {
                        return IpcResponse::Error {
                            message: e.to_string(),
                        };
                    }
                };
                match manager.read_structured_logs(&id, lines).await {
                    Ok(logs) => IpcResponse::Logs {
                        logs: vec![LogTail {
                            name,
                            output: logs.output,
                            errors: logs.errors,
                        }],
                    },
                    Err(e) => IpcResponse::Error {
                        message: e.to_string(),
                    },
                }
            }
            None => match manager.read_all_logs(lines).await {
                Ok(all) => IpcResponse::Logs {
                    logs: all
                        .into_iter()
                        .map(|(name, logs)| LogTail {
                            name,
                            output: logs.output,
                            errors: logs.errors,
                        })
                        .collect(),
                },
                Err(e) => IpcResponse::Error {
                    message: e.to_string(),
                },
            },
        }
    }
}

fn log_event(event: &SupervisorEvent) {
    match event {
        SupervisorEvent::ProcessStarted { id, pid } => {
            info!(proc = %id, pid, "process started");
        }
        SupervisorEvent::ProcessExited { id, status } => {
            info!(proc = %id, %status, "process exited");
        }
        SupervisorEvent::SpawnFailed { id, error } => {
            error!(proc = %id, error, "spawn failed");
        }
        SupervisorEvent::RestartScheduled { id, attempt, delay } => {
            info!(proc = %id, attempt, ?delay, "restart scheduled");
        }
        SupervisorEvent::RestartsExhausted { id } => {
            warn!(proc = %id, "restart budget exhausted");
        }
        SupervisorEvent::RegistryReloaded { summary } => {
            info!(?summary, "registry reloaded");
        }
    }
}

fn setup_signal_handlers(shutdown_tx: mpsc::Sender<()>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        tokio::spawn(async move {
            let Ok(mut sigterm) = signal(SignalKind::terminate()) else {
                return;
            };
            let Ok(mut sigint) = signal(SignalKind::interrupt()) else {
                return;
            };
            tokio::select! {
                _ = sigterm.recv() => info!("received SIGTERM"),
                _ = sigint.recv() => info!("received SIGINT"),
            }
            let _ = shutdown_tx.send(()).await;
        });
    }
    #[cfg(not(unix))]
    {
        let _ = shutdown_tx;
    }
}

pub async fn run(socket: PathBuf, args: DaemonArgs) -> anyhow::Result<()> {
    Daemon::new(socket, args).await?.run().await
}

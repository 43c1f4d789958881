use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "supctl")]
#[command(about = "Supervisor for long-running worker processes", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Control socket of the daemon
    #[arg(long, env = "SUPCTL_SOCKET", global = true)]
    pub socket: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start one process, or every enabled process
    Start(StartArgs),

    /// Stop one process, or all of them
    Stop(StopArgs),

    /// Stop and start a process
    Restart(RestartArgs),

    /// Show process states
    Status(StatusArgs),

    /// Tail process logs
    Logs(LogsArgs),

    /// Re-read the registry file and apply the changes
    Reload,

    /// Run the supervisor daemon (internal use)
    #[command(hide = true)]
    Daemon(DaemonArgs),
}

#[derive(Parser)]
pub struct StartArgs {
    /// Process name (omit to start every enabled process)
    pub name: Option<String>,
}

#[derive(Parser)]
pub struct StopArgs {
    /// Process name (omit to stop everything)
    pub name: Option<String>,

    /// Grace period before SIGKILL (seconds)
    #[arg(short, long)]
    pub timeout: Option<u64>,
}

#[derive(Parser)]
pub struct RestartArgs {
    /// Process name
    pub name: String,
}

#[derive(Parser)]
pub struct StatusArgs {
    /// Process name (optional)
    pub name: Option<String>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

#[derive(Parser)]
pub struct LogsArgs {
    /// Process name (omit to show every process)
    pub name: Option<String>,

    /// Number of lines to show
    #[arg(short, long, default_value = "20")]
    pub lines: usize,

    /// Show stderr lines before stdout
    #[arg(long)]
    pub errors_first: bool,
}

#[derive(Parser, Debug)]
pub struct DaemonArgs {
    /// Registry file path
    #[arg(short, long, env = "SUPCTL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory for process log files
    #[arg(short, long, env = "SUPCTL_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_without_name_means_all() {
        let cli = Cli::parse_from(["supctl", "start"]);
        match cli.command {
            Command::Start(args) => assert_eq!(args.name, None),
            _ => panic!("expected start"),
        }
    }

    #[test]
    fn stop_with_name_and_timeout() {
        let cli = Cli::parse_from(["supctl", "stop", "server", "--timeout", "30"]);
        match cli.command {
            Command::Stop(args) => {
                assert_eq!(args.name.as_deref(), Some("server"));
                assert_eq!(args.timeout, Some(30));
            }
            _ => panic!("expected stop"),
        }
    }

    #[test]
    fn restart_requires_a_name() {
        assert!(Cli::try_parse_from(["supctl", "restart"]).is_err());
        let cli = Cli::parse_from(["supctl", "restart", "pallet-stream"]);
        match cli.command {
            Command::Restart(args) => assert_eq!(args.name, "pallet-stream"),
            _ => panic!("expected restart"),
        }
    }

    #[test]
    fn status_defaults() {
        let cli = Cli::parse_from(["supctl", "status"]);
        match cli.command {
            Command::Status(args) => {
                assert_eq!(args.name, None);
                assert!(!args.json);
            }
            _ => panic!("expected status"),
        }
    }

    #[test]
    fn logs_defaults_to_twenty_lines() {
        let cli = Cli::parse_from(["supctl", "logs", "server"]);
        match cli.command {
            Command::Logs(args) => {
                assert_eq!(args.name.as_deref(), Some("server"));
                assert_eq!(args.lines, 20);
                assert!(!args.errors_first);
            }
            _ => panic!("expected logs"),
        }
    }

    #[test]
    fn global_socket_flag_parses_after_subcommand() {
        let cli = Cli::parse_from(["supctl", "status", "--socket", "/tmp/x.sock"]);
        assert_eq!(cli.socket, Some(PathBuf::from("/tmp/x.sock")));
    }

    #[test]
    fn daemon_accepts_config_and_log_dir() {
        let cli = Cli::parse_from([
            "supctl",
            "daemon",
            "--config",
            "ecosystem.config.json",
            "--log-dir",
            "/var/log/supctl",
        ]);
        match cli.command {
            Command::Daemon(args) => {
                assert_eq!(args.config, Some(PathBuf::from("ecosystem.config.json")));
                assert_eq!(args.log_dir, Some(PathBuf::from("/var/log/supctl")));
            }
            _ => panic!("expected daemon"),
        }
    }
}

use crate::cli::StatusArgs;
use crate::common::{self, RUNNING_ICON, STOPPED_ICON, format_duration};
use colored::Colorize;
use std::path::PathBuf;
use supctl_ipc::{IpcMessage, IpcResponse, StatusEntry};
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "")]
    icon: String,
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "state")]
    state: String,
    #[tabled(rename = "pid")]
    pid: String,
    #[tabled(rename = "uptime")]
    uptime: String,
    #[tabled(rename = "restarts")]
    restarts: String,
    #[tabled(rename = "last exit")]
    last_exit: String,
}

fn row(entry: &StatusEntry) -> StatusRow {
    let icon = if entry.state == "running" {
        RUNNING_ICON.green().to_string()
    } else if entry.state == "failed" {
        STOPPED_ICON.red().to_string()
    } else {
        STOPPED_ICON.to_string()
    };

    let state = match entry.state.as_str() {
        "running" => entry.state.green().to_string(),
        "failed" => entry.state.red().to_string(),
        "backoff" | "starting" | "stopping" => entry.state.yellow().to_string(),
        _ if !entry.enabled => format!("{} (disabled)", entry.state),
        _ => entry.state.clone(),
    };

    let last_exit = match (entry.last_exit_code, entry.last_exit_signal) {
        (Some(code), _) => format!("code {code}"),
        (None, Some(signal)) => format!("signal {signal}"),
        (None, None) => "-".to_string(),
    };

    StatusRow {
        icon,
        name: entry.name.clone(),
        state,
        pid: entry.pid.map_or_else(|| "-".to_string(), |p| p.to_string()),
        uptime: entry
            .uptime_secs
            .map_or_else(|| "-".to_string(), format_duration),
        restarts: entry.restart_count.to_string(),
        last_exit,
    }
}

pub async fn execute(socket: &PathBuf, args: StatusArgs) -> anyhow::Result<()> {
    let response = common::request(socket, IpcMessage::Status { name: args.name }).await?;
    let IpcResponse::Status { processes } = response else {
        anyhow::bail!("unexpected response from daemon");
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&processes)?);
        return Ok(());
    }

    if processes.is_empty() {
        println!("no processes");
        return Ok(());
    }

    let rows: Vec<StatusRow> = processes.iter().map(row).collect();
    let mut table = Table::new(rows);
    table.with(Style::blank());
    println!("{table}");
    Ok(())
}

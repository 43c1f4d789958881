use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use supctl_ipc::{IpcClient, IpcConnection, IpcMessage, IpcResponse};
use tokio::time::timeout;
use tracing::debug;

pub const SUCCESS_ICON: &str = "✓";
pub const RUNNING_ICON: &str = "●";
pub const STOPPED_ICON: &str = "○";

/// CLI flag / env override, falling back to the platform default.
pub fn socket_path(flag: Option<PathBuf>) -> PathBuf {
    flag.unwrap_or_else(supctl_core::config::default_socket_path)
}

pub async fn connect_to_daemon(socket: &PathBuf) -> Result<IpcConnection> {
    debug!(socket = %socket.display(), "connecting to daemon");
    match timeout(Duration::from_secs(5), IpcClient::connect(socket)).await {
        Ok(Ok(conn)) => Ok(conn),
        Ok(Err(e)) => Err(e).context(format!(
            "cannot reach the daemon at {}. Is it running? Start it with 'supctl daemon'",
            socket.display()
        )),
        Err(_) => anyhow::bail!("connection to daemon timed out"),
    }
}

/// One exchange with the daemon; `Error` responses become CLI errors.
pub async fn request(socket: &PathBuf, msg: IpcMessage) -> Result<IpcResponse> {
    let mut conn = connect_to_daemon(socket).await?;
    let response = timeout(Duration::from_secs(60), conn.request(&msg))
        .await
        .map_err(|_| anyhow::anyhow!("daemon did not respond in time"))??;
    match response {
        IpcResponse::Error { message } => Err(anyhow::anyhow!(message)),
        other => Ok(other),
    }
}

pub fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_format_by_magnitude() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(59), "59s");
        assert_eq!(format_duration(125), "2m 5s");
        assert_eq!(format_duration(3665), "1h 1m");
        assert_eq!(format_duration(90061), "1d 1h");
    }

    #[test]
    fn explicit_socket_flag_wins() {
        let path = socket_path(Some(PathBuf::from("/tmp/custom.sock")));
        assert_eq!(path, PathBuf::from("/tmp/custom.sock"));
    }
}

use crate::common::{self, SUCCESS_ICON};
use std::path::PathBuf;
use supctl_ipc::{IpcMessage, IpcResponse};

pub async fn execute(socket: &PathBuf) -> anyhow::Result<()> {
    let response = common::request(socket, IpcMessage::Reload).await?;
    match response {
        IpcResponse::Reloaded { summary } => {
            println!(
                "{SUCCESS_ICON} registry reloaded: {} added, {} removed, {} started, {} stopped, {} updated",
                summary.added, summary.removed, summary.started, summary.stopped, summary.updated
            );
        }
        IpcResponse::Ok { message } => println!("{SUCCESS_ICON} {message}"),
        other => anyhow::bail!("unexpected response: {other:?}"),
    }
    Ok(())
}

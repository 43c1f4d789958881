use crate::cli::RestartArgs;
use crate::common::{self, SUCCESS_ICON};
use std::path::PathBuf;
use supctl_ipc::{IpcMessage, IpcResponse};

pub async fn execute(socket: &PathBuf, args: RestartArgs) -> anyhow::Result<()> {
    let response = common::request(socket, IpcMessage::Restart { name: args.name }).await?;
    if let IpcResponse::Ok { message } = response {
        println!("{SUCCESS_ICON} {message}");
    }
    Ok(())
}

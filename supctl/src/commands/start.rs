use crate::cli::StartArgs;
use crate::common::{self, SUCCESS_ICON};
use std::path::PathBuf;
use supctl_ipc::{IpcMessage, IpcResponse};

pub async fn execute(socket: &PathBuf, args: StartArgs) -> anyhow::Result<()> {
    let target = args.name.clone();
    let response = common::request(socket, IpcMessage::Start { name: args.name }).await?;
    if let IpcResponse::Ok { message } = response {
        println!("{SUCCESS_ICON} {message}");
    } else if let Some(name) = target {
        println!("{SUCCESS_ICON} started {name}");
    }
    Ok(())
}

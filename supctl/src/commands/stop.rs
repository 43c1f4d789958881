use crate::cli::StopArgs;
use crate::common::{self, SUCCESS_ICON};
use std::path::PathBuf;
use supctl_ipc::{IpcMessage, IpcResponse};

pub async fn execute(socket: &PathBuf, args: StopArgs) -> anyhow::Result<()> {
    let response = common::request(
        socket,
        IpcMessage::Stop {
            name: args.name,
            grace_secs: args.timeout,
        },
    )
    .await?;
    if let IpcResponse::Ok { message } = response {
        println!("{SUCCESS_ICON} {message}");
    }
    Ok(())
}

use crate::cli::LogsArgs;
use crate::common;
use colored::Colorize;
use std::path::PathBuf;
use supctl_ipc::{IpcMessage, IpcResponse, LogTail};

fn print_tail(tail: &LogTail, errors_first: bool, heading: bool) {
    if heading {
        println!("{}", format!("=== {} ===", tail.name).bold());
    }
    let print_output = || {
        for line in &tail.output {
            println!("{line}");
        }
    };
    let print_errors = || {
        for line in &tail.errors {
            println!("{}", line.red());
        }
    };
    if errors_first {
        print_errors();
        print_output();
    } else {
        print_output();
        print_errors();
    }
}

pub async fn execute(socket: &PathBuf, args: LogsArgs) -> anyhow::Result<()> {
    let response = common::request(
        socket,
        IpcMessage::Logs {
            name: args.name,
            lines: args.lines,
        },
    )
    .await?;
    let IpcResponse::Logs { logs } = response else {
        anyhow::bail!("unexpected response from daemon");
    };

    if logs.is_empty() {
        println!("no logs");
        return Ok(());
    }

    let heading = logs.len() > 1;
    for tail in &logs {
        print_tail(tail, args.errors_first, heading);
    }
    Ok(())
}

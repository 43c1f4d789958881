mod cli;
mod commands;
mod common;
mod daemon;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = cli::Cli::parse();
    let socket = common::socket_path(cli.socket);

    match cli.command {
        cli::Command::Start(args) => commands::start::execute(&socket, args).await,
        cli::Command::Stop(args) => commands::stop::execute(&socket, args).await,
        cli::Command::Restart(args) => commands::restart::execute(&socket, args).await,
        cli::Command::Status(args) => commands::status::execute(&socket, args).await,
        cli::Command::Logs(args) => commands::logs::execute(&socket, args).await,
        cli::Command::Reload => commands::reload::execute(&socket).await,
        cli::Command::Daemon(args) => daemon::run(socket, args).await,
    }
}

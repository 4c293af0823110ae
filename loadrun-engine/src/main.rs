use clap::{Parser, Subcommand};
use loadrun_engine::cli::{self, RunArgs};
use std::process;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "loadrun", version, about = "HTTP load generator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a workload file against its target
    Run(RunArgs),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping the run");
            ctrl_c.cancel();
        }
    });

    let exit_code = match cli.command {
        Command::Run(args) => cli::run(&args, shutdown, &mut std::io::stdout()).await,
    };
    process::exit(exit_code);
}

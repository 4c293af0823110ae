use clap::Parser;
use loadrun_target::config::DEFAULT_ADDR;
use loadrun_target::{Server, ServerConfig};
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "loadrun-target", about = "Demo product API to point load tests at")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = DEFAULT_ADDR)]
    addr: SocketAddr,

    /// Start with an empty catalogue (GET /products then answers 404).
    #[arg(long)]
    empty: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = ServerConfig { address: args.addr, seed: !args.empty };

    let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();

    // Print "Listening on <addr>" once the server signals it is bound.
    tokio::spawn(async move {
        if let Ok(addr) = ready_rx.await {
            println!("Listening on {}", addr);
        }
    });

    Server::new(config).run(ready_tx).await?;
    Ok(())
}

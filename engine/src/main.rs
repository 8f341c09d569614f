use std::net::SocketAddr;

use anyhow::Context;
use clap::{Parser, Subcommand};
use drover_server::{serve, AppState};

#[derive(Parser, Debug)]
#[command(name = "drover-engine")]
#[command(about = "Cloud-phone workflow automation service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Serve {
        #[arg(long, alias = "host", default_value = "127.0.0.1")]
        hostname: String,
        #[arg(long, default_value_t = 3000)]
        port: u16,
        /// RPA provider base URL; the provider default is used when unset.
        #[arg(long, env = "DROVER_RPA_BASE_URL")]
        api_base_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve {
            hostname,
            port,
            api_base_url,
        } => {
            let addr: SocketAddr = format!("{hostname}:{port}")
                .parse()
                .with_context(|| format!("invalid listen address {hostname}:{port}"))?;
            let state = AppState::new(api_base_url);
            serve(addr, state).await
        }
    }
}

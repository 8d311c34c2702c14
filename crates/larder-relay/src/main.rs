//! Larder relay server binary

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use larder_logging::{ConsoleFormat, LarderSubscriberBuilder};
use larder_relay::ServerConfig;
use tracing::info;

/// Shared document store for Larder sync groups
#[derive(Debug, Parser)]
#[command(name = "larder-relay", version, about)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Directory for group stores (memory only when omitted)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Log level, e.g. "debug"
    #[arg(long)]
    log_level: Option<String>,

    /// Human-readable console logs instead of JSON lines
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServerConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config = config.with_bind(bind);
    }
    if let Some(dir) = &args.data_dir {
        config = config.with_data_dir(dir);
    }

    let mut logging = LarderSubscriberBuilder::new().with_config(config.log.clone());
    if let Some(level) = &args.log_level {
        logging = logging.with_level(level);
    }
    if args.pretty {
        logging = logging.with_console(ConsoleFormat::Pretty);
    }
    let _log_guard = logging.try_init().context("initializing logging")?;

    info!(bind = %config.bind, data_dir = ?config.data_dir, "Starting larder-relay");
    larder_relay::serve(config).await.context("relay server failed")?;
    Ok(())
}

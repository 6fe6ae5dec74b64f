use std::path::PathBuf;

use clap::Parser;

use file_organizer::{logging, server, AppConfig, AppState};

#[derive(Parser)]
#[command(
    name = "file-organizer",
    version,
    about = "Scan a directory, validate a proposed reorganization, apply it reversibly"
)]
struct Args {
    /// Config file (defaults to ./file-organizer.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    bind: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// Where the database lives
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(data_dir) = args.data_dir {
        config.data_dir = Some(data_dir);
    }

    logging::init(&config.log_level)?;

    let bind = config.bind.clone();
    let port = config.port;
    let state = AppState::open(config)?;
    server::serve(state, &bind, port).await?;
    Ok(())
}

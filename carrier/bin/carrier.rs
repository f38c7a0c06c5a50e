#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::path::PathBuf;

use carrier::{Carrier, config};
use clap::Parser;

/// Queued email delivery service
#[derive(Parser, Debug)]
#[command(name = "carrier", version)]
struct Args {
    /// Configuration file (RON)
    #[arg(short, long, env = config::CONFIG_ENV)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config_path = config::find_config_file(args.config.as_deref())?;
    let carrier = Carrier::load(&config_path)?;

    carrier.run().await
}

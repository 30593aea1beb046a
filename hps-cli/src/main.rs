//! HPS CLI - builds a labeled dataset of hydropower plants and river
//! background points from remote indicator services.

use clap::Parser;

#[derive(Parser)]
#[command(
    name = "hps-cli",
    version,
    about = "Hydropower site dataset toolkit"
)]
struct Cli {
    #[command(subcommand)]
    command: hps_cmd::Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    log::debug!("hps-cli {}", env!("CARGO_PKG_VERSION"));
    hps_cmd::run(cli.command).await
}

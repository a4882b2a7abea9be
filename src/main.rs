use clap::Parser;
use color_eyre::eyre::Result;
use lottery_client::{
    config::Cli,
    logging,
};

mod client;
mod ui;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let config = Cli::parse().resolve()?;
    let _log_guard = logging::init_tracing(&config.log_dir)?;
    tracing::info!(network = %config.network, "starting lottery client");
    client::run_app(config).await
}

// src/main.rs
use clap::Parser;
use passvault::{cli, error::AppError};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    env_logger::init();
    log::info!("Starting passvault");

    let cli_args = cli::Cli::parse();
    if let Err(e) = cli::handle_cli_command(cli_args).await {
        log::error!("Application failed: {:#?}", e);
        eprintln!("Error: {}", e);
        return Err(e);
    }

    log::info!("passvault finished successfully.");
    Ok(())
}

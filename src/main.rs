use brocade::config::{AppConfig, setup_logging};
use clap::Parser;
use tracing::{error, warn};

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    // a missing .env is normal in deployment
    let dotenv = dotenvy::dotenv();

    let cli = brocade::cli::CliOptions::parse();

    if setup_logging(cli.debug).is_err() {
        return;
    }
    if let Err(err) = dotenv
        && !err.not_found()
    {
        warn!("Failed to load .env: {}", err);
    }

    let config = match AppConfig::from_cli(&cli) {
        Ok(config) => config,
        Err(err) => {
            error!("Configuration error: {}", err);
            std::process::exit(1);
        }
    };

    if let Err(err) = brocade::web::setup_server(&cli.listen_address, cli.port, config).await {
        error!("Application error: {}", err);
        std::process::exit(1);
    }
}

use std::process::ExitCode;
use std::sync::Arc;

use boardsmith::config::{Config, setup_logging};
use boardsmith::model::ClaudeClient;
use clap::Parser;
use tracing::{debug, error};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    let cli = boardsmith::cli::CliOptions::parse();

    if setup_logging(cli.debug).is_err() {
        return ExitCode::FAILURE;
    }

    let config = match Config::try_from(&cli) {
        Ok(config) => config,
        Err(err) => {
            error!("Configuration error: {}", err);
            return ExitCode::FAILURE;
        }
    };
    debug!("{:?}", config);

    let client = match ClaudeClient::new(&config) {
        Ok(client) => client,
        Err(err) => {
            error!("Failed to create model client: {}", err);
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = boardsmith::web::setup_server(config, Arc::new(client)).await {
        error!("Application error: {}", err);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

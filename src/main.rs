use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use gate::cli::{Cli, CliHandler, Completion};
use gate::config::Settings;
use gate::{crypto, logging, BridgeError};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("Error: {}", err);
            return ExitCode::FAILURE;
        }
    };
    logging::init(&settings.log_dir);

    if crypto::init().is_err() {
        eprintln!("Error: failed to initialize libsodium");
        return ExitCode::FAILURE;
    }

    let mut handler = CliHandler::new(settings);
    match handler.run(cli).await {
        Ok(Completion::Done) => ExitCode::SUCCESS,
        Ok(Completion::Interrupted(signal)) => {
            eprintln!("\nReceived {}. Exiting gracefully...", signal.name());
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %format!("{:#}", err), "command failed");
            match err.downcast_ref::<BridgeError>().and_then(BridgeError::exit_code) {
                Some(code) => {
                    eprintln!("{}", err);
                    ExitCode::from(code)
                }
                None => {
                    eprintln!("Error: {:#}", err);
                    ExitCode::FAILURE
                }
            }
        }
    }
}

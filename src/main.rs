// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use cutting_inference::cli::args::{Cli, Commands};
use cutting_inference::cli::{logging, predict, serve};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let result = match cli.command {
        Commands::Serve(args) => serve::run_server(&args).await,
        Commands::Predict(args) => predict::run(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

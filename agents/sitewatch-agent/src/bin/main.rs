//! Sitewatch agent entry point

use clap::Parser;
use sitewatch_agent::cli::{self, SitewatchCli};
use sitewatch_agent::telemetry::init_tracing;

#[tokio::main]
async fn main() {
    // A missing .env file is fine.
    dotenv::dotenv().ok();

    let cli = SitewatchCli::parse();
    init_tracing(cli.verbose, cli.quiet, cli.log_format);

    let code = match cli::run(cli).await {
        Ok(code) => code,
        Err(e) => {
            let code = e.exit_code();
            let err = anyhow::Error::new(e).context("sitewatch command failed");
            let message = format!("{:#}", err);
            tracing::error!(error = %message, exit_code = i32::from(code), "Command failed");
            eprintln!("Error: {}", message);
            code
        }
    };

    std::process::exit(code.into());
}

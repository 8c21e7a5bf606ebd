//! healthprobe-cli binary

use clap::Parser;
use healthprobe_cli::{Cli, Config, Outcome, app};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logging is configured from the file, so errors here go straight to stderr
    let config = match Config::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return Outcome::ConfigError.into();
        }
    };

    app::init_logging(&config.logging);
    tracing::debug!(probes = config.probes.len(), "Configuration loaded");

    let mut stdout = std::io::stdout().lock();
    match app::execute(&cli, &config, &mut stdout).await {
        Ok(outcome) => outcome.into(),
        Err(e) => {
            tracing::error!(error = %e, "Probe run aborted");
            eprintln!("{}", e);
            e.outcome().into()
        }
    }
}

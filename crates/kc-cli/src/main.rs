//! # Keycloak audit CLI
//!
//! Command-line client for the admin audit service.

#![forbid(unsafe_code)]
#![deny(warnings)]

use clap::Parser;
use kc_cli::{
    cli::{Cli, Command},
    commands::{run_audit, run_checksum, run_config, run_status, ApiClient},
    config::CliConfig,
    output::error,
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load configuration
    let mut config = match CliConfig::load() {
        Ok(c) => c,
        Err(e) => {
            error(&format!("Failed to load configuration: {e}"));
            std::process::exit(1);
        }
    };
    let format = cli.output.unwrap_or(config.output_format);

    // Execute command
    let result = match cli.command {
        Command::Audit(cmd) => {
            match ApiClient::new(&config, cli.server.as_deref(), cli.token.as_deref()) {
                Ok(client) => run_audit(cmd, &client, format).await,
                Err(e) => Err(e),
            }
        }
        Command::Checksum(args) => run_checksum(&args, format),
        Command::Config(cmd) => run_config(cmd, &mut config),
        Command::Status => {
            match ApiClient::new(&config, cli.server.as_deref(), cli.token.as_deref()) {
                Ok(client) => run_status(&client).await,
                Err(e) => Err(e),
            }
        }
    };

    if let Err(e) = result {
        error(&e.to_string());
        std::process::exit(1);
    }
}

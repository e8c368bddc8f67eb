//! Configuration management and status commands.

use crate::cli::ConfigCommand;
use crate::config::OutputFormat;
use crate::output::{info, success, warning};
use crate::{CliConfig, CliError};

/// Runs a config command.
pub fn run_config(cmd: ConfigCommand, config: &mut CliConfig) -> crate::CliResult<()> {
    match cmd {
        ConfigCommand::Show => show_config(config),
        ConfigCommand::Set { key, value } => {
            set_value(config, &key, &value)?;
            config.save()?;
            success(&format!("Set {key}"));
            Ok(())
        }
        ConfigCommand::Init => init_config(config),
    }
}

/// Shows the current configuration.
fn show_config(config: &CliConfig) -> crate::CliResult<()> {
    let config_path = CliConfig::config_path()?;

    info(&format!("Configuration file: {}", config_path.display()));
    println!();
    println!("server_url: {}", config.server_url);
    println!(
        "token: {}",
        if config.token.is_some() { "(set)" } else { "(none)" }
    );
    println!("output_format: {:?}", config.output_format);

    Ok(())
}

/// Sets a configuration value.
fn set_value(config: &mut CliConfig, key: &str, value: &str) -> crate::CliResult<()> {
    match key {
        "server_url" | "server" => {
            config.server_url = value.to_string();
        }
        "token" => {
            config.token = match value.trim() {
                "" | "none" => None,
                token => Some(token.to_string()),
            };
        }
        "output_format" | "output" => {
            config.output_format = parse_format(value).ok_or_else(|| {
                CliError::InvalidArgument(format!(
                    "Unknown output format: {value}. Supported: table, json, quiet"
                ))
            })?;
        }
        _ => {
            return Err(CliError::InvalidArgument(format!(
                "Unknown configuration key: {key}. Known keys: server_url, token, output_format"
            )));
        }
    }
    Ok(())
}

fn parse_format(value: &str) -> Option<OutputFormat> {
    match value.to_lowercase().as_str() {
        "table" => Some(OutputFormat::Table),
        "json" => Some(OutputFormat::Json),
        "quiet" => Some(OutputFormat::Quiet),
        _ => None,
    }
}

fn prompt(label: &str, current: &str) -> crate::CliResult<String> {
    print!("{label} [{current}]: ");
    std::io::Write::flush(&mut std::io::stdout())?;
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

/// Initializes configuration interactively.
fn init_config(config: &mut CliConfig) -> crate::CliResult<()> {
    let config_path = CliConfig::config_path()?;

    info("Initializing Keycloak audit CLI configuration...");
    println!();

    let server = prompt("Server URL", &config.server_url)?;
    if !server.is_empty() {
        config.server_url = server;
    }

    let token = prompt("Bearer token", if config.token.is_some() { "keep" } else { "none" })?;
    if !token.is_empty() && token != "keep" {
        set_value(config, "token", &token)?;
    }

    let format = prompt(
        "Output format (table/json/quiet)",
        &format!("{:?}", config.output_format).to_lowercase(),
    )?;
    if let Some(format) = parse_format(&format) {
        config.output_format = format;
    }

    config.save()?;

    println!();
    success(&format!("Configuration saved to: {}", config_path.display()));
    Ok(())
}

/// Status command.
pub async fn run_status(client: &super::ApiClient) -> crate::CliResult<()> {
    info(&format!("Checking server status at {}...", client.base_url()));

    let health: serde_json::Value = match client.get(&["health"], &[]).await {
        Ok(health) => health,
        Err(e) => {
            crate::output::error(&format!("Server is not reachable: {e}"));
            return Ok(());
        }
    };

    success("Server is reachable");
    println!();
    if let Some(status) = health.get("status").and_then(|v| v.as_str()) {
        println!("Status: {status}");
    }
    if let Some(version) = health.get("version").and_then(|v| v.as_str()) {
        println!("Version: {version}");
    }

    match client
        .get::<serde_json::Value>(&["admin", "audit", "actions", "me"], &[("size", "1".into())])
        .await
    {
        Ok(page) => {
            let total = page.get("totalElements").and_then(serde_json::Value::as_u64);
            println!("Your changes: {}", total.unwrap_or(0));
        }
        Err(CliError::Auth(_)) => warning("Token missing or rejected"),
        Err(e) => warning(&format!("Audit API unavailable: {e}")),
    }

    Ok(())
}

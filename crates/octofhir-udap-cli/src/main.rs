use anyhow::Result;
use clap::Parser;

use octofhir_udap_cli::cli::{Cli, Commands};
use octofhir_udap_cli::commands;
use octofhir_udap_cli::config::load_config;
use octofhir_udap_cli::observability::init_tracing;
use octofhir_udap_cli::output::print_error;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        if let Some(hint) = commands::hint(&e) {
            eprintln!("  {hint}");
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    init_tracing(cli.log_level.as_deref().unwrap_or(&config.logging.level));

    let client = commands::udap_client(&config.http)?;

    match &cli.command {
        Commands::Metadata => {
            let profile = if cli.server.is_some() && cli.client.is_none() {
                None
            } else {
                Some(config.resolve_client(cli.client.as_deref())?)
            };
            let server = commands::authorization_server(&cli, profile)?;
            commands::metadata::metadata(&client, &server).await
        }
        Commands::Register(args) => {
            let profile = config.resolve_client(cli.client.as_deref())?;
            let server = commands::authorization_server(&cli, Some(profile))?;
            commands::register::register(client, &server, profile, args).await
        }
        Commands::Token(args) => {
            let profile = config.resolve_client(cli.client.as_deref())?;
            let server = commands::authorization_server(&cli, Some(profile))?;
            commands::token::token(client, &server, profile, args).await
        }
    }
}

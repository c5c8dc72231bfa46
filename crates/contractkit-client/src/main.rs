//! contractkit CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use contractkit_core::{TracingConfig, init_tracing};

use contractkit_client::cli::{Cli, Command, ConfigAction};
use contractkit_client::commands;
use contractkit_client::commands::serve::ServeOptions;
use contractkit_client::config::ClientConfig;
use contractkit_client::error::ClientResult;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_tracing(TracingConfig::cli(cli.debug || config.debug)) {
        eprintln!("warning: failed to initialize tracing: {}", e);
    }

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> ClientResult<ClientConfig> {
    match cli.config {
        Some(ref path) => ClientConfig::load_from(path),
        None => ClientConfig::load(),
    }
}

async fn run(cli: Cli, config: ClientConfig) -> ClientResult<()> {
    match cli.command {
        Command::Serve {
            bind,
            port,
            base_path,
            obfuscate,
            docs,
        } => {
            commands::serve::run(ServeOptions {
                bind,
                port,
                base_path,
                obfuscate,
                docs,
            })
            .await
        }
        Command::People {
            first,
            last,
            authorization,
        } => commands::people::run(&config, &first, &last, authorization.as_deref()).await,
        Command::Docs { base_path } => commands::docs::run(&base_path),
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&config),
            ConfigAction::Path => commands::config::path(),
        },
    }
}

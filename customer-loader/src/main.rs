use clap::Parser;
use customer_loader::config::{Config, DEFAULT_CONFIG_PATH};
use customer_loader::context::{Context, ContextPointer};
use customer_loader::Error;
use futures::future::join_all;
use log::{error, info};
use simplelog::{ColorChoice, TermLogger, TerminalMode};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Loads customer details through the short-TTL request cache.
///
/// Every id is loaded concurrently and printed as JSON. With `repeat` set in
/// the config, the ids are loaded a second time to show the cache answering.
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    /// path to the YAML config file; a missing file means defaults
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// customer ids to load
    ids: Vec<u64>,
}

async fn run(context: ContextPointer, ids: Vec<u64>) -> Result<(), Error> {
    let rounds = if *context.config().repeat() { 2 } else { 1 };

    for round in 1..=rounds {
        let loads = ids.iter().map(|id| context.loader().details(*id));
        for (id, details) in ids.iter().zip(join_all(loads).await) {
            match details {
                Ok(details) => println!("{}", serde_json::to_string_pretty(&details)?),
                Err(err) => error!("Failed to load customer {} (round {}): {}", id, round, err),
            }
        }
    }

    info!(
        "Cache stats: {}",
        serde_json::to_string(&context.loader().stats())?
    );
    Ok(())
}

async fn start(config: Config, ids: Vec<u64>) -> Result<(), Error> {
    let context = Context::from_config(config)?;
    run(Arc::new(context), ids).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", err);
            return ExitCode::FAILURE;
        }
    };

    let level = match config.level_filter() {
        Ok(level) => level,
        Err(err) => {
            eprintln!("{}", err);
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = TermLogger::init(
        level,
        simplelog::Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    ) {
        eprintln!("Failed to initialize logging: {}", err);
    }

    match start(config, cli.ids).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_config_path_needs_no_yaml_suffix() {
        let cli = Cli::try_parse_from(["customer-loader", "--config", "shop.conf", "42", "7"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("shop.conf"));
        assert_eq!(cli.ids, vec![42, 7]);
    }

    #[test]
    fn test_defaults_to_the_standard_config_path() {
        let cli = Cli::try_parse_from(["customer-loader", "42"]).unwrap();
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert_eq!(cli.ids, vec![42]);

        let cli = Cli::try_parse_from(["customer-loader", "-c", "/etc/shop.yml"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/shop.yml"));
        assert!(cli.ids.is_empty());
    }

    #[test]
    fn test_non_numeric_id_is_rejected() {
        let err = Cli::try_parse_from(["customer-loader", "42", "alice"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}

//! CLI argument parsing and command dispatch.

pub mod args;
pub mod commands;

use anyhow::Result;
use args::{Cli, Commands};
use chipctl::{ChipError, CommandRunner, PersistentStorage};
use clap::Parser;
use std::path::Path;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Config;

/// Run the CLI application.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load()?;

    // Create context for commands
    let ctx = commands::Context::from_cli(&cli, &config)?;

    init_logging(
        cli.log_level.as_deref(),
        ctx.stack.storage_directory.as_deref(),
    );

    // Dispatch to appropriate command
    match cli.command {
        Commands::Config(args) => commands::config::execute(&ctx, args),
        Commands::Storage(args) => commands::storage::execute(&ctx, args),
        Commands::Interactive(args) => commands::interactive::execute(ctx, config, args).await,
        command => {
            let runner = CommandRunner::new(ctx.stack.clone())?;
            let result = commands::execute(&runner, &ctx, command).await;
            let shutdown = runner.shutdown();
            result?;
            shutdown?;
            Ok(())
        }
    }
}

/// Process exit code for a failed run: 2 for configuration and argument
/// errors, 124 for timeouts, 1 otherwise.
pub fn exit_code(error: &anyhow::Error) -> u8 {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<ChipError>())
        .map_or(1, ChipError::exit_code)
}

/// Install the global subscriber.
///
/// Filter precedence: `--log-level`, then `RUST_LOG`, then the logging
/// level recorded in storage, then `info`.
fn init_logging(level: Option<&str>, storage_dir: Option<&Path>) {
    let filter = level.map_or_else(
        || {
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(stored_filter(storage_dir)))
        },
        EnvFilter::new,
    );

    // Already installed when embedded in another binary.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init();
}

fn stored_filter(storage_dir: Option<&Path>) -> &'static str {
    PersistentStorage::open(storage_dir, None)
        .map_or("info", |storage| storage.logging_level().as_filter())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context as _;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_exit_codes() {
        let timeout = anyhow::Error::from(ChipError::Timeout(Duration::from_secs(10)));
        assert_eq!(exit_code(&timeout), 124);

        let unknown = anyhow::Error::from(ChipError::UnknownIdentity {
            name: "delta".into(),
        });
        assert_eq!(exit_code(&unknown), 2);

        let wrapped = Err::<(), _>(ChipError::InvalidArgument("bad".into()))
            .context("loading trust store")
            .unwrap_err();
        assert_eq!(exit_code(&wrapped), 2);

        assert_eq!(exit_code(&anyhow::anyhow!("boom")), 1);
        assert_eq!(
            exit_code(&anyhow::Error::from(ChipError::Internal("x".into()))),
            1
        );
    }

    #[test]
    fn test_stored_logging_level() {
        let dir = TempDir::new().unwrap();
        assert_eq!(stored_filter(Some(dir.path())), "info");

        let mut storage = PersistentStorage::open(Some(dir.path()), None).unwrap();
        storage.set("LoggingLevel", "detail").unwrap();
        assert_eq!(stored_filter(Some(dir.path())), "debug");
    }
}

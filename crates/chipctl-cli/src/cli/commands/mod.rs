//! Command implementations.

pub mod attribute;
pub mod config;
pub mod delay;
pub mod identity;
pub mod interactive;
pub mod storage;

use anyhow::Result;
use chipctl::{CommandRunner, CommissionerOptions, NodeId, StackOptions, VendorId};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::cli::args::{Cli, Commands};
use crate::config::{expand_path, Config};
use crate::output::OutputFormat;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Options the protocol stack is set up with
    pub stack: StackOptions,

    /// Commissioner the command runs against
    pub commissioner: CommissionerOptions,

    /// Output format
    pub output_format: OutputFormat,

    /// Explicit command deadline
    pub timeout: Option<Duration>,
}

impl Context {
    /// Merge command-line flags over the config file.
    pub fn from_cli(cli: &Cli, config: &Config) -> Result<Self> {
        let mut stack = StackOptions::new();

        if let Some(dir) = cli
            .storage_directory
            .as_deref()
            .or(config.storage_directory.as_deref())
        {
            stack = stack.storage_directory(expand_path(dir)?);
        }
        if let Some(path) = cli
            .paa_trust_store_path
            .as_deref()
            .or(config.paa_trust_store_path.as_deref())
        {
            stack = stack.paa_trust_store_path(expand_path(path)?);
        }
        if let Some(path) = cli
            .cd_trust_store_path
            .as_deref()
            .or(config.cd_trust_store_path.as_deref())
        {
            stack = stack.cd_trust_store_path(expand_path(path)?);
        }
        if let Some(only) = cli.only_allow_trusted_cd_keys {
            stack = stack.only_allow_trusted_cd_keys(only);
        }

        let destinations = if cli.trace_to.is_empty() {
            &config.trace_to
        } else {
            &cli.trace_to
        };
        for destination in destinations {
            stack = stack.trace_to(destination.clone());
        }
        if let Some(file) = &cli.trace_file {
            stack = stack.trace_to(format!("json:{}", file.display()));
        }

        let configured = CommissionerOptions {
            identity: config.identity.clone(),
            vendor_id: config.vendor_id.map(VendorId::new),
            ..CommissionerOptions::default()
        };
        let commissioner = commissioner_flags(cli).fill_from(&configured);

        Ok(Self {
            stack,
            commissioner,
            output_format: cli.output.or(config.output_format).unwrap_or_default(),
            timeout: cli.timeout.map(Duration::from_secs),
        })
    }
}

/// Commissioner options given as flags on this command line only
pub(crate) fn commissioner_flags(cli: &Cli) -> CommissionerOptions {
    CommissionerOptions {
        identity: cli.identity.clone(),
        node_id: cli.commissioner_node_id.map(NodeId::new),
        vendor_id: cli.commissioner_vendor_id.map(VendorId::new),
        use_max_sized_certs: cli.use_max_sized_certs,
    }
}

/// Slot a command body fills on the protocol thread for the caller to print.
pub type Output<T> = Arc<Mutex<Option<T>>>;

/// Empty output slot
pub fn output<T>() -> Output<T> {
    Arc::new(Mutex::new(None))
}

fn store<T>(slot: &Output<T>, value: T) {
    *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
}

fn take<T>(slot: &Output<T>) -> Result<T> {
    slot.lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take()
        .ok_or_else(|| anyhow::anyhow!("command finished without producing output"))
}

/// Run a stack command on `runner`.
pub async fn execute(runner: &CommandRunner, ctx: &Context, command: Commands) -> Result<()> {
    match command {
        Commands::Identity(args) => identity::execute(runner, ctx, args).await,
        Commands::Attribute(args) => attribute::execute(runner, ctx, args).await,
        Commands::Delay(args) => delay::execute(runner, ctx, args).await,
        Commands::Storage(_) | Commands::Interactive(_) | Commands::Config(_) => {
            anyhow::bail!("this command does not run on the protocol stack")
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use clap::Parser;
    use std::path::PathBuf;

    pub(crate) fn context(args: &[&str]) -> Context {
        let cli = Cli::try_parse_from(args).unwrap();
        Context::from_cli(&cli, &Config::default()).unwrap()
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "chipctl",
            "--identity",
            "gamma",
            "--storage-directory",
            "/tmp/flag",
            "--trace-to",
            "log",
            "identity",
            "show",
        ])
        .unwrap();
        let config = Config {
            storage_directory: Some("/tmp/config".into()),
            identity: Some("beta".into()),
            vendor_id: Some(0xFFF2),
            trace_to: vec!["json:/tmp/config.jsonl".into()],
            output_format: Some(OutputFormat::Yaml),
            ..Config::default()
        };

        let ctx = Context::from_cli(&cli, &config).unwrap();
        assert_eq!(ctx.stack.storage_directory, Some(PathBuf::from("/tmp/flag")));
        assert_eq!(ctx.stack.trace_to, ["log"]);
        assert_eq!(ctx.commissioner.identity.as_deref(), Some("gamma"));
        assert_eq!(ctx.commissioner.vendor_id, Some(VendorId::new(0xFFF2)));
        assert_eq!(ctx.output_format, OutputFormat::Yaml);
        assert_eq!(ctx.timeout, None);
    }

    #[test]
    fn test_trace_file_is_json_destination() {
        let ctx = context(&[
            "chipctl",
            "--trace-file",
            "/tmp/trace.jsonl",
            "--timeout",
            "3",
            "delay",
            "sleep",
            "1",
        ]);
        assert_eq!(ctx.stack.trace_to, ["json:/tmp/trace.jsonl"]);
        assert_eq!(ctx.timeout, Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_output_slot() {
        let slot = output();
        assert!(take::<u8>(&slot).is_err());
        store(&slot, 7);
        assert_eq!(take(&slot).unwrap(), 7);
        assert!(take(&slot).is_err());
    }
}

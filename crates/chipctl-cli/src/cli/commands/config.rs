//! `chipctl config` - CLI configuration management.

use anyhow::Result;
use colored::Colorize;

use super::Context;
use crate::cli::args::{ConfigArgs, ConfigCommands};
use crate::config::Config;

pub fn execute(ctx: &Context, args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommands::Show => show_config(ctx),
        ConfigCommands::Set { key, value } => set_config(&key, &value),
        ConfigCommands::Path => show_path(),
    }
}

fn show_config(ctx: &Context) -> Result<()> {
    let config = Config::load()?;

    ctx.output_format.emit(&config, |config| {
        let unset = || "(not set)".dimmed().to_string();
        let show = |key: &str, value: Option<String>| {
            println!("  {} {}", format!("{key}:").bold(), value.unwrap_or_else(unset));
        };

        println!("{}", "Current Configuration:".bold());
        println!();
        show("storage_directory", config.storage_directory.clone());
        show("paa_trust_store_path", config.paa_trust_store_path.clone());
        show("cd_trust_store_path", config.cd_trust_store_path.clone());
        show("identity", config.identity.clone());
        show("vendor_id", config.vendor_id.map(|id| format!("0x{id:04X}")));
        show(
            "trace_to",
            (!config.trace_to.is_empty()).then(|| config.trace_to.join(", ")),
        );
        show(
            "output_format",
            config.output_format.map(|format| format.to_string()),
        );
    })
}

fn set_config(key: &str, value: &str) -> Result<()> {
    let mut config = Config::load()?;
    config.set(key, value)?;
    config.save()?;

    println!(
        "{} {} set to {}.",
        "Success:".green().bold(),
        key,
        value.cyan()
    );
    Ok(())
}

fn show_path() -> Result<()> {
    let path = Config::path()?;
    println!("{}", path.display());
    Ok(())
}

//! `chipctl storage` - persistent storage maintenance.

use anyhow::Result;
use chipctl::PersistentStorage;
use colored::Colorize;
use dialoguer::Confirm;
use serde_json::json;

use super::Context;
use crate::cli::args::{StorageArgs, StorageCommands};

pub fn execute(ctx: &Context, args: StorageArgs) -> Result<()> {
    match args.command {
        StorageCommands::ClearAll { yes } => clear_all(ctx, yes),
    }
}

fn clear_all(ctx: &Context, yes: bool) -> Result<()> {
    let dir = PersistentStorage::directory_for(ctx.stack.storage_directory.as_deref());

    if !yes {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Delete every chipctl storage namespace in {}?",
                dir.display()
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("{}", "Aborted.".yellow());
            return Ok(());
        }
    }

    let removed = PersistentStorage::remove_all_namespaces(Some(&dir))?;

    let report = json!({ "directory": dir, "removed": removed });
    ctx.output_format.emit(&report, |_| {
        println!(
            "{} removed {} storage namespace(s) from {}",
            "Success:".green().bold(),
            removed,
            dir.display()
        );
    })
}

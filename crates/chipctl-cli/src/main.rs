//! chipctl - Matter commissioner bootstrap CLI
//!
//! Creates commissioner identities and runs commands against them on a
//! single protocol thread.

use colored::Colorize;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match chipctl_cli::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e:#}", "Error:".red().bold());
            ExitCode::from(chipctl_cli::exit_code(&e))
        }
    }
}

//! # chipctl-cli
//!
//! Command-line front end for the chipctl commissioner bootstrap.
//!
//! ## Features
//!
//! - **Identities**: `alpha`, `beta`, `gamma`, the null-fabric commissioner and numeric fabrics
//! - **One-shot and interactive modes**: the interactive shell keeps the stack up between commands
//! - **Deadlines**: every command is bounded by `--timeout` or its own wait duration
//! - **Multiple output formats**: Pretty tables, JSON, YAML

pub mod cli;
pub mod config;
pub mod output;

pub use cli::{exit_code, run};

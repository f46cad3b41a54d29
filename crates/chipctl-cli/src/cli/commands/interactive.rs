//! `chipctl interactive start` - the interactive shell.
//!
//! The stack is set up once and stays up between lines. Each line is parsed
//! with the same argument model as the command line and runs in interactive
//! mode, so commissioners are reused and cleanups may be deferred until the
//! shell exits.

use anyhow::Result;
use chipctl::{ChipError, CommandRunner};
use clap::Parser;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{debug, info};

use super::{commissioner_flags, Context};
use crate::cli::args::{Cli, Commands, InteractiveArgs, InteractiveCommands};
use crate::config::Config;

const PROMPT: &str = "chipctl> ";

/// What a shell line asks for
#[derive(Debug)]
pub enum Line {
    /// Blank line
    Empty,
    /// `quit` or `exit`
    Quit,
    /// A command in command-line syntax
    Command(Box<Cli>),
}

pub async fn execute(ctx: Context, config: Config, args: InteractiveArgs) -> Result<()> {
    match args.command {
        InteractiveCommands::Start => start(ctx, config).await,
    }
}

async fn start(ctx: Context, config: Config) -> Result<()> {
    let runner = CommandRunner::new(ctx.stack.clone())?.interactive(true);
    runner.set_up_stack().await?;

    println!(
        "Type a command without the {} prefix, {} to leave.",
        "chipctl".cyan(),
        "quit".red()
    );

    let result = repl(&runner, &ctx, &config).await;

    let drained = runner.execute_deferred_cleanups().await;
    let teardown = runner.tear_down_stack().await;
    let shutdown = runner.shutdown();
    debug!(?drained, "interactive shell finished");

    result?;
    drained?;
    teardown?;
    shutdown?;
    Ok(())
}

async fn repl(runner: &CommandRunner, ctx: &Context, config: &Config) -> Result<()> {
    let mut editor = DefaultEditor::new()?;

    loop {
        let line = match editor.readline(PROMPT) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        if !line.trim().is_empty() {
            // History is a convenience.
            let _ = editor.add_history_entry(line.as_str());
        }

        let cli = match parse_line(&line) {
            Ok(Line::Empty) => continue,
            Ok(Line::Quit) => break,
            Ok(Line::Command(cli)) => cli,
            Err(e) => {
                match e.downcast_ref::<clap::Error>() {
                    Some(clap_error) => clap_error.print()?,
                    None => eprintln!("{} {e:#}", "Error:".red().bold()),
                }
                continue;
            }
        };

        if let Err(e) = run_line(runner, ctx, config, *cli).await {
            eprintln!("{} {e:#}", "Error:".red().bold());
            if is_fatal(&e) {
                info!("leaving the interactive shell after a fatal error");
                return Err(e);
            }
        }
    }
    Ok(())
}

/// Split a shell line and parse it like a command line.
pub fn parse_line(line: &str) -> Result<Line> {
    let words = shell_words::split(line)?;
    match words.first().map(String::as_str) {
        None => Ok(Line::Empty),
        Some("quit" | "exit") if words.len() == 1 => Ok(Line::Quit),
        Some(_) => {
            let cli = Cli::try_parse_from(std::iter::once("chipctl".to_string()).chain(words))?;
            Ok(Line::Command(Box::new(cli)))
        }
    }
}

/// Context for one shell line.
///
/// Stack options were fixed when the shell started. Commissioner flags the
/// line leaves out keep the values the shell was started with.
fn line_context(base: &Context, config: &Config, cli: &Cli) -> Result<Context> {
    let mut ctx = Context::from_cli(cli, config)?;
    ctx.stack = base.stack.clone();
    ctx.commissioner = commissioner_flags(cli).fill_from(&base.commissioner);
    Ok(ctx)
}

async fn run_line(runner: &CommandRunner, base: &Context, config: &Config, cli: Cli) -> Result<()> {
    let ctx = line_context(base, config, &cli)?;

    match cli.command {
        Commands::Interactive(_) => anyhow::bail!("already in the interactive shell"),
        Commands::Storage(_) => {
            anyhow::bail!("storage maintenance is not available while the stack is up")
        }
        Commands::Config(args) => super::config::execute(&ctx, args),
        command => super::execute(runner, &ctx, command).await,
    }
}

fn is_fatal(error: &anyhow::Error) -> bool {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<ChipError>())
        .is_some_and(ChipError::is_fatal)
}

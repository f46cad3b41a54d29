//! `chipctl delay` - commands completing from a loop timer.

use anyhow::Result;
use chipctl::{Command, CommandContext, CommandRunner, CommissionerOptions, DEFAULT_WAIT_DURATION};
use colored::Colorize;
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::debug;

use super::Context;
use crate::cli::args::{DelayArgs, DelayCommands};

struct Sleep {
    options: CommissionerOptions,
    delay: Duration,
    wait: Duration,
}

impl Sleep {
    fn new(ctx: &Context, delay: Duration) -> Self {
        Self {
            options: ctx.commissioner.clone(),
            delay,
            wait: ctx.timeout.unwrap_or(delay + DEFAULT_WAIT_DURATION),
        }
    }
}

impl Command for Sleep {
    fn name(&self) -> &str {
        "delay-sleep"
    }

    fn run(&mut self, ctx: &mut CommandContext<'_>) -> chipctl::Result<()> {
        let completion = ctx.completion();
        ctx.handle().schedule_after(self.delay, move |_, _| {
            if !completion.complete(Ok(())) {
                debug!("sleep finished after the command was already decided");
            }
        })?;
        ctx.trace("sleep_armed", json!({ "ms": millis(self.delay) }));
        Ok(())
    }

    fn wait_duration(&self) -> Duration {
        self.wait
    }

    fn commissioner_options(&self) -> CommissionerOptions {
        self.options.clone()
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

pub async fn execute(runner: &CommandRunner, ctx: &Context, args: DelayArgs) -> Result<()> {
    match args.command {
        DelayCommands::Sleep { ms } => sleep(runner, ctx, ms).await,
    }
}

async fn sleep(runner: &CommandRunner, ctx: &Context, ms: u64) -> Result<()> {
    let started = Instant::now();
    runner
        .run(Box::new(Sleep::new(ctx, Duration::from_millis(ms))))
        .await?;
    let elapsed = started.elapsed();

    let report = json!({ "slept_ms": ms, "elapsed_ms": millis(elapsed) });
    ctx.output_format.emit(&report, |_| {
        println!(
            "{} slept {} ms ({} ms including set-up)",
            "Done:".green().bold(),
            ms,
            millis(elapsed)
        );
    })
}

//! `chipctl attribute` - the local attribute store.

use anyhow::{Context as _, Result};
use chipctl::{
    AttributePath, AttributeStore, AttributeValue, Command, CommandContext, CommandRunner,
    CommissionerOptions, StackContext, SubscriptionId,
};
use colored::Colorize;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use super::{output, store, take, Context, Output};
use crate::cli::args::{AttributeArgs, AttributeCommands};

/// Result of a read or write
#[derive(Debug, Clone, Serialize)]
pub struct AttributeReport {
    pub path: String,
    pub value: Option<AttributeValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed: Option<bool>,
}

struct ReadAttribute {
    options: CommissionerOptions,
    path: AttributePath,
    output: Output<AttributeReport>,
}

impl Command for ReadAttribute {
    fn name(&self) -> &str {
        "attribute-read"
    }

    fn run(&mut self, ctx: &mut CommandContext<'_>) -> chipctl::Result<()> {
        let value = ctx.attributes().read(&self.path);
        store(
            &self.output,
            AttributeReport {
                path: self.path.to_string(),
                value,
                changed: None,
            },
        );
        Ok(())
    }

    fn wait_duration(&self) -> Duration {
        Duration::ZERO
    }

    fn commissioner_options(&self) -> CommissionerOptions {
        self.options.clone()
    }
}

struct WriteAttribute {
    options: CommissionerOptions,
    path: AttributePath,
    value: AttributeValue,
    output: Output<AttributeReport>,
}

impl Command for WriteAttribute {
    fn name(&self) -> &str {
        "attribute-write"
    }

    fn run(&mut self, ctx: &mut CommandContext<'_>) -> chipctl::Result<()> {
        let changed = ctx.attributes().write(self.path, self.value.clone());
        ctx.trace(
            "attribute_write",
            serde_json::json!({ "path": self.path.to_string(), "changed": changed }),
        );
        store(
            &self.output,
            AttributeReport {
                path: self.path.to_string(),
                value: Some(self.value.clone()),
                changed: Some(changed),
            },
        );
        Ok(())
    }

    fn wait_duration(&self) -> Duration {
        Duration::ZERO
    }

    fn commissioner_options(&self) -> CommissionerOptions {
        self.options.clone()
    }
}

/// Logs changes to one path.
///
/// The subscription outlives the command in the interactive shell until its
/// cleanup unregisters the callback.
struct SubscribeAttribute {
    options: CommissionerOptions,
    path: AttributePath,
    subscription: Option<SubscriptionId>,
}

impl Command for SubscribeAttribute {
    fn name(&self) -> &str {
        "attribute-subscribe"
    }

    fn run(&mut self, ctx: &mut CommandContext<'_>) -> chipctl::Result<()> {
        let watched = self.path;
        let id = ctx.attributes().subscribe(Box::new(move |path, value| {
            if *path == watched {
                info!(path = %path, value = %value, "attribute changed");
            }
        }));
        self.subscription = Some(id);
        info!(path = %watched, subscription = id, "subscribed");
        Ok(())
    }

    fn wait_duration(&self) -> Duration {
        Duration::ZERO
    }

    fn defer_interactive_cleanup(&self) -> bool {
        true
    }

    fn cleanup(&mut self, stack: &mut StackContext) {
        if let Some(id) = self.subscription.take() {
            stack.attributes_mut().unsubscribe(id);
            debug!(path = %self.path, subscription = id, "unsubscribed");
        }
    }

    fn commissioner_options(&self) -> CommissionerOptions {
        self.options.clone()
    }
}

pub async fn execute(runner: &CommandRunner, ctx: &Context, args: AttributeArgs) -> Result<()> {
    match args.command {
        AttributeCommands::Read {
            endpoint,
            cluster,
            attribute,
        } => {
            let report = read(runner, ctx, AttributePath::new(endpoint, cluster, attribute)).await?;
            print_report(ctx, &report)
        }
        AttributeCommands::Write {
            endpoint,
            cluster,
            attribute,
            value,
        } => {
            let value: AttributeValue = serde_json::from_str(&value)
                .map_err(|e| chipctl::ChipError::InvalidArgument(format!("{value}: {e}")))
                .context("attribute values are JSON")?;
            let report =
                write(runner, ctx, AttributePath::new(endpoint, cluster, attribute), value).await?;
            print_report(ctx, &report)
        }
        AttributeCommands::Subscribe {
            endpoint,
            cluster,
            attribute,
        } => {
            let path = AttributePath::new(endpoint, cluster, attribute);
            runner
                .run(Box::new(SubscribeAttribute {
                    options: ctx.commissioner.clone(),
                    path,
                    subscription: None,
                }))
                .await?;
            if !runner.is_interactive() {
                println!(
                    "{} subscriptions end with the command outside the interactive shell",
                    "Note:".yellow().bold()
                );
            }
            Ok(())
        }
    }
}

/// Read one attribute.
pub async fn read(
    runner: &CommandRunner,
    ctx: &Context,
    path: AttributePath,
) -> Result<AttributeReport> {
    let slot = output();
    runner
        .run(Box::new(ReadAttribute {
            options: ctx.commissioner.clone(),
            path,
            output: slot.clone(),
        }))
        .await?;
    take(&slot)
}

/// Write one attribute.
pub async fn write(
    runner: &CommandRunner,
    ctx: &Context,
    path: AttributePath,
    value: AttributeValue,
) -> Result<AttributeReport> {
    let slot = output();
    runner
        .run(Box::new(WriteAttribute {
            options: ctx.commissioner.clone(),
            path,
            value,
            output: slot.clone(),
        }))
        .await?;
    take(&slot)
}

fn print_report(ctx: &Context, report: &AttributeReport) -> Result<()> {
    ctx.output_format.emit(report, |report| {
        let value = report
            .value
            .as_ref()
            .map_or_else(|| "(unset)".dimmed().to_string(), ToString::to_string);
        match report.changed {
            Some(false) => println!("{} {} {}", report.path.cyan(), value, "(unchanged)".dimmed()),
            _ => println!("{} {}", report.path.cyan(), value),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::tests::context;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_then_read_in_interactive_runner() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&[
            "chipctl",
            "--storage-directory",
            dir.path().to_str().unwrap(),
            "interactive",
            "start",
        ]);
        let runner = CommandRunner::new(ctx.stack.clone())
            .unwrap()
            .interactive(true);
        runner.set_up_stack().await.unwrap();

        let path = AttributePath::new(1, 6, 0);
        assert_eq!(read(&runner, &ctx, path).await.unwrap().value, None);

        let first = write(&runner, &ctx, path, json!(true)).await.unwrap();
        assert_eq!(first.changed, Some(true));
        let second = write(&runner, &ctx, path, json!(true)).await.unwrap();
        assert_eq!(second.changed, Some(false));

        assert_eq!(read(&runner, &ctx, path).await.unwrap().value, Some(json!(true)));
        runner.tear_down_stack().await.unwrap();
    }

    #[tokio::test]
    async fn test_subscription_cleanup_is_deferred() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&[
            "chipctl",
            "--storage-directory",
            dir.path().to_str().unwrap(),
            "interactive",
            "start",
        ]);
        let runner = CommandRunner::new(ctx.stack.clone())
            .unwrap()
            .interactive(true);
        runner.set_up_stack().await.unwrap();

        let args = AttributeArgs {
            command: AttributeCommands::Subscribe {
                endpoint: 1,
                cluster: 6,
                attribute: 0,
            },
        };
        let subscriptions = || runner.call(|stack, _| stack.attributes().subscription_count());

        execute(&runner, &ctx, args).await.unwrap();
        assert_eq!(runner.deferred_cleanup_count().await.unwrap(), 1);
        assert_eq!(subscriptions().await.unwrap(), 1);

        assert_eq!(runner.execute_deferred_cleanups().await.unwrap(), 1);
        assert_eq!(runner.deferred_cleanup_count().await.unwrap(), 0);
        assert_eq!(subscriptions().await.unwrap(), 0);
        runner.tear_down_stack().await.unwrap();
    }

    #[tokio::test]
    async fn test_subscription_ends_with_one_shot_command() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&[
            "chipctl",
            "--storage-directory",
            dir.path().to_str().unwrap(),
            "attribute",
            "subscribe",
            "1",
            "6",
            "0",
        ]);
        let runner = CommandRunner::new(ctx.stack.clone()).unwrap();

        let args = AttributeArgs {
            command: AttributeCommands::Subscribe {
                endpoint: 1,
                cluster: 6,
                attribute: 0,
            },
        };
        execute(&runner, &ctx, args).await.unwrap();
        assert_eq!(runner.deferred_cleanup_count().await.unwrap(), 0);
        let count = runner
            .call(|stack, _| stack.attributes().subscription_count())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_invalid_json_value_exits_2() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&[
            "chipctl",
            "--storage-directory",
            dir.path().to_str().unwrap(),
            "attribute",
            "write",
            "1",
            "6",
            "0",
            "{not json",
        ]);
        let runner = CommandRunner::new(ctx.stack.clone()).unwrap();
        let args = AttributeArgs {
            command: AttributeCommands::Write {
                endpoint: 1,
                cluster: 6,
                attribute: 0,
                value: "{not json".into(),
            },
        };
        let err = execute(&runner, &ctx, args).await.unwrap_err();
        assert_eq!(crate::cli::exit_code(&err), 2);
    }
}

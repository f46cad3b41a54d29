//! `chipctl identity` - commissioner identities.

use anyhow::Result;
use chipctl::{
    CertLengths, Command, CommandContext, CommandRunner, Commissioner, CommissionerIdentity,
    CommissionerOptions, FabricIndex, OperationalCredentials,
};
use colored::Colorize;
use serde::Serialize;
use std::time::Duration;
use tabled::{settings::Style, Table, Tabled};

use super::{output, store, take, Context, Output};
use crate::cli::args::{IdentityArgs, IdentityCommands};

/// What `identity show` reports about one commissioner
#[derive(Debug, Clone, Serialize)]
pub struct IdentityInfo {
    pub name: String,
    pub fabric_id: u64,
    pub node_id: u64,
    pub fabric_index: Option<u8>,
    pub compressed_fabric_id: Option<String>,
    pub vendor_id: String,
    pub certificates: Option<CertLengths>,
    pub instance_id: u64,
}

impl IdentityInfo {
    fn new(key: &CommissionerIdentity, commissioner: &Commissioner) -> Self {
        Self {
            name: key.name.clone(),
            fabric_id: commissioner.fabric_id().get(),
            node_id: commissioner.node_id().get(),
            fabric_index: commissioner.fabric_index().map(FabricIndex::get),
            compressed_fabric_id: commissioner
                .compressed_fabric_id()
                .map(|id| id.to_string()),
            vendor_id: commissioner.vendor_id().to_string(),
            certificates: commissioner.credentials().map(OperationalCredentials::lengths),
            instance_id: commissioner.instance_id(),
        }
    }
}

#[derive(Tabled)]
struct IdentityRow {
    #[tabled(rename = "Identity")]
    name: String,
    #[tabled(rename = "Fabric")]
    fabric_id: u64,
    #[tabled(rename = "Node")]
    node_id: u64,
    #[tabled(rename = "Index")]
    fabric_index: String,
    #[tabled(rename = "Compressed Fabric")]
    compressed_fabric_id: String,
}

impl From<&IdentityInfo> for IdentityRow {
    fn from(info: &IdentityInfo) -> Self {
        Self {
            name: info.name.clone(),
            fabric_id: info.fabric_id,
            node_id: info.node_id,
            fabric_index: info
                .fabric_index
                .map_or_else(|| "-".to_string(), |i| i.to_string()),
            compressed_fabric_id: info
                .compressed_fabric_id
                .clone()
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

struct ShowIdentity {
    options: CommissionerOptions,
    output: Output<IdentityInfo>,
}

impl Command for ShowIdentity {
    fn name(&self) -> &str {
        "identity-show"
    }

    fn run(&mut self, ctx: &mut CommandContext<'_>) -> chipctl::Result<()> {
        let info = IdentityInfo::new(ctx.identity(), ctx.current_commissioner()?);
        store(&self.output, info);
        Ok(())
    }

    fn wait_duration(&self) -> Duration {
        Duration::ZERO
    }

    fn commissioner_options(&self) -> CommissionerOptions {
        self.options.clone()
    }
}

struct ListIdentities {
    options: CommissionerOptions,
    output: Output<Vec<IdentityInfo>>,
}

impl Command for ListIdentities {
    fn name(&self) -> &str {
        "identity-list"
    }

    fn run(&mut self, ctx: &mut CommandContext<'_>) -> chipctl::Result<()> {
        let infos = ctx
            .commissioners()
            .map(|(key, commissioner)| IdentityInfo::new(key, commissioner))
            .collect();
        store(&self.output, infos);
        Ok(())
    }

    fn wait_duration(&self) -> Duration {
        Duration::ZERO
    }

    fn commissioner_options(&self) -> CommissionerOptions {
        self.options.clone()
    }
}

pub async fn execute(runner: &CommandRunner, ctx: &Context, args: IdentityArgs) -> Result<()> {
    match args.command {
        IdentityCommands::Show => show_identity(runner, ctx).await,
        IdentityCommands::List => list_identities(runner, ctx).await,
    }
}

/// Ensure the selected commissioner and describe it.
pub async fn show_info(runner: &CommandRunner, ctx: &Context) -> Result<IdentityInfo> {
    let slot = output();
    runner
        .run(Box::new(ShowIdentity {
            options: ctx.commissioner.clone(),
            output: slot.clone(),
        }))
        .await?;
    take(&slot)
}

/// Describe every live commissioner.
pub async fn list_info(runner: &CommandRunner, ctx: &Context) -> Result<Vec<IdentityInfo>> {
    let slot = output();
    runner
        .run(Box::new(ListIdentities {
            options: ctx.commissioner.clone(),
            output: slot.clone(),
        }))
        .await?;
    take(&slot)
}

async fn show_identity(runner: &CommandRunner, ctx: &Context) -> Result<()> {
    let info = show_info(runner, ctx).await?;

    ctx.output_format.emit(&info, |info| {
        println!("{}", "Commissioner:".bold());
        println!();
        println!("  {} {}", "Identity:".bold(), info.name.cyan());
        println!("  {} {}", "Fabric ID:".bold(), info.fabric_id);
        println!("  {} {}", "Node ID:".bold(), info.node_id);
        println!("  {} {}", "Vendor ID:".bold(), info.vendor_id);
        match info.fabric_index {
            Some(index) => println!("  {} {}", "Fabric Index:".bold(), index),
            None => println!("  {} {}", "Fabric Index:".bold(), "(none)".dimmed()),
        }
        if let Some(id) = &info.compressed_fabric_id {
            println!("  {} {}", "Compressed Fabric ID:".bold(), id);
        }
        match info.certificates {
            Some(lengths) => println!(
                "  {} RCAC {} / ICAC {} / NOC {} bytes",
                "Certificates:".bold(),
                lengths.rcac,
                lengths.icac,
                lengths.noc
            ),
            None => println!("  {} {}", "Certificates:".bold(), "(none)".dimmed()),
        }
    })
}

async fn list_identities(runner: &CommandRunner, ctx: &Context) -> Result<()> {
    let infos = list_info(runner, ctx).await?;

    ctx.output_format.emit(&infos, |infos| {
        let rows: Vec<IdentityRow> = infos.iter().map(IdentityRow::from).collect();
        let table = Table::new(&rows).with(Style::rounded()).to_string();
        println!("{table}");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::tests::context;
    use chipctl::MAX_DER_CERT_LEN;
    use tempfile::TempDir;

    fn runner(ctx: &Context) -> CommandRunner {
        CommandRunner::new(ctx.stack.clone()).unwrap()
    }

    #[tokio::test]
    async fn test_show_numeric_identity() {
        let dir = TempDir::new().unwrap();
        let dir_arg = dir.path().to_str().unwrap();
        let ctx = context(&[
            "chipctl",
            "--storage-directory",
            dir_arg,
            "--identity",
            "0x10",
            "identity",
            "show",
        ]);

        let info = show_info(&runner(&ctx), &ctx).await.unwrap();
        assert_eq!(info.name, "16");
        assert_eq!(info.fabric_id, 16);
        assert_eq!(info.node_id, 112_233);
        assert!(info.fabric_index.is_some());
        assert!(info.compressed_fabric_id.is_some());
        let lengths = info.certificates.unwrap();
        assert!(lengths.rcac > 0 && lengths.rcac <= MAX_DER_CERT_LEN);
    }

    #[tokio::test]
    async fn test_show_with_node_override() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&[
            "chipctl",
            "--storage-directory",
            dir.path().to_str().unwrap(),
            "--commissioner-nodeid",
            "42",
            "identity",
            "show",
        ]);

        let info = show_info(&runner(&ctx), &ctx).await.unwrap();
        assert_eq!(info.name, "alpha");
        assert_eq!(info.fabric_id, 1);
        assert_eq!(info.node_id, 42);
    }

    #[tokio::test]
    async fn test_list_includes_null_fabric() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&[
            "chipctl",
            "--storage-directory",
            dir.path().to_str().unwrap(),
            "--identity",
            "gamma",
            "identity",
            "list",
        ]);

        let infos = list_info(&runner(&ctx), &ctx).await.unwrap();
        let names: Vec<_> = infos.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["gamma", "null-fabric-commissioner"]);
        let null = &infos[1];
        assert_eq!(null.fabric_id, 0);
        assert!(null.fabric_index.is_none());
        assert!(null.certificates.is_none());
    }

    #[tokio::test]
    async fn test_reserved_numeric_identity_exits_2() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&[
            "chipctl",
            "--storage-directory",
            dir.path().to_str().unwrap(),
            "--identity",
            "2",
            "identity",
            "show",
        ]);

        let err = show_info(&runner(&ctx), &ctx).await.unwrap_err();
        assert_eq!(crate::cli::exit_code(&err), 2);
    }
}

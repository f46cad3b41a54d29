//! Command-line argument definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::output::OutputFormat;

/// Matter commissioner bootstrap
///
/// Creates commissioner identities on their fabrics and runs commands
/// against them. Identities are alpha (fabric 1), beta (2), gamma (3),
/// null-fabric-commissioner, or any numeric fabric id from 4 up.
#[derive(Parser, Debug)]
#[command(name = "chipctl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Commissioner identity to run the command as
    #[arg(long, visible_alias = "commissioner-name", global = true)]
    pub identity: Option<String>,

    /// Local node id of the commissioner, bypassing the identity storage
    #[arg(long = "commissioner-nodeid", global = true, value_parser = parse_u64)]
    pub commissioner_node_id: Option<u64>,

    /// Vendor id of the commissioner
    #[arg(long = "commissioner-vendor-id", global = true, value_parser = parse_u16)]
    pub commissioner_vendor_id: Option<u16>,

    /// Directory of trusted PAA certificates
    #[arg(long, env = "CHIPCTL_PAA_TRUST_STORE_PATH", global = true)]
    pub paa_trust_store_path: Option<String>,

    /// Directory of additional CD verifying certificates
    #[arg(long, env = "CHIPCTL_CD_TRUST_STORE_PATH", global = true)]
    pub cd_trust_store_path: Option<String>,

    /// Directory holding the storage namespaces (defaults to the temp dir)
    #[arg(long, global = true)]
    pub storage_directory: Option<String>,

    /// Pad generated certificates up to the maximum DER size (0/1)
    #[arg(long, global = true, value_parser = parse_switch)]
    pub use_max_sized_certs: Option<bool>,

    /// Reject the test CD signing key (0/1)
    #[arg(long, global = true, value_parser = parse_switch)]
    pub only_allow_trusted_cd_keys: Option<bool>,

    /// Trace destination: `log` or `json:<path>` (repeatable)
    #[arg(long, global = true)]
    pub trace_to: Vec<String>,

    /// Write JSON trace events to this file
    #[arg(long, global = true)]
    pub trace_file: Option<PathBuf>,

    /// Seconds to wait for the command to complete
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Output format
    #[arg(short, long, global = true, value_enum)]
    pub output: Option<OutputFormat>,

    /// Log filter (e.g. `debug`, `chipctl_controller=trace`); overrides RUST_LOG
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Commissioner identities
    Identity(IdentityArgs),

    /// Read and write attributes in the local store
    Attribute(AttributeArgs),

    /// Commands that complete from a timer
    Delay(DelayArgs),

    /// Persistent storage maintenance
    Storage(StorageArgs),

    /// Interactive shell keeping the stack up between commands
    Interactive(InteractiveArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),
}

fn parse_u64(s: &str) -> Result<u64, String> {
    chipctl::parse_id(s).map_err(|e| e.to_string())
}

fn parse_u16(s: &str) -> Result<u16, String> {
    chipctl::parse_id(s).map_err(|e| e.to_string())
}

fn parse_switch(s: &str) -> Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(format!("expected 0 or 1, got {s}")),
    }
}

// ============================================================================
// Identity command
// ============================================================================

#[derive(Args, Debug)]
pub struct IdentityArgs {
    #[command(subcommand)]
    pub command: IdentityCommands,
}

#[derive(Subcommand, Debug)]
pub enum IdentityCommands {
    /// Create (if needed) and describe the selected commissioner
    Show,

    /// List every live commissioner
    List,
}

// ============================================================================
// Attribute command
// ============================================================================

#[derive(Args, Debug)]
pub struct AttributeArgs {
    #[command(subcommand)]
    pub command: AttributeCommands,
}

#[derive(Subcommand, Debug)]
pub enum AttributeCommands {
    /// Read an attribute value
    Read {
        /// Endpoint number
        #[arg(value_parser = parse_u16)]
        endpoint: u16,

        /// Cluster id (decimal or 0x hex)
        #[arg(value_parser = parse_u32)]
        cluster: u32,

        /// Attribute id (decimal or 0x hex)
        #[arg(value_parser = parse_u32)]
        attribute: u32,
    },

    /// Write an attribute value
    Write {
        /// Endpoint number
        #[arg(value_parser = parse_u16)]
        endpoint: u16,

        /// Cluster id (decimal or 0x hex)
        #[arg(value_parser = parse_u32)]
        cluster: u32,

        /// Attribute id (decimal or 0x hex)
        #[arg(value_parser = parse_u32)]
        attribute: u32,

        /// Value as JSON (e.g. `true`, `42`, `"text"`)
        value: String,
    },

    /// Log changes to an attribute until the shell exits
    Subscribe {
        /// Endpoint number
        #[arg(value_parser = parse_u16)]
        endpoint: u16,

        /// Cluster id (decimal or 0x hex)
        #[arg(value_parser = parse_u32)]
        cluster: u32,

        /// Attribute id (decimal or 0x hex)
        #[arg(value_parser = parse_u32)]
        attribute: u32,
    },
}

fn parse_u32(s: &str) -> Result<u32, String> {
    chipctl::parse_id(s).map_err(|e| e.to_string())
}

// ============================================================================
// Delay command
// ============================================================================

#[derive(Args, Debug)]
pub struct DelayArgs {
    #[command(subcommand)]
    pub command: DelayCommands,
}

#[derive(Subcommand, Debug)]
pub enum DelayCommands {
    /// Complete after the given number of milliseconds
    Sleep {
        /// Milliseconds to sleep
        ms: u64,
    },
}

// ============================================================================
// Storage command
// ============================================================================

#[derive(Args, Debug)]
pub struct StorageArgs {
    #[command(subcommand)]
    pub command: StorageCommands,
}

#[derive(Subcommand, Debug)]
pub enum StorageCommands {
    /// Delete every storage namespace in the storage directory
    ClearAll {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

// ============================================================================
// Interactive command
// ============================================================================

#[derive(Args, Debug)]
pub struct InteractiveArgs {
    #[command(subcommand)]
    pub command: InteractiveCommands,
}

#[derive(Subcommand, Debug)]
pub enum InteractiveCommands {
    /// Start the interactive shell
    Start,
}

// ============================================================================
// Config command
// ============================================================================

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Set a configuration value
    Set {
        /// Key to set (e.g., storage_directory, identity)
        key: String,

        /// Value to set
        value: String,
    },

    /// Show config file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "chipctl",
            "identity",
            "show",
            "--commissioner-name",
            "beta",
            "--commissioner-nodeid",
            "0x1234",
            "--use-max-sized-certs",
            "1",
        ])
        .unwrap();

        assert_eq!(cli.identity.as_deref(), Some("beta"));
        assert_eq!(cli.commissioner_node_id, Some(0x1234));
        assert_eq!(cli.use_max_sized_certs, Some(true));
        assert!(matches!(
            cli.command,
            Commands::Identity(IdentityArgs {
                command: IdentityCommands::Show
            })
        ));
    }

    #[test]
    fn test_repeatable_trace_to() {
        let cli = Cli::try_parse_from([
            "chipctl",
            "--trace-to",
            "log",
            "--trace-to",
            "json:/tmp/trace.jsonl",
            "delay",
            "sleep",
            "5",
        ])
        .unwrap();
        assert_eq!(cli.trace_to, ["log", "json:/tmp/trace.jsonl"]);
    }

    #[test]
    fn test_attribute_ids_accept_hex() {
        let cli =
            Cli::try_parse_from(["chipctl", "attribute", "read", "1", "0x0006", "0"]).unwrap();
        match cli.command {
            Commands::Attribute(AttributeArgs {
                command:
                    AttributeCommands::Read {
                        endpoint,
                        cluster,
                        attribute,
                    },
            }) => assert_eq!((endpoint, cluster, attribute), (1, 6, 0)),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_rejects_bad_switch() {
        assert!(Cli::try_parse_from([
            "chipctl",
            "identity",
            "show",
            "--only-allow-trusted-cd-keys",
            "maybe",
        ])
        .is_err());
    }

    #[test]
    fn test_vendor_id_out_of_range() {
        assert!(Cli::try_parse_from([
            "chipctl",
            "identity",
            "show",
            "--commissioner-vendor-id",
            "0x10000",
        ])
        .is_err());
    }
}

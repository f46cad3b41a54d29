//! Matter commissioner bootstrap with a single protocol thread.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use chipctl::{Command, CommandContext, CommandRunner, StackOptions};
//!
//! struct ShowFabric;
//!
//! impl Command for ShowFabric {
//!     fn name(&self) -> &str {
//!         "show-fabric"
//!     }
//!
//!     fn run(&mut self, ctx: &mut CommandContext<'_>) -> chipctl::Result<()> {
//!         let commissioner = ctx.current_commissioner()?;
//!         println!("fabric {}", commissioner.fabric_id());
//!         Ok(())
//!     }
//!
//!     fn wait_duration(&self) -> std::time::Duration {
//!         std::time::Duration::ZERO
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> chipctl::Result<()> {
//!     let runner = CommandRunner::new(StackOptions::new())?;
//!     runner.run(Box::new(ShowFabric)).await
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/chipctl/0.1.0")]

// Re-export core types
pub use chipctl_core::*;

// Re-export the controller engine
pub use chipctl_controller::{
    attestation, certs, crypto, group_data, issuer, storage, AttestationTrustStore,
    AttributeCallback, AttributeStore, Command, CommandCompletion, CommandContext, CommandOutcome,
    CommandRunner, Commissioner, CommissionerFactory, CommissionerOptions, CompletionWaiter,
    CredentialIssuer, CredentialIssuerOption, DeviceControllerFactory, ExampleCredentialIssuer,
    GroupDataProvider, IdentityRegistry, InMemoryAttributeStore, LoggingLevel, LoopHandle,
    PersistentStorage, ProtocolLoop, StackContext, StackOptions, SubscriptionId, SystemState,
    TraceEvent, TracingSetup, DEFAULT_WAIT_DURATION, INTERACTIVE_WAIT_CEILING,
};

// Re-export runtime for convenience
pub use serde_json;
pub use tokio;

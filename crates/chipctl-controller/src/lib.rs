//! Commissioner bootstrap and command execution.
//!
//! The [`CommandRunner`] owns a single protocol thread ([`ProtocolLoop`]) on
//! which every command body, timer and commissioner operation runs. The
//! thread owns a [`StackContext`]: the identity registry, the storage
//! namespaces, the [`CommissionerFactory`] and its commissioner set, the
//! attestation trust store and the group data provider.
//!
//! # Example
//!
//! ```rust,ignore
//! use chipctl_controller::{CommandRunner, StackOptions};
//!
//! let runner = CommandRunner::new(StackOptions::new().storage_directory("/tmp/chipctl"))?;
//! runner.run(Box::new(my_command)).await?;
//! ```

#![doc(html_root_url = "https://docs.rs/chipctl-controller/0.1.0")]

pub mod attestation;
mod attributes;
pub mod certs;
mod command;
mod commissioner;
pub mod crypto;
mod event_loop;
mod factory;
pub mod group_data;
pub mod issuer;
mod options;
mod registry;
mod runner;
mod stack;
pub mod storage;
mod trace;

pub use attestation::{
    AttestationTrustStore, CdVerificationPolicy, DeviceAttestationVerifier, SharedCdPolicy,
    TrustStoreSource,
};
pub use attributes::{AttributeCallback, AttributeStore, InMemoryAttributeStore, SubscriptionId};
pub use command::{Command, CommandContext, DEFAULT_WAIT_DURATION};
pub use commissioner::{
    Commissioner, DeviceControllerFactory, FabricInfo, FabricTable, FactoryInitParams,
    SetupParams, SystemState,
};
pub use event_loop::{LoopHandle, ProtocolLoop, Work};
pub use factory::CommissionerFactory;
pub use group_data::GroupDataProvider;
pub use issuer::{CredentialIssuer, CredentialIssuerOption, ExampleCredentialIssuer};
pub use options::{CommissionerOptions, StackOptions};
pub use registry::{IdentityRegistry, ResolvedIdentity};
pub use runner::{
    CommandCompletion, CommandOutcome, CommandRunner, CompletionWaiter, PendingCommand,
    INTERACTIVE_WAIT_CEILING,
};
pub use stack::StackContext;
pub use storage::{LoggingLevel, PersistentStorage, SharedStorage};
pub use trace::{TraceEvent, TracingSetup};

pub use chipctl_core::{ChipError, Result};

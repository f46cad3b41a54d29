//! Core types for the chipctl commissioner.
//!
//! This crate provides the foundational types shared by the controller engine
//! and the command-line front end:
//!
//! - **Identifiers**: [`FabricId`], [`NodeId`], [`VendorId`], [`FabricIndex`]
//! - **Identities**: name resolution rules for commissioner identities
//! - **Credentials**: the NOC/ICAC/RCAC chain cached per identity
//! - **Errors**: the [`ChipError`] taxonomy and its exit-code mapping
//!
//! # Example
//!
//! ```rust,ignore
//! use chipctl_core::{identity, FabricId};
//!
//! assert_eq!(identity::fabric_id_for("beta")?, FabricId::new(2));
//! assert_eq!(identity::fabric_id_for("7")?, FabricId::new(7));
//! assert!(identity::fabric_id_for("2").is_err());
//! ```

#![doc(html_root_url = "https://docs.rs/chipctl-core/0.1.0")]

mod error;
pub mod types;

pub use error::{ChipError, ErrorKind, Result};
pub use types::*;

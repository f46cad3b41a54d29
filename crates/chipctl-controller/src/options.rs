//! Stack-wide and per-command configuration.

use chipctl_core::{identity, NodeId, VendorId};
use std::path::PathBuf;

/// Options consumed once, when the stack is set up
#[derive(Debug, Clone, Default)]
pub struct StackOptions {
    /// Directory holding the storage namespaces (defaults to the temp dir)
    pub storage_directory: Option<PathBuf>,

    /// Directory of trusted PAA certificates
    pub paa_trust_store_path: Option<PathBuf>,

    /// Directory of additional CD verifying certificates
    pub cd_trust_store_path: Option<PathBuf>,

    /// Reject the test CD signing key
    pub only_allow_trusted_cd_keys: bool,

    /// Trace destinations (`log`, `json:<path>`)
    pub trace_to: Vec<String>,
}

impl StackOptions {
    /// Create options with every setting at its default
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the storage directory
    #[must_use]
    pub fn storage_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_directory = Some(dir.into());
        self
    }

    /// Set the PAA trust store directory
    #[must_use]
    pub fn paa_trust_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.paa_trust_store_path = Some(path.into());
        self
    }

    /// Set the CD trust store directory
    #[must_use]
    pub fn cd_trust_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cd_trust_store_path = Some(path.into());
        self
    }

    /// Reject the test CD signing key
    #[must_use]
    pub const fn only_allow_trusted_cd_keys(mut self, only: bool) -> Self {
        self.only_allow_trusted_cd_keys = only;
        self
    }

    /// Add a trace destination
    #[must_use]
    pub fn trace_to(mut self, destination: impl Into<String>) -> Self {
        self.trace_to.push(destination.into());
        self
    }
}

/// Options selecting and configuring the commissioner a command runs against
#[derive(Debug, Clone, Default)]
pub struct CommissionerOptions {
    /// Identity name; `alpha` when unset
    pub identity: Option<String>,

    /// Explicit local node id, bypassing the identity storage
    pub node_id: Option<NodeId>,

    /// Vendor id of the commissioner; the test vendor when unset
    pub vendor_id: Option<VendorId>,

    /// Pad generated certificates up to the DER bound
    pub use_max_sized_certs: Option<bool>,
}

impl CommissionerOptions {
    /// Options for a given identity
    #[must_use]
    pub fn for_identity(name: impl Into<String>) -> Self {
        Self {
            identity: Some(name.into()),
            ..Self::default()
        }
    }

    /// Set an explicit node id
    #[must_use]
    pub const fn node_id(mut self, id: NodeId) -> Self {
        self.node_id = Some(id);
        self
    }

    /// Set the vendor id
    #[must_use]
    pub const fn vendor_id(mut self, id: VendorId) -> Self {
        self.vendor_id = Some(id);
        self
    }

    /// Request maximum-sized certificates
    #[must_use]
    pub const fn use_max_sized_certs(mut self, max: bool) -> Self {
        self.use_max_sized_certs = Some(max);
        self
    }

    /// Fill every unset field from `base`
    #[must_use]
    pub fn fill_from(self, base: &Self) -> Self {
        Self {
            identity: self.identity.or_else(|| base.identity.clone()),
            node_id: self.node_id.or(base.node_id),
            vendor_id: self.vendor_id.or(base.vendor_id),
            use_max_sized_certs: self.use_max_sized_certs.or(base.use_max_sized_certs),
        }
    }

    /// Identity name as given, or the default identity
    #[must_use]
    pub fn identity_or_default(&self) -> &str {
        self.identity
            .as_deref()
            .unwrap_or(identity::DEFAULT_IDENTITY)
    }
}

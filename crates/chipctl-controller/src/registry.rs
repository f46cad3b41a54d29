//! Identity name to (fabric id, node id) resolution.

use chipctl_core::{identity, CommissionerIdentity, FabricId, NodeId, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

use crate::storage::PersistentStorage;

/// An identity name resolved against the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    /// Commissioner-set key (normalized name + node id)
    pub key: CommissionerIdentity,
    /// Fabric bound to the name
    pub fabric_id: FabricId,
}

/// Resolves identity names and owns one storage namespace per identity
#[derive(Debug)]
pub struct IdentityRegistry {
    storage_dir: Option<PathBuf>,
    partitions: HashMap<String, PersistentStorage>,
}

impl IdentityRegistry {
    /// Create a registry whose namespaces live in `storage_dir`
    #[must_use]
    pub fn new(storage_dir: Option<&Path>) -> Self {
        Self {
            storage_dir: storage_dir.map(Path::to_path_buf),
            partitions: HashMap::new(),
        }
    }

    /// Storage directory, if one was configured
    #[must_use]
    pub fn storage_dir(&self) -> Option<&Path> {
        self.storage_dir.as_deref()
    }

    /// Validate and normalize an identity name.
    ///
    /// Unknown names are logged with the list of accepted ones before the
    /// fatal error is returned.
    pub fn normalize(&self, name: &str) -> Result<String> {
        identity::normalize(name).map_err(|e| {
            error!(identity = name, "{e}");
            e
        })
    }

    /// Fabric id bound to an identity name
    pub fn fabric_id(&self, name: &str) -> Result<FabricId> {
        identity::fabric_id_for(name).map_err(|e| {
            error!(identity = name, "{e}");
            e
        })
    }

    /// Node id of an identity.
    ///
    /// An explicit override wins; the null-fabric identity has no node id;
    /// everything else is read from (and first recorded in) the identity's
    /// storage namespace.
    pub fn node_id(&mut self, name: &str, node_override: Option<NodeId>) -> Result<NodeId> {
        if let Some(id) = node_override {
            return Ok(id);
        }
        if identity::is_null_fabric(name) {
            return Ok(NodeId::UNDEFINED);
        }
        self.storage(name)?.local_node_id()
    }

    /// Resolve a name into its commissioner-set key and fabric id
    pub fn resolve(&mut self, name: &str, node_override: Option<NodeId>) -> Result<ResolvedIdentity> {
        let name = self.normalize(name)?;
        let fabric_id = self.fabric_id(&name)?;
        let node_id = self.node_id(&name, node_override)?;

        debug!(identity = %name, fabric_id = %fabric_id, node_id = %node_id, "resolved identity");

        Ok(ResolvedIdentity {
            key: CommissionerIdentity::new(name, node_id),
            fabric_id,
        })
    }

    /// Storage namespace of an identity, opened on first use
    pub fn storage(&mut self, name: &str) -> Result<&mut PersistentStorage> {
        if !self.partitions.contains_key(name) {
            let storage = PersistentStorage::open(self.storage_dir.as_deref(), Some(name))?;
            self.partitions.insert(name.to_string(), storage);
        }
        self.partitions.get_mut(name).ok_or_else(|| {
            chipctl_core::ChipError::Internal(format!("storage for {name} vanished"))
        })
    }

    /// Names whose namespaces are currently open
    pub fn open_partitions(&self) -> impl Iterator<Item = &str> {
        self.partitions.keys().map(String::as_str)
    }

    /// Close an identity's namespace
    pub fn forget(&mut self, name: &str) -> bool {
        self.partitions.remove(name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chipctl_core::ChipError;
    use tempfile::TempDir;

    #[test]
    fn test_alpha_node_id_from_storage() {
        let dir = TempDir::new().unwrap();
        let mut registry = IdentityRegistry::new(Some(dir.path()));

        let first = registry.node_id("alpha", None).unwrap();
        assert_eq!(first, NodeId::DEFAULT_LOCAL);
        assert!(dir.path().join("chipctl_config.alpha.toml").exists());

        // Deterministic after the first write, even for a fresh registry.
        let mut other = IdentityRegistry::new(Some(dir.path()));
        assert_eq!(other.node_id("alpha", None).unwrap(), first);
    }

    #[test]
    fn test_node_id_override_and_null_fabric() {
        let dir = TempDir::new().unwrap();
        let mut registry = IdentityRegistry::new(Some(dir.path()));

        assert_eq!(
            registry.node_id("alpha", Some(NodeId::new(99))).unwrap(),
            NodeId::new(99)
        );
        assert_eq!(
            registry.node_id(identity::NULL_FABRIC, None).unwrap(),
            NodeId::UNDEFINED
        );
        // Neither path touched storage.
        assert_eq!(registry.open_partitions().count(), 0);
    }

    #[test]
    fn test_resolve_numeric_identity() {
        let dir = TempDir::new().unwrap();
        let mut registry = IdentityRegistry::new(Some(dir.path()));

        let resolved = registry.resolve("0x7", None).unwrap();
        assert_eq!(resolved.key.name, "7");
        assert_eq!(resolved.fabric_id, FabricId::new(7));
        assert!(dir.path().join("chipctl_config.7.toml").exists());
    }

    #[test]
    fn test_resolve_rejects_reserved_number() {
        let dir = TempDir::new().unwrap();
        let mut registry = IdentityRegistry::new(Some(dir.path()));

        let err = registry.resolve("2", None).unwrap_err();
        assert!(matches!(err, ChipError::InvalidFabricId { fabric_id: 2, .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_partitions_are_per_identity() {
        let dir = TempDir::new().unwrap();
        let mut registry = IdentityRegistry::new(Some(dir.path()));

        registry
            .storage("alpha")
            .unwrap()
            .set_local_node_id(NodeId::new(1))
            .unwrap();
        registry
            .storage("beta")
            .unwrap()
            .set_local_node_id(NodeId::new(2))
            .unwrap();

        assert_eq!(registry.node_id("alpha", None).unwrap(), NodeId::new(1));
        assert_eq!(registry.node_id("beta", None).unwrap(), NodeId::new(2));
        assert!(registry.forget("beta"));
        assert!(!registry.forget("beta"));
    }
}

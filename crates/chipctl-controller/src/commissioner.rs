//! Device-controller factory, fabric table and commissioner handles.

use chipctl_core::{
    ChipError, CompressedFabricId, FabricId, FabricIndex, NodeId, OperationalCredentials, Result,
    VendorId,
};
use rcgen::KeyPair;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::attestation::DeviceAttestationVerifier;
use crate::certs::{self, MatterAttr};
use crate::crypto;

/// Lifecycle of the device-controller factory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SystemState {
    /// `init` has not run yet
    #[default]
    Uninitialized,
    /// Ready to set up commissioners
    Ready,
    /// Shut down, no further commissioners can be created
    ShutDown,
}

/// Parameters of `DeviceControllerFactory::init`
#[derive(Debug, Clone, Default)]
pub struct FactoryInitParams {
    /// Operational listen port, 0 for an ephemeral port
    pub listen_port: u16,
    /// Allow the stack to answer incoming interactions
    pub enable_server_interactions: bool,
}

/// Parameters for one commissioner
#[derive(Default)]
pub struct SetupParams {
    /// Fabric the commissioner operates on, undefined for the null fabric
    pub fabric_id: FabricId,
    /// Local node id on that fabric
    pub node_id: NodeId,
    /// Vendor id advertised by the commissioner
    pub vendor_id: VendorId,
    /// Operational certificate chain
    pub credentials: Option<OperationalCredentials>,
    /// Key the NOC was issued for
    pub operational_key: Option<KeyPair>,
    /// Device attestation verifier configuration
    pub attestation_verifier: Option<DeviceAttestationVerifier>,
    /// Several controllers may share one fabric
    pub permit_multi_controller_fabrics: bool,
}

/// Fabric known to the local stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FabricInfo {
    /// Fabric id
    pub fabric_id: FabricId,
    /// Local node id on the fabric
    pub node_id: NodeId,
    /// Compressed fabric id derived from the root key
    pub compressed_fabric_id: CompressedFabricId,
}

/// Fabric table handing out local fabric indices
#[derive(Debug, Default)]
pub struct FabricTable {
    fabrics: BTreeMap<u8, FabricInfo>,
}

impl FabricTable {
    /// Add a fabric at the lowest free index
    pub fn allocate(&mut self, info: FabricInfo) -> Result<FabricIndex> {
        let index = (FabricIndex::MIN..=FabricIndex::MAX)
            .find(|i| !self.fabrics.contains_key(i))
            .and_then(FabricIndex::new)
            .ok_or_else(|| ChipError::Internal("fabric table is full".into()))?;
        self.fabrics.insert(index.get(), info);
        Ok(index)
    }

    /// Free an index; returns false if it was not in use
    pub fn release(&mut self, index: FabricIndex) -> bool {
        self.fabrics.remove(&index.get()).is_some()
    }

    /// Fabric stored at `index`
    #[must_use]
    pub fn get(&self, index: FabricIndex) -> Option<&FabricInfo> {
        self.fabrics.get(&index.get())
    }

    /// Number of fabrics in use
    #[must_use]
    pub fn len(&self) -> usize {
        self.fabrics.len()
    }

    /// Returns true if no fabric is in use
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fabrics.is_empty()
    }
}

/// A configured commissioner
#[derive(Debug)]
pub struct Commissioner {
    instance_id: u64,
    fabric_index: Option<FabricIndex>,
    fabric_id: FabricId,
    node_id: NodeId,
    vendor_id: VendorId,
    compressed_fabric_id: Option<CompressedFabricId>,
    credentials: Option<OperationalCredentials>,
    attestation_verifier: Option<DeviceAttestationVerifier>,
    running: bool,
}

impl Commissioner {
    /// Process-unique id of this handle
    #[must_use]
    pub const fn instance_id(&self) -> u64 {
        self.instance_id
    }

    /// Local fabric index, `None` for the null-fabric commissioner
    #[must_use]
    pub const fn fabric_index(&self) -> Option<FabricIndex> {
        self.fabric_index
    }

    /// Fabric id
    #[must_use]
    pub const fn fabric_id(&self) -> FabricId {
        self.fabric_id
    }

    /// Local node id
    #[must_use]
    pub const fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Vendor id
    #[must_use]
    pub const fn vendor_id(&self) -> VendorId {
        self.vendor_id
    }

    /// Compressed fabric id, `None` for the null-fabric commissioner
    #[must_use]
    pub const fn compressed_fabric_id(&self) -> Option<CompressedFabricId> {
        self.compressed_fabric_id
    }

    /// Operational certificate chain
    #[must_use]
    pub const fn credentials(&self) -> Option<&OperationalCredentials> {
        self.credentials.as_ref()
    }

    /// Attestation verifier configuration
    #[must_use]
    pub const fn attestation_verifier(&self) -> Option<&DeviceAttestationVerifier> {
        self.attestation_verifier.as_ref()
    }

    /// Returns true until `shutdown`
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Stop the commissioner and give its fabric index back. Idempotent.
    pub fn shutdown(&mut self, factory: &mut DeviceControllerFactory) {
        if !self.running {
            return;
        }
        if let Some(index) = self.fabric_index {
            factory.fabric_table.release(index);
        }
        self.running = false;
        debug!(instance = self.instance_id, fabric_id = %self.fabric_id, "commissioner shut down");
    }
}

/// Creates commissioners on top of the shared stack state
#[derive(Debug, Default)]
pub struct DeviceControllerFactory {
    state: SystemState,
    listen_port: u16,
    fabric_table: FabricTable,
    next_instance_id: u64,
}

impl DeviceControllerFactory {
    /// Create an uninitialized factory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bring the factory up
    pub fn init(&mut self, params: FactoryInitParams) -> Result<()> {
        if self.state == SystemState::Ready {
            return Err(ChipError::Internal("controller factory already initialized".into()));
        }
        self.listen_port = params.listen_port;
        self.state = SystemState::Ready;
        info!(
            listen_port = params.listen_port,
            server_interactions = params.enable_server_interactions,
            "controller factory initialized"
        );
        Ok(())
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn system_state(&self) -> SystemState {
        self.state
    }

    /// Listen port given to `init`
    #[must_use]
    pub const fn listen_port(&self) -> u16 {
        self.listen_port
    }

    /// Fabrics currently held by live commissioners
    #[must_use]
    pub const fn fabric_table(&self) -> &FabricTable {
        &self.fabric_table
    }

    /// Build a commissioner from prepared parameters.
    ///
    /// Commissioners on a defined fabric must carry a chain whose NOC names
    /// the same fabric and node; they receive a fabric index and a
    /// compressed fabric id derived from the RCAC public key.
    pub fn setup_commissioner(&mut self, params: SetupParams) -> Result<Commissioner> {
        if self.state != SystemState::Ready {
            return Err(ChipError::Internal(format!(
                "controller factory is not ready ({:?})",
                self.state
            )));
        }

        let (fabric_index, compressed_fabric_id) = if params.fabric_id.is_defined() {
            let chain = params.credentials.as_ref().ok_or_else(|| {
                ChipError::Protocol(format!(
                    "fabric {} has no operational credentials",
                    params.fabric_id
                ))
            })?;
            check_noc_subject(chain, params.fabric_id, params.node_id)?;

            let root_key = certs::public_key(chain.rcac())?;
            let compressed = crypto::compressed_fabric_id(&root_key, params.fabric_id)?;
            let index = self.fabric_table.allocate(FabricInfo {
                fabric_id: params.fabric_id,
                node_id: params.node_id,
                compressed_fabric_id: compressed,
            })?;
            (Some(index), Some(compressed))
        } else {
            (None, None)
        };

        self.next_instance_id += 1;
        let commissioner = Commissioner {
            instance_id: self.next_instance_id,
            fabric_index,
            fabric_id: params.fabric_id,
            node_id: params.node_id,
            vendor_id: params.vendor_id,
            compressed_fabric_id,
            credentials: params.credentials,
            attestation_verifier: params.attestation_verifier,
            running: true,
        };

        info!(
            instance = commissioner.instance_id,
            fabric_id = %commissioner.fabric_id,
            node_id = %commissioner.node_id,
            fabric_index = ?fabric_index.map(FabricIndex::get),
            "commissioner set up"
        );
        Ok(commissioner)
    }

    /// Stop the factory; no commissioner may be created afterwards
    pub fn shutdown(&mut self) {
        if !self.fabric_table.is_empty() {
            warn!(
                fabrics = self.fabric_table.len(),
                "controller factory shut down with fabrics still in use"
            );
        }
        self.fabric_table = FabricTable::default();
        self.state = SystemState::ShutDown;
    }
}

fn check_noc_subject(chain: &OperationalCredentials, fabric_id: FabricId, node_id: NodeId) -> Result<()> {
    let noc_fabric = certs::subject_attr(chain.noc(), MatterAttr::FabricId)?;
    let noc_node = certs::subject_attr(chain.noc(), MatterAttr::NodeId)?;
    if noc_fabric != Some(fabric_id.get()) || noc_node != Some(node_id.get()) {
        return Err(ChipError::Credentials(format!(
            "NOC subject (fabric {noc_fabric:?}, node {noc_node:?}) does not match {fabric_id}/{node_id}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issuer::{CredentialIssuer, ExampleCredentialIssuer};
    use crate::storage::PersistentStorage;
    use tempfile::TempDir;

    fn ready_factory() -> DeviceControllerFactory {
        let mut factory = DeviceControllerFactory::new();
        factory.init(FactoryInitParams::default()).unwrap();
        factory
    }

    fn params_for(dir: &TempDir, fabric: u64, node: u64) -> SetupParams {
        let mut storage = PersistentStorage::open(Some(dir.path()), Some("alpha")).unwrap();
        let mut issuer = ExampleCredentialIssuer::default();
        issuer.initialize_credentials_issuer(&mut storage).unwrap();
        let key = KeyPair::generate().unwrap();
        let chain = issuer
            .generate_controller_noc_chain(NodeId::new(node), FabricId::new(fabric), &[], &key)
            .unwrap();
        SetupParams {
            fabric_id: FabricId::new(fabric),
            node_id: NodeId::new(node),
            credentials: Some(chain),
            operational_key: Some(key),
            ..SetupParams::default()
        }
    }

    #[test]
    fn test_requires_init() {
        let mut factory = DeviceControllerFactory::new();
        assert_eq!(factory.system_state(), SystemState::Uninitialized);
        let err = factory.setup_commissioner(SetupParams::default()).unwrap_err();
        assert!(matches!(err, ChipError::Internal(_)));

        factory.init(FactoryInitParams::default()).unwrap();
        assert!(factory.init(FactoryInitParams::default()).is_err());
    }

    #[test]
    fn test_null_fabric_commissioner() {
        let mut factory = ready_factory();
        let commissioner = factory.setup_commissioner(SetupParams::default()).unwrap();
        assert!(commissioner.fabric_index().is_none());
        assert!(commissioner.compressed_fabric_id().is_none());
        assert!(commissioner.is_running());
        assert!(factory.fabric_table().is_empty());
    }

    #[test]
    fn test_fabric_commissioner_gets_index() {
        let dir = TempDir::new().unwrap();
        let mut factory = ready_factory();

        let mut first = factory.setup_commissioner(params_for(&dir, 1, 112_233)).unwrap();
        let second = factory.setup_commissioner(params_for(&dir, 1, 5)).unwrap();

        assert_eq!(first.fabric_index(), FabricIndex::new(1));
        assert_eq!(second.fabric_index(), FabricIndex::new(2));
        assert_ne!(first.instance_id(), second.instance_id());
        // Same root key, same fabric: same compressed fabric id.
        assert_eq!(first.compressed_fabric_id(), second.compressed_fabric_id());

        first.shutdown(&mut factory);
        first.shutdown(&mut factory);
        assert!(!first.is_running());
        assert_eq!(factory.fabric_table().len(), 1);

        let third = factory.setup_commissioner(params_for(&dir, 2, 9)).unwrap();
        assert_eq!(third.fabric_index(), FabricIndex::new(1));
    }

    #[test]
    fn test_missing_or_mismatched_credentials() {
        let dir = TempDir::new().unwrap();
        let mut factory = ready_factory();

        let no_chain = SetupParams {
            fabric_id: FabricId::new(1),
            node_id: NodeId::new(1),
            ..SetupParams::default()
        };
        assert!(matches!(
            factory.setup_commissioner(no_chain),
            Err(ChipError::Protocol(_))
        ));

        let mut wrong_node = params_for(&dir, 1, 1);
        wrong_node.node_id = NodeId::new(2);
        assert!(matches!(
            factory.setup_commissioner(wrong_node),
            Err(ChipError::Credentials(_))
        ));
        assert!(factory.fabric_table().is_empty());
    }

    #[test]
    fn test_shutdown_blocks_new_commissioners() {
        let mut factory = ready_factory();
        factory.shutdown();
        assert_eq!(factory.system_state(), SystemState::ShutDown);
        assert!(factory.setup_commissioner(SetupParams::default()).is_err());
    }
}

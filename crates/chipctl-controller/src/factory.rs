//! Commissioner construction and the commissioner set.
//!
//! The set holds at most one live commissioner per (identity name, node id)
//! pair. A commissioner only enters the set once every initialization step
//! has succeeded.

use chipctl_core::{identity, ChipError, CommissionerIdentity, Result, VendorId};
use rcgen::KeyPair;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::attestation::AttestationTrustStore;
use crate::certs;
use crate::commissioner::{Commissioner, DeviceControllerFactory, SetupParams};
use crate::group_data::{GroupDataProvider, DEFAULT_IPK};
use crate::issuer::{CredentialIssuer, CredentialIssuerOption};
use crate::options::CommissionerOptions;
use crate::registry::{IdentityRegistry, ResolvedIdentity};

/// Builds, caches and tears down commissioners
pub struct CommissionerFactory {
    controller: DeviceControllerFactory,
    issuer: Box<dyn CredentialIssuer>,
    group_data: GroupDataProvider,
    trust_store: Option<Arc<AttestationTrustStore>>,
    commissioners: BTreeMap<CommissionerIdentity, Commissioner>,
    chains_generated: u64,
}

impl CommissionerFactory {
    /// Create a factory signing chains with `issuer`
    #[must_use]
    pub fn new(issuer: Box<dyn CredentialIssuer>) -> Self {
        Self {
            controller: DeviceControllerFactory::new(),
            issuer,
            group_data: GroupDataProvider::new(),
            trust_store: None,
            commissioners: BTreeMap::new(),
            chains_generated: 0,
        }
    }

    /// Underlying device-controller factory
    #[must_use]
    pub const fn controller(&self) -> &DeviceControllerFactory {
        &self.controller
    }

    /// Underlying device-controller factory, mutably
    pub fn controller_mut(&mut self) -> &mut DeviceControllerFactory {
        &mut self.controller
    }

    /// Credential issuer
    pub fn issuer_mut(&mut self) -> &mut dyn CredentialIssuer {
        self.issuer.as_mut()
    }

    /// Group data provider
    #[must_use]
    pub const fn group_data(&self) -> &GroupDataProvider {
        &self.group_data
    }

    /// Group data provider, mutably
    pub fn group_data_mut(&mut self) -> &mut GroupDataProvider {
        &mut self.group_data
    }

    /// Install the trust store every new commissioner verifies against
    pub fn set_trust_store(&mut self, trust_store: Arc<AttestationTrustStore>) {
        self.trust_store = Some(trust_store);
    }

    /// Trust store, once configured
    #[must_use]
    pub fn trust_store(&self) -> Option<&Arc<AttestationTrustStore>> {
        self.trust_store.as_ref()
    }

    /// Number of certificate chains generated so far
    #[must_use]
    pub const fn chains_generated(&self) -> u64 {
        self.chains_generated
    }

    /// Make sure a commissioner exists for the identity the options select.
    ///
    /// Returns the commissioner-set key. Nothing happens if the key is
    /// already present.
    pub fn ensure_commissioner(
        &mut self,
        registry: &mut IdentityRegistry,
        options: &CommissionerOptions,
    ) -> Result<CommissionerIdentity> {
        let resolved = registry.resolve(options.identity_or_default(), options.node_id)?;
        if self.commissioners.contains_key(&resolved.key) {
            debug!(identity = %resolved.key, "reusing commissioner");
            return Ok(resolved.key);
        }
        let key = resolved.key.clone();
        self.initialize_commissioner(registry, resolved, options)?;
        Ok(key)
    }

    /// Build a commissioner for a resolved identity and add it to the set
    pub fn initialize_commissioner(
        &mut self,
        registry: &mut IdentityRegistry,
        resolved: ResolvedIdentity,
        options: &CommissionerOptions,
    ) -> Result<&Commissioner> {
        let ResolvedIdentity { key, fabric_id } = resolved;
        if self.commissioners.contains_key(&key) {
            return Err(ChipError::Internal(format!("commissioner {key} already exists")));
        }
        let trust_store = self
            .trust_store
            .clone()
            .ok_or_else(|| ChipError::Internal("attestation trust store not configured".into()))?;

        let mut params = SetupParams {
            fabric_id,
            node_id: key.node_id,
            vendor_id: options.vendor_id.unwrap_or(VendorId::TEST_VENDOR_1),
            permit_multi_controller_fabrics: true,
            ..SetupParams::default()
        };
        self.issuer.setup_device_attestation(&mut params, trust_store)?;

        if fabric_id.is_defined() {
            let storage = registry.storage(&key.name)?;
            self.issuer.set_option(
                CredentialIssuerOption::MaximizeCertificateSizes,
                options.use_max_sized_certs.unwrap_or(false),
            );
            self.issuer.initialize_credentials_issuer(storage)?;
            let cats = storage.commissioner_cats()?;

            let operational_key =
                KeyPair::generate().map_err(|e| certs::rcgen_error("operational key", &e))?;
            let chain = self.issuer.generate_controller_noc_chain(
                key.node_id,
                fabric_id,
                &cats,
                &operational_key,
            )?;
            self.chains_generated += 1;

            params.credentials = Some(chain);
            params.operational_key = Some(operational_key);
        }

        let mut commissioner = self.controller.setup_commissioner(params)?;

        if let (Some(index), Some(compressed)) = (
            commissioner.fabric_index(),
            commissioner.compressed_fabric_id(),
        ) {
            let programmed = self
                .group_data
                .init_test_group_data(index, compressed)
                .and_then(|()| {
                    self.group_data
                        .set_single_ipk_epoch_key(index, &DEFAULT_IPK, compressed)
                });
            if let Err(e) = programmed {
                error!(identity = %key, error = %e, "failed to program group keys");
                if let Err(cleanup) = self.group_data.remove_fabric(index) {
                    debug!(fabric_index = %index, error = %cleanup, "dropping partial group data");
                }
                commissioner.shutdown(&mut self.controller);
                return Err(e);
            }
        }

        info!(
            identity = %key,
            fabric_id = %fabric_id,
            null_fabric = identity::is_null_fabric(&key.name),
            "commissioner initialized"
        );
        Ok(self.commissioners.entry(key).or_insert(commissioner))
    }

    /// Live commissioner for a key
    #[must_use]
    pub fn get(&self, key: &CommissionerIdentity) -> Option<&Commissioner> {
        self.commissioners.get(key)
    }

    /// All live commissioners in key order
    pub fn commissioners(&self) -> impl Iterator<Item = (&CommissionerIdentity, &Commissioner)> {
        self.commissioners.iter()
    }

    /// Number of live commissioners
    #[must_use]
    pub fn len(&self) -> usize {
        self.commissioners.len()
    }

    /// Returns true if no commissioner is live
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commissioners.is_empty()
    }

    /// Shut one commissioner down and drop it from the set
    pub fn remove_identity(&mut self, key: &CommissionerIdentity) -> bool {
        let Some(mut commissioner) = self.commissioners.remove(key) else {
            return false;
        };
        commissioner.shutdown(&mut self.controller);
        info!(identity = %key, "commissioner removed");
        true
    }

    /// Shut every commissioner down, returning how many were live
    pub fn shutdown_all(&mut self) -> usize {
        let count = self.commissioners.len();
        for (key, mut commissioner) in std::mem::take(&mut self.commissioners) {
            commissioner.shutdown(&mut self.controller);
            debug!(identity = %key, "commissioner shut down");
        }
        count
    }
}

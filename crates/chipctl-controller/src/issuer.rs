//! Operational credential issuer.
//!
//! The example issuer keeps a root and an intermediate CA key per identity
//! storage and signs a fresh RCAC → ICAC → NOC chain for every commissioner
//! it is asked to set up.

use chipctl_core::{
    check_len, CaseAuthTag, CertKind, FabricId, NodeId, OperationalCredentials, Result,
    MAX_DER_CERT_LEN,
};
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose,
};
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};
use tracing::{debug, info};

use crate::attestation::{
    AttestationTrustStore, CdVerificationPolicy, DeviceAttestationVerifier, SharedCdPolicy,
};
use crate::certs::{self, MatterAttr};
use crate::commissioner::SetupParams;
use crate::storage::PersistentStorage;

/// Issuer behaviour switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialIssuerOption {
    /// Pad generated certificates up to the DER bound
    MaximizeCertificateSizes,
    /// Accept the well-known test CD signing key
    AllowTestCdSigningKey,
}

/// Source of device-attestation configuration and operational certificates
pub trait CredentialIssuer: Send {
    /// Attach the attestation verifier to a commissioner's setup parameters
    fn setup_device_attestation(
        &mut self,
        params: &mut SetupParams,
        trust_store: Arc<AttestationTrustStore>,
    ) -> Result<()>;

    /// Load or create the CA keys kept in an identity's storage
    fn initialize_credentials_issuer(&mut self, storage: &mut PersistentStorage) -> Result<()>;

    /// Sign a full RCAC/ICAC/NOC chain for `operational_key`
    fn generate_controller_noc_chain(
        &mut self,
        node_id: NodeId,
        fabric_id: FabricId,
        cats: &[CaseAuthTag],
        operational_key: &KeyPair,
    ) -> Result<OperationalCredentials>;

    /// Trust additional Certification Declaration signing certificates
    fn add_additional_cd_verifying_certs(&mut self, certs: Vec<Vec<u8>>) -> Result<()>;

    /// Toggle an issuer option
    fn set_option(&mut self, option: CredentialIssuerOption, enabled: bool);

    /// Current value of an issuer option
    fn option(&self, option: CredentialIssuerOption) -> bool;
}

const RCAC_ID: u64 = 1;
const ICAC_ID: u64 = 2;
const VALIDITY_YEARS: i64 = 10;

/// Room left for the padding extension's own framing
const PADDING_OVERHEAD: usize = 32;

struct CaKeys {
    root: KeyPair,
    intermediate: KeyPair,
}

/// Development issuer signing chains with locally stored CA keys
pub struct ExampleCredentialIssuer {
    index: u32,
    keys: Option<CaKeys>,
    cd_policy: SharedCdPolicy,
    maximize_cert_sizes: bool,
    chains_generated: u64,
    next_serial: u64,
}

impl Default for ExampleCredentialIssuer {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ExampleCredentialIssuer {
    /// Create an issuer whose keys live under storage index `index`
    #[must_use]
    pub fn new(index: u32) -> Self {
        Self {
            index,
            keys: None,
            cd_policy: Arc::new(RwLock::new(CdVerificationPolicy::default())),
            maximize_cert_sizes: false,
            chains_generated: 0,
            next_serial: 1,
        }
    }

    /// Number of chains signed so far
    #[must_use]
    pub const fn chains_generated(&self) -> u64 {
        self.chains_generated
    }

    fn cd_policy_mut(&self) -> RwLockWriteGuard<'_, CdVerificationPolicy> {
        self.cd_policy
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn root_key_name(&self) -> String {
        format!("ExampleOpCredsCAKey{}", self.index)
    }

    fn intermediate_key_name(&self) -> String {
        format!("ExampleOpCredsICAKey{}", self.index)
    }

    fn load_or_generate(storage: &mut PersistentStorage, key: &str) -> Result<KeyPair> {
        if let Some(pem) = storage.get(key) {
            return KeyPair::from_pem(pem).map_err(|e| certs::rcgen_error(key, &e));
        }
        let pair = KeyPair::generate().map_err(|e| certs::rcgen_error(key, &e))?;
        storage.set(key, pair.serialize_pem())?;
        debug!(key, "generated CA key");
        Ok(pair)
    }

    fn serial(&mut self) -> u64 {
        let serial = self.next_serial;
        self.next_serial += 1;
        serial
    }

    fn sign(
        params: &CertificateParams,
        subject_key: &KeyPair,
        issuer: Option<(&Certificate, &KeyPair)>,
    ) -> Result<Certificate> {
        match issuer {
            None => params.clone().self_signed(subject_key),
            Some((cert, key)) => params.clone().signed_by(subject_key, cert, key),
        }
        .map_err(|e| certs::rcgen_error("certificate signing", &e))
    }

    /// Sign, pad when requested, and enforce the DER bound.
    fn finish(
        &self,
        kind: CertKind,
        params: &CertificateParams,
        subject_key: &KeyPair,
        issuer: Option<(&Certificate, &KeyPair)>,
    ) -> Result<Certificate> {
        let mut cert = Self::sign(params, subject_key, issuer)?;

        if self.maximize_cert_sizes {
            let mut pad = MAX_DER_CERT_LEN.saturating_sub(cert.der().len() + PADDING_OVERHEAD);
            // Signature lengths vary by a few bytes, so shrink and retry.
            for _ in 0..3 {
                let mut padded = params.clone();
                padded.custom_extensions.push(certs::padding_extension(pad));
                let candidate = Self::sign(&padded, subject_key, issuer)?;
                let len = candidate.der().len();
                if len <= MAX_DER_CERT_LEN {
                    cert = candidate;
                    break;
                }
                pad = pad.saturating_sub(len - MAX_DER_CERT_LEN);
            }
        }

        check_len(kind, cert.der().len())?;
        Ok(cert)
    }

    fn ca_params(&mut self, attrs: &[(MatterAttr, u64)], path_len: u8) -> CertificateParams {
        let mut params = CertificateParams::default();
        params.distinguished_name = certs::matter_dn(attrs, None);
        params.is_ca = IsCa::Ca(BasicConstraints::Constrained(path_len));
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        let (not_before, not_after) = certs::validity_window(VALIDITY_YEARS);
        params.not_before = not_before;
        params.not_after = not_after;
        params.serial_number = Some(self.serial().into());
        params
    }
}

impl CredentialIssuer for ExampleCredentialIssuer {
    fn setup_device_attestation(
        &mut self,
        params: &mut SetupParams,
        trust_store: Arc<AttestationTrustStore>,
    ) -> Result<()> {
        params.attestation_verifier = Some(DeviceAttestationVerifier::new(
            trust_store,
            Arc::clone(&self.cd_policy),
        ));
        Ok(())
    }

    fn initialize_credentials_issuer(&mut self, storage: &mut PersistentStorage) -> Result<()> {
        let root = Self::load_or_generate(storage, &self.root_key_name())?;
        let intermediate = Self::load_or_generate(storage, &self.intermediate_key_name())?;
        self.keys = Some(CaKeys { root, intermediate });
        Ok(())
    }

    fn generate_controller_noc_chain(
        &mut self,
        node_id: NodeId,
        fabric_id: FabricId,
        cats: &[CaseAuthTag],
        operational_key: &KeyPair,
    ) -> Result<OperationalCredentials> {
        let fabric = fabric_id.get();

        let rcac_params = self.ca_params(
            &[(MatterAttr::RcacId, RCAC_ID), (MatterAttr::FabricId, fabric)],
            1,
        );
        let icac_params = self.ca_params(
            &[(MatterAttr::IcacId, ICAC_ID), (MatterAttr::FabricId, fabric)],
            0,
        );

        let mut noc_attrs = vec![
            (MatterAttr::NodeId, node_id.get()),
            (MatterAttr::FabricId, fabric),
        ];
        noc_attrs.extend(cats.iter().map(|cat| (MatterAttr::CaseAuthTag, u64::from(*cat))));
        let mut noc_params = CertificateParams::default();
        noc_params.distinguished_name = certs::matter_dn(&noc_attrs, None);
        noc_params.is_ca = IsCa::ExplicitNoCa;
        noc_params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        noc_params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ClientAuth,
            ExtendedKeyUsagePurpose::ServerAuth,
        ];
        let (not_before, not_after) = certs::validity_window(VALIDITY_YEARS);
        noc_params.not_before = not_before;
        noc_params.not_after = not_after;
        noc_params.serial_number = Some(self.serial().into());

        let keys = self.keys.as_ref().ok_or_else(|| {
            chipctl_core::ChipError::Internal("credentials issuer not initialized".into())
        })?;

        let rcac = self.finish(CertKind::Rcac, &rcac_params, &keys.root, None)?;
        let icac = self.finish(
            CertKind::Icac,
            &icac_params,
            &keys.intermediate,
            Some((&rcac, &keys.root)),
        )?;
        let noc = self.finish(
            CertKind::Noc,
            &noc_params,
            operational_key,
            Some((&icac, &keys.intermediate)),
        )?;

        let chain = OperationalCredentials::new(
            rcac.der().to_vec(),
            icac.der().to_vec(),
            noc.der().to_vec(),
        )?;
        self.chains_generated += 1;

        let lengths = chain.lengths();
        info!(
            fabric_id = %fabric_id,
            node_id = %node_id,
            rcac_len = lengths.rcac,
            icac_len = lengths.icac,
            noc_len = lengths.noc,
            "generated controller NOC chain"
        );
        Ok(chain)
    }

    fn add_additional_cd_verifying_certs(&mut self, certs: Vec<Vec<u8>>) -> Result<()> {
        self.cd_policy_mut().cd_verifying_certs.extend(certs);
        Ok(())
    }

    fn set_option(&mut self, option: CredentialIssuerOption, enabled: bool) {
        match option {
            CredentialIssuerOption::MaximizeCertificateSizes => self.maximize_cert_sizes = enabled,
            CredentialIssuerOption::AllowTestCdSigningKey => {
                self.cd_policy_mut().allow_test_cd_signing_key = enabled;
            }
        }
    }

    fn option(&self, option: CredentialIssuerOption) -> bool {
        match option {
            CredentialIssuerOption::MaximizeCertificateSizes => self.maximize_cert_sizes,
            CredentialIssuerOption::AllowTestCdSigningKey => {
                self.cd_policy
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .allow_test_cd_signing_key
            }
        }
    }
}

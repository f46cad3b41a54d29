//! Device-attestation trust material: PAA roots and CD verifying certificates.

use chipctl_core::{ChipError, Result, VendorId};
use rcgen::{BasicConstraints, CertificateParams, IsCa, KeyPair, KeyUsagePurpose};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{error, info, warn};

use crate::certs::{self, MatterAttr};

/// Where a trust store's anchors came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustStoreSource {
    /// Loaded from a configured directory
    Directory(PathBuf),
    /// Process-generated test PAA, used when no path is configured
    BuiltinTest,
}

/// A trusted Product Attestation Authority certificate
#[derive(Debug, Clone)]
pub struct TrustAnchor {
    /// Subject DN
    pub subject: String,
    /// Certificate DER
    pub der: Vec<u8>,
}

/// Set of PAA certificates used to validate device attestation
#[derive(Debug, Clone)]
pub struct AttestationTrustStore {
    source: TrustStoreSource,
    anchors: Vec<TrustAnchor>,
}

impl AttestationTrustStore {
    /// Load every certificate in `dir` as a PAA
    pub fn load_from_directory(dir: &Path) -> Result<Self> {
        let anchors = certs::load_all_x509_der_certs(dir)?
            .into_iter()
            .map(|der| {
                certs::subject(&der).map(|subject| TrustAnchor { subject, der })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            source: TrustStoreSource::Directory(dir.to_path_buf()),
            anchors,
        })
    }

    /// Test trust store holding a single generated PAA for the test vendor
    pub fn builtin_test() -> Result<Self> {
        let key = KeyPair::generate().map_err(|e| certs::rcgen_error("test PAA key", &e))?;

        let mut params = CertificateParams::default();
        params.distinguished_name = certs::matter_dn(
            &[(MatterAttr::VendorId, u64::from(VendorId::TEST_VENDOR_1.get()))],
            Some("Matter Test PAA"),
        );
        params.is_ca = IsCa::Ca(BasicConstraints::Constrained(1));
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        let (not_before, not_after) = certs::validity_window(10);
        params.not_before = not_before;
        params.not_after = not_after;

        let cert = params
            .self_signed(&key)
            .map_err(|e| certs::rcgen_error("test PAA", &e))?;
        let der = cert.der().to_vec();

        Ok(Self {
            source: TrustStoreSource::BuiltinTest,
            anchors: vec![TrustAnchor {
                subject: certs::subject(&der)?,
                der,
            }],
        })
    }

    /// Resolve the trust store for a configured path.
    ///
    /// No path means the built-in test store. A configured path that yields
    /// no PAA at all is an operator error.
    pub fn resolve(paa_path: Option<&Path>) -> Result<Self> {
        let Some(path) = paa_path else {
            info!("no PAA trust store path configured, using built-in test PAA");
            return Self::builtin_test();
        };

        let store = match Self::load_from_directory(path) {
            Ok(store) => store,
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to read PAA trust store");
                return Err(e);
            }
        };

        if store.paa_count() == 0 {
            error!(path = %path.display(), "no PAAs found in path");
            error!(
                "please specify a valid path containing trusted PAA certificates using --paa-trust-store-path"
            );
            return Err(ChipError::InvalidArgument(format!(
                "no PAA certificates found in {}",
                path.display()
            )));
        }

        info!(path = %path.display(), paa_count = store.paa_count(), "loaded PAA trust store");
        Ok(store)
    }

    /// Number of trusted PAAs
    #[must_use]
    pub fn paa_count(&self) -> usize {
        self.anchors.len()
    }

    /// Trusted PAAs
    #[must_use]
    pub fn anchors(&self) -> &[TrustAnchor] {
        &self.anchors
    }

    /// Where the anchors came from
    #[must_use]
    pub fn source(&self) -> &TrustStoreSource {
        &self.source
    }

    /// Returns true if a PAA with this DER is trusted
    #[must_use]
    pub fn contains(&self, der: &[u8]) -> bool {
        self.anchors.iter().any(|a| a.der == der)
    }
}

/// Load the additional CD verifying certificates from a configured path.
///
/// An empty directory is not fatal: only the default keys are used.
pub fn load_cd_verifying_certs(cd_path: Option<&Path>) -> Result<Vec<Vec<u8>>> {
    let Some(path) = cd_path else {
        return Ok(Vec::new());
    };
    let certs = certs::load_all_x509_der_certs(path)?;
    if certs.is_empty() {
        warn!(
            path = %path.display(),
            "no CD signing certs found in path, only defaults will be used"
        );
    }
    Ok(certs)
}

/// Certification Declaration acceptance rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdVerificationPolicy {
    /// Additional CD verifying certificates
    pub cd_verifying_certs: Vec<Vec<u8>>,
    /// Whether the well-known test CD signing key is accepted
    pub allow_test_cd_signing_key: bool,
}

impl Default for CdVerificationPolicy {
    fn default() -> Self {
        Self {
            cd_verifying_certs: Vec::new(),
            allow_test_cd_signing_key: true,
        }
    }
}

/// CD policy owned by the issuer and observed by every verifier it hands out
pub type SharedCdPolicy = Arc<RwLock<CdVerificationPolicy>>;

/// Verifier configuration handed to every commissioner.
///
/// The CD policy is shared, so changes made through the issuer after a
/// commissioner was created still apply to it.
#[derive(Debug, Clone)]
pub struct DeviceAttestationVerifier {
    trust_store: Arc<AttestationTrustStore>,
    policy: SharedCdPolicy,
}

impl DeviceAttestationVerifier {
    /// Verifier over `trust_store` following `policy`
    #[must_use]
    pub const fn new(trust_store: Arc<AttestationTrustStore>, policy: SharedCdPolicy) -> Self {
        Self {
            trust_store,
            policy,
        }
    }

    /// PAA roots shared by all commissioners
    #[must_use]
    pub const fn trust_store(&self) -> &Arc<AttestationTrustStore> {
        &self.trust_store
    }

    /// Snapshot of the current CD policy
    #[must_use]
    pub fn policy(&self) -> CdVerificationPolicy {
        self.policy
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of additional CD verifying certificates
    #[must_use]
    pub fn cd_cert_count(&self) -> usize {
        self.policy
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .cd_verifying_certs
            .len()
    }

    /// Whether the well-known test CD signing key is accepted
    #[must_use]
    pub fn allows_test_cd_signing_key(&self) -> bool {
        self.policy
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .allow_test_cd_signing_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_no_path_falls_back_to_builtin() {
        let store = AttestationTrustStore::resolve(None).unwrap();
        assert_eq!(store.source(), &TrustStoreSource::BuiltinTest);
        assert_eq!(store.paa_count(), 1);
        assert!(store.anchors()[0].subject.contains("Matter Test PAA"));
    }

    #[test]
    fn test_explicit_empty_path_is_rejected() {
        let dir = TempDir::new().unwrap();
        let err = AttestationTrustStore::resolve(Some(dir.path())).unwrap_err();
        assert!(matches!(err, ChipError::InvalidArgument(_)));
    }

    #[test]
    fn test_explicit_missing_path_is_rejected() {
        let err = AttestationTrustStore::resolve(Some(Path::new("/no/such/paa/dir"))).unwrap_err();
        assert!(matches!(err, ChipError::TrustStore(_)));
    }

    #[test]
    fn test_directory_store() {
        let builtin = AttestationTrustStore::builtin_test().unwrap();
        let der = builtin.anchors()[0].der.clone();

        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Chip-Test-PAA-FFF1.der"), &der).unwrap();

        let store = AttestationTrustStore::resolve(Some(dir.path())).unwrap();
        assert_eq!(store.paa_count(), 1);
        assert!(store.contains(&der));
        assert_eq!(
            store.source(),
            &TrustStoreSource::Directory(dir.path().to_path_buf())
        );
    }

    #[test]
    fn test_cd_certs_empty_directory_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        assert!(load_cd_verifying_certs(Some(dir.path())).unwrap().is_empty());
        assert!(load_cd_verifying_certs(None).unwrap().is_empty());
    }
}

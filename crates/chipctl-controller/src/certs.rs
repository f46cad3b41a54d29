//! X.509 helpers for Matter operational and attestation certificates.

use chipctl_core::{ChipError, Result};
use rcgen::{CustomExtension, DistinguishedName, DnType};
use std::path::Path;
use time::OffsetDateTime;
use tracing::debug;

/// Matter DN attribute carried in operational certificate subjects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatterAttr {
    /// Operational node id (1.3.6.1.4.1.37244.1.1)
    NodeId,
    /// ICAC id (1.3.6.1.4.1.37244.1.3)
    IcacId,
    /// RCAC id (1.3.6.1.4.1.37244.1.4)
    RcacId,
    /// Fabric id (1.3.6.1.4.1.37244.1.5)
    FabricId,
    /// CASE authenticated tag (1.3.6.1.4.1.37244.1.6)
    CaseAuthTag,
    /// Vendor id of an attestation certificate (1.3.6.1.4.1.37244.2.1)
    VendorId,
}

impl MatterAttr {
    const fn arcs(self) -> [u64; 9] {
        let (group, leaf) = match self {
            Self::NodeId => (1, 1),
            Self::IcacId => (1, 3),
            Self::RcacId => (1, 4),
            Self::FabricId => (1, 5),
            Self::CaseAuthTag => (1, 6),
            Self::VendorId => (2, 1),
        };
        [1, 3, 6, 1, 4, 1, 37244, group, leaf]
    }

    /// Dotted OID string
    #[must_use]
    pub fn oid_string(self) -> String {
        self.arcs()
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Hex spelling of a value for this attribute
    fn encode(self, value: u64) -> String {
        match self {
            Self::CaseAuthTag => format!("{value:08X}"),
            Self::VendorId => format!("{value:04X}"),
            _ => format!("{value:016X}"),
        }
    }
}

/// Non-critical extension used to pad certificates to a target size
const PADDING_EXTENSION_OID: [u64; 9] = [1, 3, 6, 1, 4, 1, 37244, 99, 1];

/// Build a subject DN from Matter attributes and an optional common name.
pub fn matter_dn(attrs: &[(MatterAttr, u64)], common_name: Option<&str>) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    if let Some(cn) = common_name {
        dn.push(DnType::CommonName, cn);
    }
    for (attr, value) in attrs {
        dn.push(DnType::CustomDnType(attr.arcs().to_vec()), attr.encode(*value));
    }
    dn
}

/// Padding extension whose encoded value is `len` bytes of filler.
pub fn padding_extension(len: usize) -> CustomExtension {
    let mut content = vec![0x04];
    match len {
        0..=0x7F => content.push(len as u8),
        0x80..=0xFF => content.extend([0x81, len as u8]),
        _ => content.extend([0x82, (len >> 8) as u8, len as u8]),
    }
    content.resize(content.len() + len, 0xA5);
    CustomExtension::from_oid_content(&PADDING_EXTENSION_OID, content)
}

/// Validity window starting now and lasting `years`
#[must_use]
pub fn validity_window(years: i64) -> (OffsetDateTime, OffsetDateTime) {
    let now = OffsetDateTime::now_utc();
    (now, now + time::Duration::days(365 * years))
}

pub(crate) fn rcgen_error(context: &str, err: &rcgen::Error) -> ChipError {
    ChipError::Credentials(format!("{context}: {err}"))
}

fn parse(der: &[u8]) -> Result<x509_parser::certificate::X509Certificate<'_>> {
    x509_parser::parse_x509_certificate(der)
        .map(|(_, cert)| cert)
        .map_err(|e| ChipError::Credentials(format!("certificate parse failed: {e}")))
}

/// Subject DN rendered as a string
pub fn subject(der: &[u8]) -> Result<String> {
    Ok(parse(der)?.subject().to_string())
}

/// Raw subject public key (uncompressed SEC1 point for P-256)
pub fn public_key(der: &[u8]) -> Result<Vec<u8>> {
    Ok(parse(der)?.public_key().subject_public_key.data.to_vec())
}

/// Value of a Matter attribute in the subject, decoded from hex
pub fn subject_attr(der: &[u8], attr: MatterAttr) -> Result<Option<u64>> {
    let cert = parse(der)?;
    let oid = attr.oid_string();
    let value = cert
        .subject()
        .iter_attributes()
        .find(|a| a.attr_type().to_id_string() == oid)
        .and_then(|a| a.as_str().ok())
        .map(|s| {
            u64::from_str_radix(s, 16)
                .map_err(|e| ChipError::Credentials(format!("bad {oid} value {s}: {e}")))
        })
        .transpose()?;
    Ok(value)
}

/// Load every X.509 certificate found directly in `dir`.
///
/// Files may be PEM (any number of CERTIFICATE blocks) or raw DER. Files
/// that parse as neither are skipped.
pub fn load_all_x509_der_certs(dir: &Path) -> Result<Vec<Vec<u8>>> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| ChipError::TrustStore(format!("{}: {e}", dir.display())))?;

    let mut paths: Vec<_> = entries
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    let mut certs = Vec::new();
    for path in paths {
        let content = match std::fs::read(&path) {
            Ok(content) => content,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "skipping unreadable file");
                continue;
            }
        };

        let ders: Vec<Vec<u8>> = match pem::parse_many(&content) {
            Ok(blocks) if !blocks.is_empty() => blocks
                .into_iter()
                .filter(|p| p.tag() == "CERTIFICATE")
                .map(|p| p.contents().to_vec())
                .collect(),
            _ => vec![content],
        };

        for der in ders {
            match parse(&der) {
                Ok(_) => certs.push(der),
                Err(e) => debug!(path = %path.display(), error = %e, "skipping non-certificate"),
            }
        }
    }

    Ok(certs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, KeyPair};
    use tempfile::TempDir;

    fn self_signed(attrs: &[(MatterAttr, u64)]) -> (Vec<u8>, String) {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::default();
        params.distinguished_name = matter_dn(attrs, Some("test"));
        let cert = params.self_signed(&key).unwrap();
        (cert.der().to_vec(), cert.pem())
    }

    #[test]
    fn test_oid_strings() {
        assert_eq!(MatterAttr::FabricId.oid_string(), "1.3.6.1.4.1.37244.1.5");
        assert_eq!(MatterAttr::VendorId.oid_string(), "1.3.6.1.4.1.37244.2.1");
    }

    #[test]
    fn test_subject_attr_round_trip() {
        let (der, _) = self_signed(&[(MatterAttr::FabricId, 7), (MatterAttr::NodeId, 112_233)]);
        assert_eq!(subject_attr(&der, MatterAttr::FabricId).unwrap(), Some(7));
        assert_eq!(subject_attr(&der, MatterAttr::NodeId).unwrap(), Some(112_233));
        assert_eq!(subject_attr(&der, MatterAttr::RcacId).unwrap(), None);
        assert_eq!(public_key(&der).unwrap().len(), 65);
    }

    #[test]
    fn test_load_mixed_directory() {
        let dir = TempDir::new().unwrap();
        let (der, _) = self_signed(&[(MatterAttr::VendorId, 0xFFF1)]);
        let (_, pem) = self_signed(&[(MatterAttr::VendorId, 0xFFF2)]);
        std::fs::write(dir.path().join("paa-1.der"), &der).unwrap();
        std::fs::write(dir.path().join("paa-2.pem"), pem).unwrap();
        std::fs::write(dir.path().join("README"), "not a cert").unwrap();

        let certs = load_all_x509_der_certs(dir.path()).unwrap();
        assert_eq!(certs.len(), 2);
        assert_eq!(certs[0], der);
    }

    #[test]
    fn test_load_missing_directory() {
        let err = load_all_x509_der_certs(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, ChipError::TrustStore(_)));
    }

    #[test]
    fn test_padding_extension_grows_certificate() {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::default();
        params.distinguished_name = matter_dn(&[(MatterAttr::NodeId, 1)], None);
        let plain = params.clone().self_signed(&key).unwrap().der().len();
        params.custom_extensions.push(padding_extension(150));
        let padded = params.self_signed(&key).unwrap().der().len();
        assert!(padded >= plain + 150);
    }
}

//! Operational certificate chain cached per identity.

use serde::{Deserialize, Serialize};

use crate::error::{ChipError, Result};

/// Upper bound of a DER-encoded operational certificate
pub const MAX_DER_CERT_LEN: usize = 600;

/// CASE authenticated tag carried in a NOC subject
pub type CaseAuthTag = u32;

/// Which certificate of the chain a buffer holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CertKind {
    /// Root CA certificate
    Rcac,
    /// Intermediate CA certificate
    Icac,
    /// Node operational certificate
    Noc,
}

impl CertKind {
    /// Short label used in logs and errors
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Rcac => "RCAC",
            Self::Icac => "ICAC",
            Self::Noc => "NOC",
        }
    }
}

/// NOC/ICAC/RCAC chain, each bounded by [`MAX_DER_CERT_LEN`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationalCredentials {
    rcac: Vec<u8>,
    icac: Vec<u8>,
    noc: Vec<u8>,
}

impl OperationalCredentials {
    /// Assemble a chain, rejecting any certificate over the DER bound
    pub fn new(rcac: Vec<u8>, icac: Vec<u8>, noc: Vec<u8>) -> Result<Self> {
        for (kind, der) in [
            (CertKind::Rcac, &rcac),
            (CertKind::Icac, &icac),
            (CertKind::Noc, &noc),
        ] {
            check_len(kind, der.len())?;
        }
        Ok(Self { rcac, icac, noc })
    }

    /// Root certificate DER
    #[must_use]
    pub fn rcac(&self) -> &[u8] {
        &self.rcac
    }

    /// Intermediate certificate DER
    #[must_use]
    pub fn icac(&self) -> &[u8] {
        &self.icac
    }

    /// Node operational certificate DER
    #[must_use]
    pub fn noc(&self) -> &[u8] {
        &self.noc
    }

    /// Lengths of (RCAC, ICAC, NOC)
    #[must_use]
    pub fn lengths(&self) -> CertLengths {
        CertLengths {
            rcac: self.rcac.len(),
            icac: self.icac.len(),
            noc: self.noc.len(),
        }
    }

    /// Returns true when no chain was generated (null-fabric commissioner)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rcac.is_empty() && self.icac.is_empty() && self.noc.is_empty()
    }
}

/// Recorded certificate lengths
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertLengths {
    /// RCAC length in bytes
    pub rcac: usize,
    /// ICAC length in bytes
    pub icac: usize,
    /// NOC length in bytes
    pub noc: usize,
}

/// Check a DER length against [`MAX_DER_CERT_LEN`]
pub fn check_len(kind: CertKind, len: usize) -> Result<()> {
    if len > MAX_DER_CERT_LEN {
        return Err(ChipError::BufferTooSmall {
            what: kind.label(),
            len,
            max: MAX_DER_CERT_LEN,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oversized_certificate_rejected() {
        let err = OperationalCredentials::new(vec![0; 10], vec![0; 601], vec![0; 10]).unwrap_err();
        assert!(matches!(
            err,
            ChipError::BufferTooSmall { what: "ICAC", len: 601, .. }
        ));
    }

    #[test]
    fn test_lengths_recorded() {
        let creds = OperationalCredentials::new(vec![1; 400], vec![2; 410], vec![3; 600]).unwrap();
        let lengths = creds.lengths();
        assert_eq!((lengths.rcac, lengths.icac, lengths.noc), (400, 410, 600));
        assert!(!creds.is_empty());
        assert!(OperationalCredentials::default().is_empty());
    }
}

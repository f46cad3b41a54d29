//! Commissioner identity names and their fabric bindings.
//!
//! Three names are well known and bound to reserved fabric ids. The null-fabric
//! commissioner has no fabric at all. Every other identity is a fabric id
//! spelled as a number, and must be at least [`FIRST_OTHER_FABRIC_ID`].

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{FabricId, NodeId};
use crate::error::{ChipError, Result};

/// Identity bound to fabric 1
pub const ALPHA: &str = "alpha";
/// Identity bound to fabric 2
pub const BETA: &str = "beta";
/// Identity bound to fabric 3
pub const GAMMA: &str = "gamma";
/// Identity without a fabric, used before any operational credentials exist
pub const NULL_FABRIC: &str = "null-fabric-commissioner";

/// Identity used when none is given
pub const DEFAULT_IDENTITY: &str = ALPHA;

/// Smallest fabric id a numeric identity may use
pub const FIRST_OTHER_FABRIC_ID: u64 = 4;

const WELL_KNOWN: [(&str, FabricId); 4] = [
    (ALPHA, FabricId::new(1)),
    (BETA, FabricId::new(2)),
    (GAMMA, FabricId::new(3)),
    (NULL_FABRIC, FabricId::UNDEFINED),
];

/// Fabric id for a well-known name, if it is one
#[must_use]
pub fn well_known_fabric_id(name: &str) -> Option<FabricId> {
    WELL_KNOWN
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, id)| *id)
}

/// Returns true if `name` is the null-fabric identity
#[must_use]
pub fn is_null_fabric(name: &str) -> bool {
    name == NULL_FABRIC
}

/// Parse a numeric identity, decimal or `0x` hex, rejecting trailing garbage.
fn parse_numeric(name: &str) -> Option<u64> {
    let trimmed = name.trim();
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16).ok()
    } else if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        trimmed.parse().ok()
    } else {
        None
    }
}

/// Resolve the fabric id bound to an identity name.
///
/// Numeric spellings of the reserved ids ("2", "01", "0x3") are rejected
/// rather than aliased onto the well-known names.
pub fn fabric_id_for(name: &str) -> Result<FabricId> {
    if let Some(id) = well_known_fabric_id(name) {
        return Ok(id);
    }

    match parse_numeric(name) {
        Some(id) if id >= FIRST_OTHER_FABRIC_ID => Ok(FabricId::new(id)),
        Some(id) => Err(ChipError::InvalidFabricId {
            name: name.to_string(),
            fabric_id: id,
        }),
        None => Err(ChipError::UnknownIdentity {
            name: name.to_string(),
        }),
    }
}

/// Canonical spelling of an identity name.
///
/// Numeric names key a storage namespace, so "0x10" and "16" must land in
/// the same place.
pub fn normalize(name: &str) -> Result<String> {
    if well_known_fabric_id(name).is_some() {
        return Ok(name.to_string());
    }
    fabric_id_for(name).map(|id| id.get().to_string())
}

/// Key of a live commissioner: the identity name plus its local node id
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CommissionerIdentity {
    /// Normalized identity name
    pub name: String,
    /// Local node id of the commissioner on that fabric
    pub node_id: NodeId,
}

impl CommissionerIdentity {
    /// Build a key from a normalized name and node id
    #[must_use]
    pub fn new(name: impl Into<String>, node_id: NodeId) -> Self {
        Self {
            name: name.into(),
            node_id,
        }
    }

    /// Returns true if this key belongs to the null-fabric commissioner
    #[must_use]
    pub fn is_null_fabric(&self) -> bool {
        is_null_fabric(&self.name)
    }
}

impl fmt::Display for CommissionerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_known_fabric_ids() {
        assert_eq!(fabric_id_for("alpha").unwrap(), FabricId::new(1));
        assert_eq!(fabric_id_for("beta").unwrap(), FabricId::new(2));
        assert_eq!(fabric_id_for("gamma").unwrap(), FabricId::new(3));
        assert_eq!(
            fabric_id_for("null-fabric-commissioner").unwrap(),
            FabricId::UNDEFINED
        );
    }

    #[test]
    fn test_numeric_identities() {
        assert_eq!(fabric_id_for("4").unwrap(), FabricId::new(4));
        assert_eq!(fabric_id_for("7").unwrap(), FabricId::new(7));
        assert_eq!(fabric_id_for("0x10").unwrap(), FabricId::new(16));
        assert_eq!(
            fabric_id_for("18446744073709551615").unwrap(),
            FabricId::new(u64::MAX)
        );
    }

    #[test]
    fn test_reserved_numeric_identities_rejected() {
        for name in ["0", "1", "2", "3", "01", "0x2", "003"] {
            let err = fabric_id_for(name).unwrap_err();
            assert!(
                matches!(err, ChipError::InvalidFabricId { .. }),
                "{name} should be rejected"
            );
            assert!(err.is_fatal());
        }
    }

    #[test]
    fn test_unknown_identities_rejected() {
        for name in ["delta", "Alpha", "", "7abc", "-5", "0x"] {
            let err = fabric_id_for(name).unwrap_err();
            assert!(err.is_fatal(), "{name} should be fatal");
        }
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("alpha").unwrap(), "alpha");
        assert_eq!(normalize("0x10").unwrap(), "16");
        assert_eq!(normalize("0007").unwrap(), "7");
        assert!(normalize("beta2").is_err());
    }

    #[test]
    fn test_commissioner_identity_ordering() {
        let a = CommissionerIdentity::new("alpha", NodeId::new(2));
        let b = CommissionerIdentity::new("alpha", NodeId::new(10));
        let c = CommissionerIdentity::new("beta", NodeId::new(1));
        assert!(a < b);
        assert!(b < c);
        assert!(CommissionerIdentity::new(NULL_FABRIC, NodeId::UNDEFINED).is_null_fabric());
    }
}

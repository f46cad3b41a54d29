//! Fabric, node and vendor identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a fabric (administrative domain)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FabricId(u64);

impl FabricId {
    /// Fabric id used by the null-fabric commissioner
    pub const UNDEFINED: Self = Self(0);

    /// Wrap a raw fabric id
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw value
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns true for any id other than [`FabricId::UNDEFINED`]
    #[must_use]
    pub const fn is_defined(self) -> bool {
        self.0 != Self::UNDEFINED.0
    }

    /// Big-endian encoding, the form used as HKDF salt
    #[must_use]
    pub const fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for FabricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Operational node identifier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    /// Node id of the null-fabric commissioner
    pub const UNDEFINED: Self = Self(0);

    /// Local node id used when an identity storage has none recorded yet
    pub const DEFAULT_LOCAL: Self = Self(112_233);

    /// Wrap a raw node id
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw value
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns true for any id other than [`NodeId::UNDEFINED`]
    #[must_use]
    pub const fn is_defined(self) -> bool {
        self.0 != Self::UNDEFINED.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

/// Vendor identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VendorId(u16);

impl VendorId {
    /// Test vendor id used when no vendor is configured
    pub const TEST_VENDOR_1: Self = Self(0xFFF1);

    /// Wrap a raw vendor id
    #[must_use]
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    /// Raw value
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }
}

impl Default for VendorId {
    fn default() -> Self {
        Self::TEST_VENDOR_1
    }
}

impl fmt::Display for VendorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

/// Local index of a fabric in the fabric table (1..=254)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FabricIndex(u8);

impl FabricIndex {
    /// Smallest valid index
    pub const MIN: u8 = 1;
    /// Largest valid index
    pub const MAX: u8 = 254;

    /// Wrap a raw index, rejecting values outside `1..=254`
    #[must_use]
    pub const fn new(index: u8) -> Option<Self> {
        if index >= Self::MIN && index <= Self::MAX {
            Some(Self(index))
        } else {
            None
        }
    }

    /// Raw value
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for FabricIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Compressed fabric identifier derived from the root public key and fabric id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompressedFabricId(u64);

impl CompressedFabricId {
    /// Build from the 8 derived bytes (big-endian)
    #[must_use]
    pub const fn from_be_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_be_bytes(bytes))
    }

    /// Raw value
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Big-endian encoding, the form used as group key derivation salt
    #[must_use]
    pub const fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for CompressedFabricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

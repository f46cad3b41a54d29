//! Attribute addressing for the opaque data-model store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ChipError;

/// Endpoint/cluster/attribute triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttributePath {
    /// Endpoint number
    pub endpoint: u16,
    /// Cluster id
    pub cluster: u32,
    /// Attribute id
    pub attribute: u32,
}

impl AttributePath {
    /// Build a path
    #[must_use]
    pub const fn new(endpoint: u16, cluster: u32, attribute: u32) -> Self {
        Self {
            endpoint,
            cluster,
            attribute,
        }
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/0x{:04X}/0x{:04X}",
            self.endpoint, self.cluster, self.attribute
        )
    }
}

/// Attribute values are carried as JSON, the store does not know the schema
pub type AttributeValue = serde_json::Value;

/// Parse a decimal or `0x` hex id, as used on the command line for cluster
/// and attribute ids.
pub fn parse_id<T>(s: &str) -> Result<T, ChipError>
where
    T: TryFrom<u64>,
{
    let raw = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .map_or_else(|| u64::from_str(s), |hex| u64::from_str_radix(hex, 16))
        .map_err(|_| ChipError::InvalidArgument(format!("not a number: {s}")))?;
    T::try_from(raw).map_err(|_| ChipError::InvalidArgument(format!("out of range: {s}")))
}

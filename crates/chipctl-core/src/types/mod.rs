//! Shared identifier, identity and credential types.

mod attribute;
mod credentials;
pub mod identity;
mod ids;

pub use attribute::{parse_id, AttributePath, AttributeValue};
pub use credentials::{
    check_len, CaseAuthTag, CertKind, CertLengths, OperationalCredentials, MAX_DER_CERT_LEN,
};
pub use identity::CommissionerIdentity;
pub use ids::{CompressedFabricId, FabricId, FabricIndex, NodeId, VendorId};

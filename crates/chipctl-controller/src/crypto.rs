//! Key derivations shared by the commissioner and the group-data provider.

use chipctl_core::{ChipError, CompressedFabricId, FabricId, Result};
use ring::hkdf;

const COMPRESSED_FABRIC_INFO: &[u8] = b"CompressedFabric";
const GROUP_KEY_INFO: &[u8] = b"GroupKey v1.0";

/// Length of a symmetric group key
pub const GROUP_KEY_LEN: usize = 16;

/// Symmetric group key material
pub type GroupKey = [u8; GROUP_KEY_LEN];

struct OkmLen(usize);

impl hkdf::KeyType for OkmLen {
    fn len(&self) -> usize {
        self.0
    }
}

fn hkdf_sha256(salt: &[u8], ikm: &[u8], info: &[u8], out: &mut [u8]) -> Result<()> {
    let prk = hkdf::Salt::new(hkdf::HKDF_SHA256, salt).extract(ikm);
    let info = [info];
    prk.expand(&info, OkmLen(out.len()))
        .and_then(|okm| okm.fill(out))
        .map_err(|_| ChipError::Protocol("HKDF expansion failed".into()))
}

/// Derive the compressed fabric id from an uncompressed P-256 root public key.
pub fn compressed_fabric_id(root_public_key: &[u8], fabric_id: FabricId) -> Result<CompressedFabricId> {
    // Drop the SEC1 0x04 prefix.
    let point = match root_public_key {
        [0x04, rest @ ..] if rest.len() == 64 => rest,
        _ => {
            return Err(ChipError::Protocol(format!(
                "root public key is {} bytes, expected an uncompressed P-256 point",
                root_public_key.len()
            )))
        }
    };

    let mut out = [0u8; 8];
    hkdf_sha256(&fabric_id.to_be_bytes(), point, COMPRESSED_FABRIC_INFO, &mut out)?;
    Ok(CompressedFabricId::from_be_bytes(out))
}

/// Derive the operational group key of an epoch key on a given fabric.
pub fn operational_group_key(
    epoch_key: &GroupKey,
    compressed_fabric_id: CompressedFabricId,
) -> Result<GroupKey> {
    let mut out = [0u8; GROUP_KEY_LEN];
    hkdf_sha256(
        &compressed_fabric_id.to_be_bytes(),
        epoch_key,
        GROUP_KEY_INFO,
        &mut out,
    )?;
    Ok(out)
}

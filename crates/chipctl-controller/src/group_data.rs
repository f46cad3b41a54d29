//! Group keys and group membership per fabric.

use chipctl_core::{ChipError, CompressedFabricId, FabricIndex, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::crypto::{self, GroupKey};
use crate::storage::SharedStorage;

/// Identity protection key epoch key used when none is provisioned
pub const DEFAULT_IPK: GroupKey = *b"temporary ipk 01";

/// Keyset id reserved for the IPK
pub const IPK_KEYSET_ID: u16 = 0;

const STORAGE_KEY: &str = "GroupData";

const TEST_GROUPS: [(u16, &str, u16); 3] = [
    (0x0101, "Group #1", 0x01a1),
    (0x0102, "Group #2", 0x01a2),
    (0x0103, "Group #3", 0x01a2),
];

const TEST_KEYSETS: [(u16, [GroupKey; 3]); 2] = [
    (
        0x01a1,
        [
            [0xa0, 0xa1, 0xa2, 0xa3, 0xa4, 0xa5, 0xa6, 0xa7, 0xa8, 0xa9, 0xaa, 0xab, 0xac, 0xad, 0xae, 0xaf],
            [0xb0, 0xb1, 0xb2, 0xb3, 0xb4, 0xb5, 0xb6, 0xb7, 0xb8, 0xb9, 0xba, 0xbb, 0xbc, 0xbd, 0xbe, 0xbf],
            [0xc0, 0xc1, 0xc2, 0xc3, 0xc4, 0xc5, 0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xcb, 0xcc, 0xcd, 0xce, 0xcf],
        ],
    ),
    (
        0x01a2,
        [
            [0xd0, 0xd1, 0xd2, 0xd3, 0xd4, 0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda, 0xdb, 0xdc, 0xdd, 0xde, 0xdf],
            [0xe0, 0xe1, 0xe2, 0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9, 0xea, 0xeb, 0xec, 0xed, 0xee, 0xef],
            [0xf0, 0xf1, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8, 0xf9, 0xfa, 0xfb, 0xfc, 0xfd, 0xfe, 0xff],
        ],
    ),
];

/// How a keyset's epoch keys are rotated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityPolicy {
    /// Devices use the newest key they know about
    TrustFirst,
    /// Devices wait for a synchronized rotation
    CacheAndSync,
}

/// One epoch key with its derived operational key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochKey {
    /// Start time in microseconds since the epoch
    pub start_time: u64,
    /// Raw epoch key
    pub key: GroupKey,
    /// Key derived for the keyset's fabric
    pub operational_key: GroupKey,
}

/// A group keyset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySet {
    /// Keyset id, unique per fabric
    pub keyset_id: u16,
    /// Rotation policy
    pub policy: SecurityPolicy,
    /// Up to three epoch keys, oldest first
    pub epoch_keys: Vec<EpochKey>,
}

impl KeySet {
    /// Build a keyset whose operational keys are derived for a fabric
    pub fn derive(
        keyset_id: u16,
        policy: SecurityPolicy,
        epoch_keys: &[(u64, GroupKey)],
        compressed_fabric_id: CompressedFabricId,
    ) -> Result<Self> {
        if epoch_keys.is_empty() || epoch_keys.len() > 3 {
            return Err(ChipError::InvalidArgument(format!(
                "keyset {keyset_id:#06x} needs 1 to 3 epoch keys, got {}",
                epoch_keys.len()
            )));
        }
        let epoch_keys = epoch_keys
            .iter()
            .map(|(start_time, key)| {
                Ok(EpochKey {
                    start_time: *start_time,
                    key: *key,
                    operational_key: crypto::operational_group_key(key, compressed_fabric_id)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            keyset_id,
            policy,
            epoch_keys,
        })
    }
}

/// Group name entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    /// Group id
    pub group_id: u16,
    /// Display name
    pub name: String,
}

/// Association of a group with the keyset securing it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupKeyMapping {
    /// Group id
    pub group_id: u16,
    /// Keyset id
    pub keyset_id: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct FabricGroupData {
    keysets: BTreeMap<u16, KeySet>,
    groups: BTreeMap<u16, GroupInfo>,
    key_map: Vec<GroupKeyMapping>,
}

/// Group data for every fabric of the process
#[derive(Debug, Default)]
pub struct GroupDataProvider {
    storage: Option<SharedStorage>,
    fabrics: BTreeMap<u8, FabricGroupData>,
    initialized: bool,
}

impl GroupDataProvider {
    /// Create an empty provider with no storage attached
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the namespace group data is persisted into
    pub fn set_storage_delegate(&mut self, storage: SharedStorage) {
        self.storage = Some(storage);
    }

    /// Load persisted group data; requires a storage delegate
    pub fn init(&mut self) -> Result<()> {
        let storage = self
            .storage
            .as_ref()
            .ok_or_else(|| ChipError::Internal("group data provider has no storage".into()))?;

        self.fabrics = match storage.borrow().get(STORAGE_KEY) {
            Some(raw) => serde_json::from_str(raw)
                .map_err(|e| ChipError::Storage(format!("corrupt {STORAGE_KEY}: {e}")))?,
            None => BTreeMap::new(),
        };
        self.initialized = true;
        debug!(fabrics = self.fabrics.len(), "group data provider initialized");
        Ok(())
    }

    /// Returns true once `init` has succeeded
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn persist(&self) -> Result<()> {
        let Some(storage) = self.storage.as_ref() else {
            return Ok(());
        };
        let raw = serde_json::to_string(&self.fabrics)?;
        storage.borrow_mut().set(STORAGE_KEY, raw)
    }

    fn fabric_mut(&mut self, fabric_index: FabricIndex) -> Result<&mut FabricGroupData> {
        if !self.initialized {
            return Err(ChipError::Internal("group data provider not initialized".into()));
        }
        Ok(self.fabrics.entry(fabric_index.get()).or_default())
    }

    /// Store or replace a keyset
    pub fn set_keyset(&mut self, fabric_index: FabricIndex, keyset: KeySet) -> Result<()> {
        self.fabric_mut(fabric_index)?
            .keysets
            .insert(keyset.keyset_id, keyset);
        self.persist()
    }

    /// Look up a keyset
    #[must_use]
    pub fn keyset(&self, fabric_index: FabricIndex, keyset_id: u16) -> Option<&KeySet> {
        self.fabrics
            .get(&fabric_index.get())
            .and_then(|f| f.keysets.get(&keyset_id))
    }

    /// Store or rename a group
    pub fn set_group_info(&mut self, fabric_index: FabricIndex, info: GroupInfo) -> Result<()> {
        self.fabric_mut(fabric_index)?
            .groups
            .insert(info.group_id, info);
        self.persist()
    }

    /// Map a group to a keyset, replacing any previous mapping of the group
    pub fn set_group_key_map(
        &mut self,
        fabric_index: FabricIndex,
        mapping: GroupKeyMapping,
    ) -> Result<()> {
        let fabric = self.fabric_mut(fabric_index)?;
        fabric.key_map.retain(|m| m.group_id != mapping.group_id);
        fabric.key_map.push(mapping);
        self.persist()
    }

    /// Groups of a fabric in id order
    #[must_use]
    pub fn groups(&self, fabric_index: FabricIndex) -> Vec<&GroupInfo> {
        self.fabrics
            .get(&fabric_index.get())
            .map(|f| f.groups.values().collect())
            .unwrap_or_default()
    }

    /// Keyset securing a group
    #[must_use]
    pub fn keyset_for_group(&self, fabric_index: FabricIndex, group_id: u16) -> Option<u16> {
        self.fabrics.get(&fabric_index.get()).and_then(|f| {
            f.key_map
                .iter()
                .find(|m| m.group_id == group_id)
                .map(|m| m.keyset_id)
        })
    }

    /// Drop everything stored for a fabric
    pub fn remove_fabric(&mut self, fabric_index: FabricIndex) -> Result<()> {
        if self.fabrics.remove(&fabric_index.get()).is_some() {
            self.persist()?;
        }
        Ok(())
    }

    /// Program the IPK keyset with a single epoch key
    pub fn set_single_ipk_epoch_key(
        &mut self,
        fabric_index: FabricIndex,
        ipk: &GroupKey,
        compressed_fabric_id: CompressedFabricId,
    ) -> Result<()> {
        let keyset = KeySet::derive(
            IPK_KEYSET_ID,
            SecurityPolicy::TrustFirst,
            &[(0, *ipk)],
            compressed_fabric_id,
        )?;
        self.set_keyset(fabric_index, keyset)
    }

    /// Program the well-known test groups and keysets
    pub fn init_test_group_data(
        &mut self,
        fabric_index: FabricIndex,
        compressed_fabric_id: CompressedFabricId,
    ) -> Result<()> {
        for (keyset_id, keys) in TEST_KEYSETS {
            let epoch_keys: Vec<(u64, GroupKey)> = keys
                .iter()
                .enumerate()
                .map(|(i, key)| (i as u64 + 1, *key))
                .collect();
            let keyset = KeySet::derive(
                keyset_id,
                SecurityPolicy::TrustFirst,
                &epoch_keys,
                compressed_fabric_id,
            )?;
            self.set_keyset(fabric_index, keyset)?;
        }

        for (group_id, name, keyset_id) in TEST_GROUPS {
            self.set_group_info(
                fabric_index,
                GroupInfo {
                    group_id,
                    name: name.to_string(),
                },
            )?;
            self.set_group_key_map(fabric_index, GroupKeyMapping { group_id, keyset_id })?;
        }

        info!(
            fabric_index = %fabric_index,
            compressed_fabric_id = %compressed_fabric_id,
            groups = TEST_GROUPS.len(),
            "initialized test group data"
        );
        Ok(())
    }
}

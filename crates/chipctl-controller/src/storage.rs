//! File-backed key/value storage namespaces.
//!
//! One namespace holds the fabric-independent defaults
//! (`chipctl_config.toml`); every named identity gets its own namespace
//! (`chipctl_config.<name>.toml`), created on first use. Namespaces are never
//! shared between identities.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chipctl_core::{CaseAuthTag, ChipError, NodeId, Result};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::debug;

const FILE_PREFIX: &str = "chipctl_config";
const FILE_EXTENSION: &str = "toml";

/// Key holding the local node id of an identity
pub const LOCAL_NODE_ID_KEY: &str = "LocalNodeId";
/// Key holding the commissioner CASE authenticated tags
pub const COMMISSIONER_CATS_KEY: &str = "CommissionerCATs";
/// Key holding the operational listen port
pub const LISTEN_PORT_KEY: &str = "ListenPort";
/// Key holding the default logging level
pub const LOGGING_LEVEL_KEY: &str = "LoggingLevel";

/// Namespace shared by the collaborators living on the protocol thread
pub type SharedStorage = Rc<RefCell<PersistentStorage>>;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StorageFile {
    #[serde(default)]
    entries: BTreeMap<String, String>,
}

/// Logging level recorded in the fabric-independent namespace
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoggingLevel {
    /// Nothing
    None,
    /// Errors only
    Error,
    /// Progress messages
    #[default]
    Progress,
    /// Detailed messages
    Detail,
    /// Everything, including automation traces
    Automation,
}

impl LoggingLevel {
    /// Equivalent `tracing` filter directive
    #[must_use]
    pub const fn as_filter(self) -> &'static str {
        match self {
            Self::None => "off",
            Self::Error => "error",
            Self::Progress => "info",
            Self::Detail => "debug",
            Self::Automation => "trace",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Some(Self::None),
            "error" => Some(Self::Error),
            "progress" => Some(Self::Progress),
            "detail" => Some(Self::Detail),
            "automation" => Some(Self::Automation),
            _ => None,
        }
    }
}

/// One key/value namespace backed by a TOML file
#[derive(Debug)]
pub struct PersistentStorage {
    name: Option<String>,
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl PersistentStorage {
    /// Directory used when none is configured
    #[must_use]
    pub fn directory_for(dir: Option<&Path>) -> PathBuf {
        dir.map_or_else(std::env::temp_dir, Path::to_path_buf)
    }

    fn file_name(name: Option<&str>) -> String {
        name.map_or_else(
            || format!("{FILE_PREFIX}.{FILE_EXTENSION}"),
            |name| format!("{FILE_PREFIX}.{name}.{FILE_EXTENSION}"),
        )
    }

    /// Open (or lazily create) a namespace.
    ///
    /// `name == None` is the fabric-independent namespace. Nothing is written
    /// to disk until the first mutation.
    pub fn open(dir: Option<&Path>, name: Option<&str>) -> Result<Self> {
        let dir = Self::directory_for(dir);
        let path = dir.join(Self::file_name(name));

        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let file: StorageFile = toml::from_str(&content)
                .map_err(|e| ChipError::Storage(format!("{}: {e}", path.display())))?;
            file.entries
        } else {
            BTreeMap::new()
        };

        debug!(path = %path.display(), keys = entries.len(), "opened storage namespace");

        Ok(Self {
            name: name.map(String::from),
            path,
            entries,
        })
    }

    /// Identity name of this namespace, `None` for the fabric-independent one
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a string value
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Read a binary value
    pub fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.get(key)
            .map(|v| {
                BASE64
                    .decode(v)
                    .map_err(|e| ChipError::Storage(format!("corrupt value for {key}: {e}")))
            })
            .transpose()
    }

    /// Write a string value and sync
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Result<()> {
        self.entries.insert(key.to_string(), value.into());
        self.sync()
    }

    /// Write a binary value and sync
    pub fn set_bytes(&mut self, key: &str, value: &[u8]) -> Result<()> {
        self.set(key, BASE64.encode(value))
    }

    /// Remove a key; removing a missing key is not an error
    pub fn delete(&mut self, key: &str) -> Result<()> {
        if self.entries.remove(key).is_some() {
            self.sync()?;
        }
        Ok(())
    }

    /// Returns true if `key` is present
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// All keys in order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Remove every key of this namespace
    pub fn clear_all(&mut self) -> Result<()> {
        self.entries.clear();
        self.sync()
    }

    /// Write the namespace to disk atomically
    pub fn sync(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = StorageFile {
            entries: self.entries.clone(),
        };
        let content = toml::to_string_pretty(&file)?;
        let tmp = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Local node id of this identity, recorded on first access
    pub fn local_node_id(&mut self) -> Result<NodeId> {
        if let Some(raw) = self.get(LOCAL_NODE_ID_KEY) {
            let id = raw
                .parse::<u64>()
                .map_err(|e| ChipError::Storage(format!("corrupt {LOCAL_NODE_ID_KEY}: {e}")))?;
            return Ok(NodeId::new(id));
        }

        let id = NodeId::DEFAULT_LOCAL;
        self.set_local_node_id(id)?;
        Ok(id)
    }

    /// Record the local node id
    pub fn set_local_node_id(&mut self, id: NodeId) -> Result<()> {
        self.set(LOCAL_NODE_ID_KEY, id.get().to_string())
    }

    /// CASE authenticated tags to embed in the commissioner NOC
    pub fn commissioner_cats(&self) -> Result<Vec<CaseAuthTag>> {
        let Some(raw) = self.get(COMMISSIONER_CATS_KEY) else {
            return Ok(Vec::new());
        };
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                u32::from_str_radix(s.trim_start_matches("0x"), 16)
                    .map_err(|e| ChipError::Storage(format!("corrupt CAT {s}: {e}")))
            })
            .collect()
    }

    /// Operational listen port, 0 when unset
    #[must_use]
    pub fn listen_port(&self) -> u16 {
        self.get(LISTEN_PORT_KEY)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    /// Default logging level
    #[must_use]
    pub fn logging_level(&self) -> LoggingLevel {
        self.get(LOGGING_LEVEL_KEY)
            .and_then(LoggingLevel::parse)
            .unwrap_or_default()
    }

    /// Delete every namespace file in `dir`, returning how many were removed
    pub fn remove_all_namespaces(dir: Option<&Path>) -> Result<usize> {
        let dir = Self::directory_for(dir);
        if !dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let is_namespace = file_name.starts_with(FILE_PREFIX)
                && path.extension().and_then(|e| e.to_str()) == Some(FILE_EXTENSION);
            if is_namespace && path.is_file() {
                std::fs::remove_file(&path)?;
                debug!(path = %path.display(), "removed storage namespace");
                removed += 1;
            }
        }
        Ok(removed)
    }
}

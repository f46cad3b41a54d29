//! Configuration management.

use anyhow::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::output::OutputFormat;

/// CLI configuration.
///
/// Every field is a default that the matching command-line flag (or its
/// environment variable) overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the storage namespaces.
    pub storage_directory: Option<String>,

    /// Directory of trusted PAA certificates.
    pub paa_trust_store_path: Option<String>,

    /// Directory of additional CD verifying certificates.
    pub cd_trust_store_path: Option<String>,

    /// Identity used when `--identity` is not given.
    pub identity: Option<String>,

    /// Commissioner vendor id.
    pub vendor_id: Option<u16>,

    /// Trace destinations added to every invocation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trace_to: Vec<String>,

    /// Default output format.
    pub output_format: Option<OutputFormat>,
}

impl Config {
    /// Get the config file path.
    pub fn path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("io", "chipctl", "chipctl")
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Load configuration from file.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path()?)
    }

    /// Load configuration from an explicit file; a missing file is the default config.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;

        Ok(config)
    }

    /// Save configuration to file.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path()?)
    }

    /// Save configuration to an explicit file.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Set one key from its string form.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "storage_directory" | "storage-directory" => {
                self.storage_directory = Some(value.to_string());
            }
            "paa_trust_store_path" | "paa-trust-store-path" => {
                self.paa_trust_store_path = Some(value.to_string());
            }
            "cd_trust_store_path" | "cd-trust-store-path" => {
                self.cd_trust_store_path = Some(value.to_string());
            }
            "identity" => {
                chipctl::identity::normalize(value)?;
                self.identity = Some(value.to_string());
            }
            "vendor_id" | "vendor-id" => {
                self.vendor_id = Some(chipctl::parse_id(value)?);
            }
            "trace_to" | "trace-to" => {
                self.trace_to = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect();
            }
            "output_format" | "output" => {
                self.output_format = Some(value.parse()?);
            }
            _ => {
                anyhow::bail!(
                    "Unknown config key: {}\n\n\
                     Available keys:\n  \
                     storage_directory     - Directory for storage namespaces\n  \
                     paa_trust_store_path  - Directory of trusted PAA certificates\n  \
                     cd_trust_store_path   - Directory of CD verifying certificates\n  \
                     identity              - Default identity (alpha, beta, gamma, 4...)\n  \
                     vendor_id             - Commissioner vendor id\n  \
                     trace_to              - Comma-separated trace destinations\n  \
                     output_format         - Default output format (pretty/json/yaml)",
                    key
                );
            }
        }
        Ok(())
    }
}

/// Expand `~` and environment variables in a configured path.
pub fn expand_path(raw: &str) -> Result<PathBuf> {
    Ok(PathBuf::from(shellexpand::full(raw)?.into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_set_save_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.set("identity", "beta").unwrap();
        config.set("vendor_id", "0xFFF2").unwrap();
        config.set("trace_to", "log, json:/tmp/t.jsonl").unwrap();
        config.set("output", "json").unwrap();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.identity.as_deref(), Some("beta"));
        assert_eq!(loaded.vendor_id, Some(0xFFF2));
        assert_eq!(loaded.trace_to, ["log", "json:/tmp/t.jsonl"]);
        assert_eq!(loaded.output_format, Some(OutputFormat::Json));
    }

    #[test]
    fn test_set_rejects_bad_identity_and_key() {
        let mut config = Config::default();
        assert!(config.set("identity", "2").is_err());
        assert!(config.set("identity", "delta").is_err());
        assert!(config.set("api_key", "x").is_err());
        assert_eq!(config, Config::default());
    }
}

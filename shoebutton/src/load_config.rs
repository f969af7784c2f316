//! Loads the static YAML sync configuration into typed sections.
//!
//! This is the only place untrusted YAML is parsed; everything downstream
//! works with the typed [`SyncConfig`] from the core crate. Secrets are
//! never read from the file; the service-account key stays in its own
//! file, referenced here by path.
//!
//! Accepted schema:
//!
//! ```yaml
//! storage:
//!   service_account_file: ./service_account.json
//!   bucket: shoebutton-molds
//!   prefix: cults_files/        # optional
//! sync:
//!   csv_path: ./catalog.csv
//!   destination: ./downloads
//!   max_objects: 1000           # optional
//!   max_concurrency: 8          # optional
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Deserialize;
use tracing::{error, info};

use shoebutton_core::synchronise::SyncConfig;
use shoebutton_core::transfer::DownloadLimits;

#[derive(Debug, Deserialize)]
pub struct CliConfig {
    pub storage: StorageSection,
    pub sync: SyncSection,
}

#[derive(Debug, Deserialize)]
pub struct StorageSection {
    pub service_account_file: PathBuf,
    pub bucket: String,
    #[serde(default)]
    pub prefix: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SyncSection {
    pub csv_path: PathBuf,
    pub destination: PathBuf,
    #[serde(default)]
    pub max_objects: Option<usize>,
    #[serde(default)]
    pub max_concurrency: Option<usize>,
}

impl CliConfig {
    /// Build the core sync configuration, filling unset bounds with the
    /// pipeline defaults.
    pub fn to_sync_config(&self) -> SyncConfig {
        let defaults = DownloadLimits::default();
        SyncConfig {
            bucket: self.storage.bucket.clone(),
            prefix: self.storage.prefix.clone(),
            csv_path: self.sync.csv_path.clone(),
            destination: self.sync.destination.clone(),
            limits: DownloadLimits {
                max_objects: self.sync.max_objects.unwrap_or(defaults.max_objects),
                max_concurrency: self.sync.max_concurrency.unwrap_or(defaults.max_concurrency),
            },
        }
    }
}

/// Load and parse the YAML config file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let config: CliConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp config file");
        file.write_all(content.as_bytes()).expect("write config");
        file
    }

    #[test]
    fn full_config_parses_with_explicit_limits() {
        let file = write_config(
            "storage:\n  service_account_file: ./sa.json\n  bucket: molds\n  prefix: cults_files/\nsync:\n  csv_path: ./catalog.csv\n  destination: ./downloads\n  max_objects: 50\n  max_concurrency: 4\n",
        );
        let config = load_config(file.path()).expect("config should load");
        let sync = config.to_sync_config();
        assert_eq!(sync.bucket, "molds");
        assert_eq!(sync.prefix.as_deref(), Some("cults_files/"));
        assert_eq!(sync.limits.max_objects, 50);
        assert_eq!(sync.limits.max_concurrency, 4);
    }

    #[test]
    fn unset_limits_fall_back_to_the_defaults() {
        let file = write_config(
            "storage:\n  service_account_file: ./sa.json\n  bucket: molds\nsync:\n  csv_path: ./catalog.csv\n  destination: ./downloads\n",
        );
        let config = load_config(file.path()).expect("config should load");
        let sync = config.to_sync_config();
        assert_eq!(sync.prefix, None);
        assert_eq!(sync.limits.max_objects, 1000);
        assert_eq!(sync.limits.max_concurrency, 8);
    }

    #[test]
    fn missing_file_is_a_readable_error() {
        let err = load_config("/does/not/exist.yaml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let file = write_config("storage: [not, a, mapping\n");
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config YAML"));
    }
}

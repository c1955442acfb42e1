use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::network::{Network, NetworkConfig, get_network_configs, is_http_url};

/// Storefront tooling configuration stored at `~/.mapofcrypto/config.json`.
///
/// Nothing secret lives here: signing identities are the node's unlocked
/// accounts, so only their public addresses are configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MocConfig {
    // Network
    pub network: Network,
    /// Overrides the network's default RPC endpoint.
    pub rpc_url: Option<String>,
    /// Address of the deployer / buyer identity. `None` picks the node's
    /// first account.
    pub deployer: Option<String>,

    // Transaction lifecycle
    pub receipt_timeout_secs: u64,
    pub poll_interval_ms: u64,

    // Paths
    pub deployments_dir: Option<PathBuf>,
    pub artifacts_dir: Option<PathBuf>,

    // General
    pub log_level: String,
}

impl Default for MocConfig {
    fn default() -> Self {
        Self {
            network: Network::Localhost,
            rpc_url: None,
            deployer: None,
            receipt_timeout_secs: 120,
            poll_interval_ms: 1_000,
            deployments_dir: None,
            artifacts_dir: None,
            log_level: "info".into(),
        }
    }
}

impl MocConfig {
    /// Returns the base config directory: `~/.mapofcrypto/`
    pub fn base_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".mapofcrypto"))
    }

    /// Returns the config file path: `~/.mapofcrypto/config.json`
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join("config.json"))
    }

    /// Returns the logs directory: `~/.mapofcrypto/logs/`
    pub fn logs_dir() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join("logs"))
    }

    /// Directory holding the per-network name→address tables. Falls back to
    /// `~/.mapofcrypto/deployments/` when not configured.
    pub fn deployments_dir(&self) -> Result<PathBuf> {
        match &self.deployments_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::base_dir()?.join("deployments")),
        }
    }

    /// Endpoint details for the selected network, with `rpc_url` replacing
    /// the built-in endpoint when set.
    pub fn network_config(&self) -> Result<NetworkConfig> {
        let mut config = get_network_configs()
            .remove(&self.network)
            .with_context(|| format!("No configuration for network {}", self.network))?;
        if let Some(url) = &self.rpc_url {
            if !is_http_url(url) {
                bail!("Invalid RPC URL for {}: {url}", self.network);
            }
            config.rpc_url = url.clone();
        }
        Ok(config)
    }

    /// Client-side bound on how long a transaction may stay unmined.
    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Ensures the base and logs directories exist.
    pub fn ensure_dirs() -> Result<()> {
        let dirs = [Self::base_dir()?, Self::logs_dir()?];
        for dir in &dirs {
            if !dir.exists() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
            }
        }
        Ok(())
    }

    /// Loads config from disk, or creates the default file if missing.
    pub fn load() -> Result<Self> {
        Self::ensure_dirs()?;
        let path = Self::config_path()?;
        Self::load_from_path(&path)
    }

    /// Load config from a specific file path, writing defaults if it is missing.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            let config: Self = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            info!("Loaded config from {}", path.display());
            Ok(config)
        } else {
            let config = Self::default();
            config.save_to_path(path)?;
            info!("Created default config at {}", path.display());
            Ok(config)
        }
    }

    /// Load config from a file, or return defaults if it is missing or corrupt.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(data) => match serde_json::from_str::<MocConfig>(&data) {
                    Ok(config) => return config,
                    Err(e) => warn!("Corrupt config file, using defaults: {e}"),
                },
                Err(e) => warn!("Cannot read config file, using defaults: {e}"),
            }
        }
        Self::default()
    }

    /// Saves config to `~/.mapofcrypto/config.json`.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        self.save_to_path(&path)
    }

    /// Save config to a specific file path, creating parent directories.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_local_node() {
        let config = MocConfig::default();
        assert_eq!(config.network, Network::Localhost);
        assert_eq!(config.receipt_timeout(), Duration::from_secs(120));
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert!(config.deployer.is_none());
    }

    #[test]
    fn network_config_applies_rpc_override() {
        let default = MocConfig {
            network: Network::Kovan,
            ..MocConfig::default()
        };
        assert_eq!(default.network_config().unwrap().rpc_url, "https://kovan.poa.network");

        let custom = MocConfig {
            network: Network::Kovan,
            rpc_url: Some("https://kovan.example.com".into()),
            ..MocConfig::default()
        };
        let resolved = custom.network_config().unwrap();
        assert_eq!(resolved.rpc_url, "https://kovan.example.com");
        assert_eq!(resolved.chain_id, 42);
        assert_eq!(
            resolved.explorer_url.as_deref(),
            Some("https://kovan.etherscan.io")
        );
    }

    #[test]
    fn network_config_rejects_bad_rpc_url() {
        let config = MocConfig {
            rpc_url: Some("ws://127.0.0.1:8546".into()),
            ..MocConfig::default()
        };
        assert!(config.network_config().is_err());
    }

    #[test]
    fn poll_interval_never_zero() {
        let config = MocConfig {
            poll_interval_ms: 0,
            ..MocConfig::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_millis(1));
    }

    #[test]
    fn load_from_path_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = MocConfig::load_from_path(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = MocConfig {
            network: Network::Kovan,
            deployer: Some("0xa36085F69e2889c224210F603D836748e7dC0088".into()),
            receipt_timeout_secs: 30,
            ..MocConfig::default()
        };
        config.save_to_path(&path).unwrap();

        let loaded = MocConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded.network, Network::Kovan);
        assert_eq!(loaded.receipt_timeout_secs, 30);
        assert_eq!(loaded.deployer, config.deployer);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "network": "memory" }"#).unwrap();

        let loaded = MocConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded.network, Network::Memory);
        assert_eq!(loaded.poll_interval_ms, 1_000);
    }

    #[test]
    fn load_or_default_tolerates_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let config = MocConfig::load_or_default(&path);
        assert_eq!(config.network, Network::Localhost);
        assert!(MocConfig::load_from_path(&path).is_err());
    }

    #[test]
    fn deployments_dir_prefers_configured_path() {
        let config = MocConfig {
            deployments_dir: Some(PathBuf::from("/tmp/deployments")),
            ..MocConfig::default()
        };
        assert_eq!(
            config.deployments_dir().unwrap(),
            PathBuf::from("/tmp/deployments")
        );
    }
}

//! Name → address table written after a successful deployment run and read
//! back by later runs that attach instead of redeploying.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use alloy_primitives::{Address, B256};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use moc_core::Network;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::binding::BoundContract;
use crate::descriptor::{ContractDescriptor, InterfaceShape};
use crate::registry::DescriptorRegistry;
use crate::signer::SignerIdentity;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    /// Contract kind the step deployed.
    pub contract: String,
    pub address: Address,
    pub tx_hash: Option<B256>,
    pub bytecode_hash: B256,
    /// keccak256 of the ABI-encoded constructor arguments. Records written
    /// without it never match, so those steps are redeployed.
    #[serde(default)]
    pub constructor_args_hash: Option<B256>,
    #[serde(default)]
    pub interface: InterfaceShape,
    pub deployed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecords {
    #[serde(flatten)]
    records: BTreeMap<String, DeploymentRecord>,
}

impl DeploymentRecords {
    pub fn new() -> Self {
        Self::default()
    }

    /// `<dir>/<network>.json`
    pub fn path_for(dir: &Path, network: Network) -> PathBuf {
        dir.join(format!("{}.json", network.slug()))
    }

    /// Load records from `path`. A missing file is an empty table.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no deployment records yet");
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read deployments at {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse deployments at {}", path.display()))
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize deployments")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write deployments to {}", path.display()))?;
        info!(path = %path.display(), count = self.records.len(), "deployment records saved");
        Ok(())
    }

    pub fn insert(&mut self, name: impl Into<String>, record: DeploymentRecord) {
        self.records.insert(name.into(), record);
    }

    pub fn get(&self, name: &str) -> Option<&DeploymentRecord> {
        self.records.get(name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DeploymentRecord)> {
        self.records.iter().map(|(name, record)| (name.as_str(), record))
    }

    /// Step name → address, in name order.
    pub fn addresses(&self) -> Vec<(String, Address)> {
        self.records
            .iter()
            .map(|(name, record)| (name.clone(), record.address))
            .collect()
    }

    /// Rebuild a handle for the recorded step `name`. The registry's
    /// descriptor is used when it knows the contract kind; otherwise the
    /// recorded interface is enough to call methods.
    pub fn attach(
        &self,
        name: &str,
        registry: &DescriptorRegistry,
        signer: SignerIdentity,
    ) -> Option<BoundContract> {
        let record = self.records.get(name)?;
        let descriptor = registry.get(&record.contract).unwrap_or_else(|| {
            Arc::new(ContractDescriptor::interface_only(
                record.contract.clone(),
                record.interface.clone(),
            ))
        });
        Some(BoundContract::attached(descriptor, record.address, signer))
    }
}

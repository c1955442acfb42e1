//! Wiring shared by every subcommand: config, registry, ledger, submitter.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use alloy_primitives::Address;
use anyhow::{Context, Result, bail};
use moc_contracts::{
    BindingFactory, DeploymentRecords, DescriptorRegistry, JsonRpcLedger, LedgerRpc,
    MemoryLedger, NodeAccountSigner, SignerIdentity, SubmitterConfig,
    TransactionSubmitter,
};
use moc_core::{MocConfig, Network, NetworkConfig};
use tracing::{info, warn};

/// Hardhat's default artifacts location, used when none is configured.
const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";

pub struct AppContext {
    pub config: MocConfig,
    pub network: NetworkConfig,
    pub submitter: Arc<TransactionSubmitter>,
    pub identity: SignerIdentity,
}

impl AppContext {
    pub async fn connect(config: MocConfig) -> Result<Self> {
        let network = config.network_config()?;
        install_registry(config.artifacts_dir.as_deref())?;

        let ledger: Arc<dyn LedgerRpc> = match config.network {
            Network::Memory => {
                info!("Using in-process memory ledger");
                Arc::new(MemoryLedger::new())
            }
            remote => {
                let custom = config.rpc_url.is_some();
                info!(network = %remote, url = %network.rpc_url, custom, "Using JSON-RPC ledger");
                Arc::new(JsonRpcLedger::new(network.rpc_url.clone()))
            }
        };

        let chain_id = ledger
            .chain_id()
            .await
            .context("Failed to reach the ledger")?;
        if config.network.is_remote() && chain_id != config.network.chain_id() {
            warn!(
                expected = config.network.chain_id(),
                actual = chain_id,
                "Node reports a different chain id than {}",
                config.network
            );
        }

        let signer = NodeAccountSigner::from_ledger(ledger.as_ref())
            .await
            .context("Failed to list node accounts")?;
        let identity = pick_identity(&config, &ledger.accounts().await?)?;
        if !signer.holds(&identity.address) {
            warn!(address = %identity.address, "Identity is not unlocked on the node; signing will be denied");
        }

        let submitter = Arc::new(TransactionSubmitter::new(
            Arc::clone(&ledger),
            Arc::new(signer),
            SubmitterConfig::from_config(&config, chain_id),
        ));

        Ok(Self {
            config,
            network,
            submitter,
            identity,
        })
    }

    /// Descriptors installed by [`AppContext::connect`].
    pub fn registry(&self) -> &'static DescriptorRegistry {
        DescriptorRegistry::global()
    }

    pub fn factory(&self) -> BindingFactory {
        BindingFactory::new(Arc::clone(&self.submitter))
    }

    /// The per-network records file, or `None` for the memory ledger whose
    /// deployments do not outlive the process.
    pub fn records_path(&self) -> Result<Option<PathBuf>> {
        if !self.config.network.is_remote() {
            return Ok(None);
        }
        Ok(Some(DeploymentRecords::path_for(
            &self.config.deployments_dir()?,
            self.config.network,
        )))
    }

    pub fn records(&self) -> Result<DeploymentRecords> {
        match self.records_path()? {
            Some(path) => DeploymentRecords::load_from_file(&path),
            None => Ok(DeploymentRecords::new()),
        }
    }
}

fn install_registry(artifacts_dir: Option<&Path>) -> Result<()> {
    let mut registry = DescriptorRegistry::with_builtins()?;
    match artifacts_dir {
        Some(dir) => {
            registry.load_artifacts_dir(dir)?;
        }
        None => {
            let dir = Path::new(DEFAULT_ARTIFACTS_DIR);
            if dir.is_dir() {
                registry.load_artifacts_dir(dir)?;
            }
        }
    }
    registry.install()?;
    Ok(())
}

fn pick_identity(config: &MocConfig, node_accounts: &[Address]) -> Result<SignerIdentity> {
    match &config.deployer {
        Some(raw) => {
            let address: Address = raw
                .parse()
                .with_context(|| format!("Invalid deployer address: {raw}"))?;
            Ok(SignerIdentity::named(address, "deployer"))
        }
        None => match node_accounts.first() {
            Some(address) => Ok(SignerIdentity::named(*address, "deployer")),
            None => bail!("The node exposes no accounts; set a deployer address with --from"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_deployer_wins() {
        let config = MocConfig {
            deployer: Some("0x70997970c51812dc3a010c7d01b50e0d17dc79c8".into()),
            ..MocConfig::default()
        };
        let identity = pick_identity(&config, &[Address::repeat_byte(1)]).unwrap();
        assert_eq!(
            identity.address,
            "0x70997970c51812dc3a010c7d01b50e0d17dc79c8"
                .parse::<Address>()
                .unwrap()
        );
    }

    #[test]
    fn falls_back_to_first_node_account() {
        let identity = pick_identity(&MocConfig::default(), &[Address::repeat_byte(7)]).unwrap();
        assert_eq!(identity.address, Address::repeat_byte(7));
        assert!(pick_identity(&MocConfig::default(), &[]).is_err());
    }

    #[test]
    fn bad_deployer_is_an_error() {
        let config = MocConfig {
            deployer: Some("nope".into()),
            ..MocConfig::default()
        };
        assert!(pick_identity(&config, &[]).is_err());
    }
}

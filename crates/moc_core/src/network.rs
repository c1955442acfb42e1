use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Networks the storefront can deploy to and transact on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// A local dev node (Hardhat / Anvil) with unlocked named accounts.
    Localhost,
    Kovan,
    Mainnet,
    /// In-process ledger, nothing leaves the process.
    Memory,
}

impl Network {
    pub const ALL: [Network; 4] = [
        Network::Localhost,
        Network::Kovan,
        Network::Mainnet,
        Network::Memory,
    ];

    /// Human-readable label for the network.
    pub fn label(&self) -> &'static str {
        match self {
            Network::Localhost => "Localhost",
            Network::Kovan => "Kovan Testnet",
            Network::Mainnet => "Ethereum Mainnet",
            Network::Memory => "In-memory",
        }
    }

    /// Short name used in file names and on the command line.
    pub fn slug(&self) -> &'static str {
        match self {
            Network::Localhost => "localhost",
            Network::Kovan => "kovan",
            Network::Mainnet => "mainnet",
            Network::Memory => "memory",
        }
    }

    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Localhost => 31337,
            Network::Kovan => 42,
            Network::Mainnet => 1,
            Network::Memory => 1337,
        }
    }

    /// Whether transactions on this network reach a remote node.
    pub fn is_remote(&self) -> bool {
        !matches!(self, Network::Memory)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Network::ALL
            .into_iter()
            .find(|n| n.slug().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown network: {s}"))
    }
}

/// Endpoint and explorer details for a network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub name: String,
    pub chain_id: u64,
    pub rpc_url: String,
    pub explorer_url: Option<String>,
}

impl NetworkConfig {
    /// Block-explorer link for a transaction, when the network has an explorer.
    pub fn tx_url(&self, tx_hash: &str) -> Option<String> {
        self.explorer_url
            .as_ref()
            .map(|base| format!("{}/tx/{tx_hash}", base.trim_end_matches('/')))
    }
}

/// Whether `url` is a well-formed HTTP(S) endpoint with a host.
pub fn is_http_url(url: &str) -> bool {
    match url::Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https") && parsed.host().is_some(),
        Err(_) => false,
    }
}

/// Returns default configurations for all supported networks.
pub fn get_network_configs() -> HashMap<Network, NetworkConfig> {
    let mut configs = HashMap::new();

    configs.insert(
        Network::Localhost,
        NetworkConfig {
            name: Network::Localhost.label().to_string(),
            chain_id: Network::Localhost.chain_id(),
            rpc_url: "http://127.0.0.1:8545".to_string(),
            explorer_url: None,
        },
    );

    configs.insert(
        Network::Kovan,
        NetworkConfig {
            name: Network::Kovan.label().to_string(),
            chain_id: Network::Kovan.chain_id(),
            rpc_url: "https://kovan.poa.network".to_string(),
            explorer_url: Some("https://kovan.etherscan.io".to_string()),
        },
    );

    configs.insert(
        Network::Mainnet,
        NetworkConfig {
            name: Network::Mainnet.label().to_string(),
            chain_id: Network::Mainnet.chain_id(),
            rpc_url: "https://eth.llamarpc.com".to_string(),
            explorer_url: Some("https://etherscan.io".to_string()),
        },
    );

    configs.insert(
        Network::Memory,
        NetworkConfig {
            name: Network::Memory.label().to_string(),
            chain_id: Network::Memory.chain_id(),
            rpc_url: "memory://".to_string(),
            explorer_url: None,
        },
    );

    configs
}

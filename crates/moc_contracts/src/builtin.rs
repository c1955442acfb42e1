//! Contract kinds compiled into the binary.
//!
//! `KeeperBase` ships with its creation bytecode. `MapOfCrypto` and
//! `Operator` ship interface-only; their bytecode comes from the compiled
//! artifacts directory at startup.

use serde_json::json;

use crate::descriptor::{ContractDescriptor, DescriptorError};

pub const KEEPER_BASE: &str = "KeeperBase";
pub const MAP_OF_CRYPTO: &str = "MapOfCrypto";
pub const OPERATOR: &str = "Operator";

const KEEPER_BASE_BYTECODE: &str = "0x6080604052348015600f57600080fd5b50603f80601d6000396000f3fe6080604052600080fdfea26469706673582212204e8c6e28760b10a697a616b38ddc583aabc96b0f41a72340f320241c8c87f19f64736f6c63430008070033";

pub fn keeper_base() -> Result<ContractDescriptor, DescriptorError> {
    let abi = json!([
        { "type": "error", "name": "OnlySimulatedBackend", "inputs": [] }
    ]);
    ContractDescriptor::new(KEEPER_BASE, &abi, KEEPER_BASE_BYTECODE)
}

/// The storefront contract: takes purchase requests and forwards them to an
/// oracle operator.
pub fn map_of_crypto() -> Result<ContractDescriptor, DescriptorError> {
    let abi = json!([
        {
            "type": "constructor",
            "inputs": [
                { "name": "_link", "type": "address" },
                { "name": "_oracle", "type": "address" },
                { "name": "_merchantJobId", "type": "string" },
                { "name": "_productJobId", "type": "string" }
            ],
            "stateMutability": "nonpayable"
        },
        {
            "type": "function",
            "name": "makePurchaseRequest",
            "inputs": [
                { "name": "merchantId", "type": "uint256" },
                { "name": "productId", "type": "uint256" }
            ],
            "outputs": [{ "name": "requestId", "type": "bytes32" }],
            "stateMutability": "nonpayable"
        },
        {
            "type": "function",
            "name": "owner",
            "inputs": [],
            "outputs": [{ "name": "", "type": "address" }],
            "stateMutability": "view"
        }
    ]);
    ContractDescriptor::new(MAP_OF_CRYPTO, &abi, "0x")
}

/// Oracle operator that fulfils the storefront's requests.
pub fn operator() -> Result<ContractDescriptor, DescriptorError> {
    let abi = json!([
        {
            "type": "constructor",
            "inputs": [
                { "name": "link", "type": "address" },
                { "name": "owner", "type": "address" }
            ],
            "stateMutability": "nonpayable"
        },
        {
            "type": "function",
            "name": "setAuthorizedSenders",
            "inputs": [{ "name": "senders", "type": "address[]" }],
            "outputs": [],
            "stateMutability": "nonpayable"
        },
        {
            "type": "function",
            "name": "getChainlinkToken",
            "inputs": [],
            "outputs": [{ "name": "", "type": "address" }],
            "stateMutability": "view"
        }
    ]);
    ContractDescriptor::new(OPERATOR, &abi, "0x")
}

/// All built-in descriptors.
pub fn all() -> Result<Vec<ContractDescriptor>, DescriptorError> {
    Ok(vec![keeper_base()?, map_of_crypto()?, operator()?])
}

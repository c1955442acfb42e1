//! Ethereum JSON-RPC ledger over HTTP.

use std::sync::atomic::{AtomicU64, Ordering};

use alloy_primitives::{Address, B256, Bytes, U256, hex};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{LedgerError, LedgerRpc, LogEntry, ReceiptStatus, SignedPayload, TxHash};
use crate::abi::decode_revert_reason;

// ---------------------------------------------------------------------------
// Wire types (private)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    data: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RpcTransaction {
    from: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    to: Option<Address>,
    data: Bytes,
    value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    gas: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    gas_price: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    status: Option<String>,
    contract_address: Option<Address>,
    block_number: Option<String>,
    gas_used: Option<String>,
    #[serde(default)]
    logs: Vec<RpcLog>,
}

#[derive(Debug, Deserialize)]
struct RpcLog {
    address: Address,
    #[serde(default)]
    topics: Vec<B256>,
    #[serde(default)]
    data: Bytes,
}

/// The subset of `eth_getTransactionByHash` needed to replay a call.
#[derive(Debug, Deserialize)]
struct RpcMinedTransaction {
    from: Address,
    to: Option<Address>,
    input: Bytes,
    value: Option<String>,
}

fn quantity(n: u64) -> String {
    format!("{n:#x}")
}

fn u256_quantity(n: U256) -> String {
    format!("0x{n:x}")
}

fn parse_quantity(raw: &str) -> Result<u64, LedgerError> {
    let digits = raw.trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16)
        .map_err(|e| LedgerError::InvalidResponse(format!("bad quantity `{raw}`: {e}")))
}

// ---------------------------------------------------------------------------
// Error classification
// ---------------------------------------------------------------------------

/// Revert data can sit directly in `error.data` (geth) or one level down in
/// `error.data.data` (Hardhat).
fn revert_data(data: &Value) -> Option<Vec<u8>> {
    match data {
        Value::String(s) => hex::decode(s.trim_start_matches("0x")).ok(),
        Value::Object(obj) => obj.get("data").and_then(revert_data),
        _ => None,
    }
}

/// Pull the quoted reason out of messages such as
/// `VM Exception while processing transaction: reverted with reason string 'x'`.
fn reason_from_message(message: &str) -> Option<String> {
    let start = message.find("reason string '")? + "reason string '".len();
    let rest = &message[start..];
    let end = rest.rfind('\'')?;
    Some(rest[..end].to_string())
}

/// Hardhat automine reports the hash of a transaction it mined and reverted
/// under `error.data.txHash`.
fn mined_tx_hash(data: &Value) -> Option<TxHash> {
    data.get("txHash")?.as_str()?.parse().ok()
}

fn classify_rpc_error(err: RpcErrorObject) -> LedgerError {
    let reason = err
        .data
        .as_ref()
        .and_then(revert_data)
        .and_then(|data| decode_revert_reason(&data))
        .or_else(|| reason_from_message(&err.message))
        .or_else(|| err.message.contains("revert").then(|| err.message.clone()));
    let Some(reason) = reason else {
        debug!(code = err.code, "rpc error: {}", err.message);
        return LedgerError::Rejected(err.message);
    };
    match err.data.as_ref().and_then(mined_tx_hash) {
        Some(tx) => LedgerError::MinedReverted { tx, reason },
        None => LedgerError::Reverted(reason),
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Ledger backed by an Ethereum node's JSON-RPC endpoint.
pub struct JsonRpcLedger {
    url: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl JsonRpcLedger {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Issue one JSON-RPC request. A `null` result comes back as `None`.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<T>, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LedgerError::Transport(format!(
                "{method} returned HTTP {}",
                response.status()
            )));
        }

        let parsed: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| LedgerError::InvalidResponse(format!("{method}: {e}")))?;

        match parsed.error {
            Some(err) => Err(classify_rpc_error(err)),
            None => Ok(parsed.result),
        }
    }

    async fn call_required<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, LedgerError> {
        self.call(method, params)
            .await?
            .ok_or_else(|| LedgerError::InvalidResponse(format!("{method}: missing result")))
    }

    /// Replay a reverted transaction with `eth_call` at its block to recover
    /// the revert reason. Receipts do not carry it.
    async fn revert_reason(&self, tx: TxHash, block: Option<&str>) -> String {
        const UNKNOWN: &str = "transaction reverted without a reason";

        let mined: Option<RpcMinedTransaction> =
            match self.call("eth_getTransactionByHash", json!([tx])).await {
                Ok(mined) => mined,
                Err(e) => {
                    warn!(tx = %tx, "cannot fetch reverted transaction: {e}");
                    return UNKNOWN.to_string();
                }
            };
        let Some(mined) = mined else {
            return UNKNOWN.to_string();
        };

        let call = json!({
            "from": mined.from,
            "to": mined.to,
            "data": mined.input,
            "value": mined.value.unwrap_or_else(|| "0x0".into()),
        });
        match self
            .call::<Bytes>("eth_call", json!([call, block.unwrap_or("latest")]))
            .await
        {
            Err(LedgerError::Reverted(reason)) => reason,
            Err(e) => {
                warn!(tx = %tx, "revert replay failed: {e}");
                UNKNOWN.to_string()
            }
            // State moved on since the block; the replay no longer reverts.
            Ok(_) => UNKNOWN.to_string(),
        }
    }
}

#[async_trait]
impl LedgerRpc for JsonRpcLedger {
    async fn submit_transaction(&self, payload: SignedPayload) -> Result<TxHash, LedgerError> {
        let intent = payload.intent;
        let tx = RpcTransaction {
            from: intent.from,
            to: intent.to,
            data: intent.data,
            value: u256_quantity(intent.value),
            nonce: intent.nonce.map(quantity),
            gas: intent.gas_limit.map(quantity),
            gas_price: intent.gas_price.map(|p| format!("{p:#x}")),
        };
        self.call_required("eth_sendTransaction", json!([tx])).await
    }

    async fn get_receipt(&self, tx: TxHash) -> Result<ReceiptStatus, LedgerError> {
        let receipt: Option<RpcReceipt> =
            self.call("eth_getTransactionReceipt", json!([tx])).await?;
        let Some(receipt) = receipt else {
            return Ok(ReceiptStatus::Pending);
        };
        // Mined-but-pending receipts (some nodes) have no block yet.
        if receipt.block_number.is_none() {
            return Ok(ReceiptStatus::Pending);
        }

        let succeeded = match receipt.status.as_deref() {
            Some(status) => parse_quantity(status)? == 1,
            // Pre-Byzantium receipts carry no status.
            None => true,
        };
        if !succeeded {
            let reason = self.revert_reason(tx, receipt.block_number.as_deref()).await;
            return Ok(ReceiptStatus::Reverted { reason });
        }

        Ok(ReceiptStatus::Success {
            contract_address: receipt.contract_address,
            block_number: receipt
                .block_number
                .as_deref()
                .map(parse_quantity)
                .transpose()?,
            gas_used: receipt.gas_used.as_deref().map(parse_quantity).transpose()?,
            logs: receipt
                .logs
                .into_iter()
                .map(|log| LogEntry {
                    address: log.address,
                    topics: log.topics,
                    data: log.data,
                })
                .collect(),
        })
    }

    async fn transaction_count(&self, address: Address) -> Result<u64, LedgerError> {
        let raw: String = self
            .call_required("eth_getTransactionCount", json!([address, "pending"]))
            .await?;
        parse_quantity(&raw)
    }

    async fn accounts(&self) -> Result<Vec<Address>, LedgerError> {
        Ok(self.call("eth_accounts", json!([])).await?.unwrap_or_default())
    }

    async fn chain_id(&self) -> Result<u64, LedgerError> {
        let raw: String = self.call_required("eth_chainId", json!([])).await?;
        parse_quantity(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::ERROR_STRING_SELECTOR;
    use alloy_dyn_abi::DynSolValue;

    fn error(message: &str, data: Option<Value>) -> RpcErrorObject {
        RpcErrorObject {
            code: -32000,
            message: message.into(),
            data,
        }
    }

    fn encoded_reason(reason: &str) -> String {
        let mut data = ERROR_STRING_SELECTOR.to_vec();
        data.extend(DynSolValue::Tuple(vec![DynSolValue::String(reason.into())]).abi_encode_params());
        format!("0x{}", hex::encode(data))
    }

    #[test]
    fn parses_quantities() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x1a").unwrap(), 26);
        assert_eq!(parse_quantity("0x").unwrap(), 0);
        assert!(parse_quantity("0xzz").is_err());
        assert_eq!(quantity(255), "0xff");
        assert_eq!(u256_quantity(U256::from(255)), "0xff");
        assert_eq!(u256_quantity(U256::ZERO), "0x0");
    }

    #[test]
    fn geth_style_revert_data_is_decoded() {
        let err = error(
            "execution reverted",
            Some(Value::String(encoded_reason("insufficient balance"))),
        );
        assert_eq!(
            classify_rpc_error(err),
            LedgerError::Reverted("insufficient balance".into())
        );
    }

    #[test]
    fn hardhat_style_nested_revert_data_is_decoded() {
        let err = error(
            "Error: VM Exception while processing transaction",
            Some(json!({ "message": "revert", "data": encoded_reason("sold out") })),
        );
        assert_eq!(classify_rpc_error(err), LedgerError::Reverted("sold out".into()));
    }

    #[test]
    fn automined_revert_keeps_tx_hash() {
        let tx = B256::repeat_byte(0xab);
        let err = error(
            "Error: VM Exception while processing transaction: reverted with reason string 'sold out'",
            Some(json!({
                "message": "reverted with reason string 'sold out'",
                "txHash": tx,
                "data": encoded_reason("sold out"),
            })),
        );
        assert_eq!(
            classify_rpc_error(err),
            LedgerError::MinedReverted {
                tx,
                reason: "sold out".into()
            }
        );
    }

    #[test]
    fn reason_string_in_message() {
        let err = error(
            "VM Exception while processing transaction: reverted with reason string 'unknown merchant'",
            None,
        );
        assert_eq!(
            classify_rpc_error(err),
            LedgerError::Reverted("unknown merchant".into())
        );
    }

    #[test]
    fn non_revert_errors_are_rejections() {
        let err = error("nonce too low", None);
        assert_eq!(classify_rpc_error(err), LedgerError::Rejected("nonce too low".into()));

        let err = error("insufficient funds for gas * price + value", None);
        assert!(matches!(classify_rpc_error(err), LedgerError::Rejected(_)));
    }

    #[test]
    fn receipt_json_deserializes() {
        let raw = json!({
            "status": "0x1",
            "contractAddress": null,
            "blockNumber": "0x10",
            "gasUsed": "0x5208",
            "logs": [{
                "address": "0x5fbdb2315678afecb367f032d93f642f64180aa3",
                "topics": ["0x0000000000000000000000000000000000000000000000000000000000000001"],
                "data": "0x"
            }]
        });
        let receipt: RpcReceipt = serde_json::from_value(raw).unwrap();
        assert_eq!(parse_quantity(receipt.block_number.as_deref().unwrap()).unwrap(), 16);
        assert_eq!(receipt.logs.len(), 1);
        assert!(receipt.contract_address.is_none());
    }

    #[test]
    fn node_managed_transaction_serializes_camel_case() {
        let tx = RpcTransaction {
            from: Address::ZERO,
            to: None,
            data: Bytes::from(vec![0x60, 0x80]),
            value: u256_quantity(U256::ZERO),
            nonce: Some(quantity(3)),
            gas: None,
            gas_price: Some(format!("{:#x}", 1_000_000_000u128)),
        };
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["data"], "0x6080");
        assert_eq!(json["nonce"], "0x3");
        assert_eq!(json["gasPrice"], "0x3b9aca00");
        assert!(json.get("to").is_none());
        assert!(json.get("gas").is_none());
    }
}

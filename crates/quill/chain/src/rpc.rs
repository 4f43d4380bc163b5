//! JSON-RPC chain adapter.
//!
//! The only component that speaks to the node. Submits raw signed
//! transactions, runs view calls and awaits mining with a timeout.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::{hex, Address, Bytes, B256, U256};
use k256::ecdsa::SigningKey;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::{sleep, Instant};
use tracing::debug;
use url::Url;

use crate::tx::{address_of, sign_recoverable, LegacyTx};
use crate::ChainError;

/// Receipt polling cadence inside [`ChainClient::wait_until_mined`].
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Gas limit used when the node declines to estimate.
const FALLBACK_GAS_LIMIT: u64 = 2_500_000;

/// JSON-RPC client for the chain node.
#[derive(Debug)]
pub struct ChainClient {
    http: reqwest::Client,
    url: Url,
    chain_id: u64,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

impl ChainClient {
    /// Build a client for `rpc_url`. `api_key`, if set, is appended as the
    /// `x-apikey` query parameter.
    pub fn new(rpc_url: &str, api_key: Option<&str>, chain_id: u64) -> Result<Self, ChainError> {
        let mut url = Url::parse(rpc_url)?;
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            url.query_pairs_mut().append_pair("x-apikey", key);
        }
        Ok(Self {
            http: reqwest::Client::new(),
            url,
            chain_id,
            next_id: AtomicU64::new(1),
        })
    }

    /// The configured chain id (EIP-155).
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// The effective RPC URL (API key included).
    pub fn rpc_url(&self) -> &Url {
        &self.url
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });
        let response: RpcResponse = self
            .http
            .post(self.url.clone())
            .json(&body)
            .send()
            .await?
            .json()
            .await?;
        if let Some(err) = response.error {
            return Err(ChainError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        response
            .result
            .ok_or_else(|| ChainError::InvalidResponse(format!("{method}: no result")))
    }

    /// Read-only view call against the latest block.
    pub async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        let result = self
            .request(
                "eth_call",
                json!([{ "to": to, "data": data }, "latest"]),
            )
            .await?;
        parse_bytes(&result)
    }

    /// Pending-state nonce for `address`.
    pub async fn transaction_count(&self, address: Address) -> Result<u64, ChainError> {
        let result = self
            .request("eth_getTransactionCount", json!([address, "pending"]))
            .await?;
        parse_quantity(&result)
    }

    /// Current node gas price.
    pub async fn gas_price(&self) -> Result<u128, ChainError> {
        let result = self.request("eth_gasPrice", json!([])).await?;
        parse_quantity(&result)
    }

    async fn estimate_gas(&self, from: Address, to: Address, data: &Bytes) -> u64 {
        let estimated = self
            .request(
                "eth_estimateGas",
                json!([{ "from": from, "to": to, "data": data }]),
            )
            .await
            .and_then(|v| parse_quantity::<u64>(&v));
        match estimated {
            Ok(gas) => gas,
            Err(err) => {
                debug!(target: "quill::chain", error = %err, "gas estimation failed, using fallback");
                FALLBACK_GAS_LIMIT
            }
        }
    }

    /// Sign `payload` as a legacy transaction from `key` to `to` and
    /// broadcast it. Returns after broadcast with the transaction hash.
    pub async fn send_raw_tx(
        &self,
        key: &SigningKey,
        to: Address,
        payload: Vec<u8>,
    ) -> Result<B256, ChainError> {
        let from = address_of(key);
        let data = Bytes::from(payload);

        let nonce = self.transaction_count(from).await?;
        let gas_price = self.gas_price().await?;
        let gas_limit = self.estimate_gas(from, to, &data).await;

        let tx = LegacyTx {
            nonce,
            gas_price,
            gas_limit,
            to,
            value: U256::ZERO,
            data,
        };
        let signature = sign_recoverable(key, tx.signing_hash(self.chain_id))?;
        let raw = tx.encode_signed(self.chain_id, &signature);

        let result = self
            .request(
                "eth_sendRawTransaction",
                json!([format!("0x{}", hex::encode(raw))]),
            )
            .await?;
        let hash = parse_b256(&result)?;
        debug!(target: "quill::chain", %from, %to, %hash, nonce, "transaction broadcast");
        Ok(hash)
    }

    /// Poll the receipt for `tx_hash` until it is mined or `timeout`
    /// elapses. A mined-but-reverted transaction is an error.
    pub async fn wait_until_mined(
        &self,
        tx_hash: B256,
        timeout: Duration,
    ) -> Result<(), ChainError> {
        let deadline = Instant::now() + timeout;
        loop {
            let receipt = self
                .request("eth_getTransactionReceipt", json!([tx_hash]))
                .await?;
            if let Some(status) = receipt.get("status") {
                let mined: u64 = parse_quantity(status)?;
                return if mined == 1 {
                    Ok(())
                } else {
                    Err(ChainError::TxReverted(tx_hash))
                };
            }
            if Instant::now() >= deadline {
                return Err(ChainError::TxTimeout(tx_hash));
            }
            sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }
}

fn quantity_str(value: &Value) -> Result<&str, ChainError> {
    value
        .as_str()
        .ok_or_else(|| ChainError::InvalidResponse(format!("expected hex string, got {value}")))
}

fn parse_quantity<T: TryFrom<U256>>(value: &Value) -> Result<T, ChainError> {
    let raw = quantity_str(value)?;
    let parsed = U256::from_str_radix(raw.trim_start_matches("0x"), 16)
        .map_err(|err| ChainError::InvalidResponse(format!("bad quantity {raw}: {err}")))?;
    T::try_from(parsed)
        .map_err(|_| ChainError::InvalidResponse(format!("quantity {raw} out of range")))
}

fn parse_bytes(value: &Value) -> Result<Bytes, ChainError> {
    let raw = quantity_str(value)?;
    let decoded = hex::decode(raw.trim_start_matches("0x"))
        .map_err(|err| ChainError::InvalidResponse(format!("bad hex {raw}: {err}")))?;
    Ok(Bytes::from(decoded))
}

fn parse_b256(value: &Value) -> Result<B256, ChainError> {
    let bytes = parse_bytes(value)?;
    if bytes.len() != 32 {
        return Err(ChainError::InvalidResponse(format!(
            "expected 32-byte hash, got {} bytes",
            bytes.len()
        )));
    }
    Ok(B256::from_slice(&bytes))
}

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::info;

use crate::config::ChainConfig;
use crate::core::TransactionRecord;

/// Supplies newly-pending transaction hashes and resolves them to full
/// records. The chain node owns what "new since last poll" means.
#[async_trait]
pub trait PendingTxSource: Send {
    async fn new_pending_hashes(&mut self) -> Result<Vec<String>, RpcError>;

    /// `Ok(None)` when the transaction is gone from the mempool or its
    /// payload is incomplete; both are expected and skipped by the caller.
    async fn resolve(&self, hash: &str) -> Result<Option<TransactionRecord>, RpcError>;
}

/// Simple Ethereum JSON-RPC client.
pub struct EthRpc {
    url: String,
    client: Client,
    auth: Option<String>, // base64 encoded user:pass
    filter_id: Option<String>,
}

impl EthRpc {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            client: Client::new(),
            auth: None,
            filter_id: None,
        }
    }

    pub fn with_basic_auth(url: &str, user: &str, pass: &str) -> Self {
        use base64::{Engine, engine::general_purpose::STANDARD};
        let mut rpc = Self::new(url);
        rpc.auth = Some(STANDARD.encode(format!("{user}:{pass}")));
        rpc
    }

    pub fn from_config(config: &ChainConfig) -> Self {
        match (&config.rpc_user, &config.rpc_password) {
            (Some(user), Some(pass)) => Self::with_basic_auth(&config.rpc_url, user, pass),
            _ => Self::new(&config.rpc_url),
        }
    }

    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(ref auth) = self.auth {
            request = request.header("Authorization", format!("Basic {auth}"));
        }

        let resp = request.send().await.map_err(RpcError::Http)?;
        let json: Value = resp.json().await.map_err(RpcError::Http)?;

        if let Some(err) = json.get("error").and_then(|e| {
            if e.is_null() {
                None
            } else {
                Some(e.clone())
            }
        }) {
            return Err(RpcError::Rpc(err));
        }

        Ok(json["result"].clone())
    }

    /// Get a pending or mined transaction by hash. `Null` result means the
    /// node no longer knows the transaction.
    pub async fn transaction_by_hash(&self, hash: &str) -> Result<Value, RpcError> {
        self.call("eth_getTransactionByHash", vec![json!(hash)]).await
    }

    async fn install_pending_filter(&self) -> Result<String, RpcError> {
        let id = self.call("eth_newPendingTransactionFilter", vec![]).await?;
        match id.as_str() {
            Some(id) => {
                info!("Pending-transaction filter installed: {id}");
                Ok(id.to_string())
            }
            None => Err(RpcError::Rpc(id)),
        }
    }
}

#[async_trait]
impl PendingTxSource for EthRpc {
    async fn new_pending_hashes(&mut self) -> Result<Vec<String>, RpcError> {
        let filter_id = match &self.filter_id {
            Some(id) => id.clone(),
            None => {
                let id = self.install_pending_filter().await?;
                self.filter_id = Some(id.clone());
                id
            }
        };

        match self.call("eth_getFilterChanges", vec![json!(filter_id)]).await {
            Ok(changes) => {
                let hashes = changes
                    .as_array()
                    .map(|entries| {
                        entries
                            .iter()
                            .filter_map(|h| h.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(hashes)
            }
            Err(e) => {
                // A node restart invalidates filter ids; reinstall next poll.
                self.filter_id = None;
                Err(e)
            }
        }
    }

    async fn resolve(&self, hash: &str) -> Result<Option<TransactionRecord>, RpcError> {
        let tx = self.transaction_by_hash(hash).await?;
        if tx.is_null() {
            return Ok(None);
        }
        Ok(record_from_json(&tx))
    }
}

/// Normalize an `eth_getTransactionByHash` payload into a record.
/// Missing required fields yield `None`; a `null` recipient (contract
/// creation) becomes an empty string.
pub fn record_from_json(tx: &Value) -> Option<TransactionRecord> {
    let hash = tx.get("hash")?.as_str()?;
    let from = tx.get("from")?.as_str()?;
    let to = tx.get("to").and_then(Value::as_str).unwrap_or_default();
    let value_wei = parse_hex_quantity(tx.get("value")?.as_str()?)?;
    let gas_price_wei = parse_hex_quantity(tx.get("gasPrice")?.as_str()?)?;

    Some(TransactionRecord {
        hash: hash.to_string(),
        from: from.to_string(),
        to: to.to_string(),
        value_eth: wei_to_eth(value_wei),
        gas_price_gwei: wei_to_gwei(gas_price_wei),
        observed_at: Utc::now(),
    })
}

/// Parse a JSON-RPC hex quantity ("0x" prefixed).
pub fn parse_hex_quantity(s: &str) -> Option<u128> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    if digits.is_empty() {
        return None;
    }
    u128::from_str_radix(digits, 16).ok()
}

pub fn wei_to_eth(wei: u128) -> f64 {
    wei as f64 / 1e18
}

pub fn wei_to_gwei(wei: u128) -> f64 {
    wei as f64 / 1e9
}

#[derive(Debug)]
pub enum RpcError {
    Http(reqwest::Error),
    Rpc(Value),
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcError::Http(e) => write!(f, "HTTP error: {e}"),
            RpcError::Rpc(e) => write!(f, "RPC error: {e}"),
        }
    }
}

impl std::error::Error for RpcError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn eth(whole: u128) -> String {
        format!("{:#x}", whole * 10u128.pow(18))
    }

    fn gwei(whole: u128) -> String {
        format!("{:#x}", whole * 10u128.pow(9))
    }

    #[test]
    fn hex_quantity_parses_prefixed_values() {
        assert_eq!(parse_hex_quantity("0x0"), Some(0));
        assert_eq!(parse_hex_quantity("0xde0b6b3a7640000"), Some(1_000_000_000_000_000_000));
        assert_eq!(parse_hex_quantity("0x"), None);
        assert_eq!(parse_hex_quantity("0xzz"), None);
    }

    #[test]
    fn unit_conversions() {
        assert!((wei_to_eth(1_000_000_000_000_000_000) - 1.0).abs() < 1e-12);
        assert!((wei_to_gwei(60_000_000_000) - 60.0).abs() < 1e-9);
    }

    #[test]
    fn record_from_full_payload() {
        let tx = serde_json::json!({
            "hash": "0x1",
            "from": "0xABC123",
            "to": "0xdef456",
            "value": eth(150),
            "gasPrice": gwei(60),
            "nonce": "0x5",
        });
        let record = record_from_json(&tx).unwrap();
        assert_eq!(record.hash, "0x1");
        assert_eq!(record.from, "0xABC123");
        assert_eq!(record.to, "0xdef456");
        assert!((record.value_eth - 150.0).abs() < 1e-9);
        assert!((record.gas_price_gwei - 60.0).abs() < 1e-9);
    }

    #[test]
    fn contract_creation_has_empty_recipient() {
        let tx = serde_json::json!({
            "hash": "0x2",
            "from": "0x11",
            "to": null,
            "value": "0x0",
            "gasPrice": gwei(20),
        });
        let record = record_from_json(&tx).unwrap();
        assert_eq!(record.to, "");
        assert_eq!(record.value_eth, 0.0);
    }

    #[test]
    fn incomplete_payload_is_skipped() {
        let no_from = serde_json::json!({
            "hash": "0x3",
            "value": "0x0",
            "gasPrice": "0x1",
        });
        assert!(record_from_json(&no_from).is_none());

        let bad_value = serde_json::json!({
            "hash": "0x3",
            "from": "0x11",
            "value": "0x",
            "gasPrice": "0x1",
        });
        assert!(record_from_json(&bad_value).is_none());
    }
}

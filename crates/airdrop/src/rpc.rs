//! HTTP JSON-RPC client for the cluster endpoints used by the confirmer.

use crate::commitment::CommitmentLevel;
use crate::signature::{Address, Signature};
use crate::status::{decode_signature_statuses, StatusObservation};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("decode error: {0}")]
    Decode(String),
}

/// `getLatestBlockhash` result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestBlockhash {
    pub blockhash: String,
    pub last_valid_block_height: u64,
}

async fn http_json_rpc(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Value,
    id: u64,
) -> Result<Value, RpcError> {
    let body = json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params
    });
    let resp = client.post(url).json(&body).send().await?;
    let json: Value = resp.json().await?;
    if let Some(err) = json.get("error") {
        return Err(RpcError::Rpc {
            code: err.get("code").and_then(|c| c.as_i64()).unwrap_or_default(),
            message: err
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string()),
        });
    }
    let result = json
        .get("result")
        .cloned()
        .ok_or_else(|| RpcError::Decode("Missing result".into()))?;
    Ok(result)
}

/// JSON-RPC over HTTP. Cheap to share behind an `Arc`; the inner `reqwest::Client` pools connections.
pub struct RpcClient {
    http_client: reqwest::Client,
    http_url: String,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(http_url: impl Into<String>) -> Result<Self, RpcError> {
        let http_client = reqwest::Client::builder().no_proxy().build()?;
        Ok(Self::with_client(http_client, http_url))
    }

    pub fn with_client(http_client: reqwest::Client, http_url: impl Into<String>) -> Self {
        Self {
            http_client,
            http_url: http_url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.http_url
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(method, id, "rpc call");
        http_json_rpc(&self.http_client, &self.http_url, method, params, id).await
    }

    /// `requestAirdrop`: ask the faucet to credit `lamports` to `recipient`. Returns the transaction signature.
    pub async fn request_airdrop(
        &self,
        recipient: &Address,
        lamports: u64,
        commitment: CommitmentLevel,
    ) -> Result<Signature, RpcError> {
        let params = json!([recipient.to_string(), lamports, {"commitment": commitment}]);
        let result = self.call("requestAirdrop", params).await?;
        let s = result
            .as_str()
            .ok_or_else(|| RpcError::Decode("requestAirdrop result not string".into()))?;
        s.parse()
            .map_err(|e: crate::signature::ParseKeyError| RpcError::Decode(e.to_string()))
    }

    /// `getSignatureStatuses` for a single signature, without searching transaction history.
    pub async fn get_signature_status(&self, signature: &Signature) -> Result<StatusObservation, RpcError> {
        let params = json!([[signature.to_string()], {"searchTransactionHistory": false}]);
        let result = self.call("getSignatureStatuses", params).await?;
        decode_signature_statuses(&result, *signature).map_err(|e| RpcError::Decode(e.to_string()))
    }

    pub async fn get_block_height(&self, commitment: CommitmentLevel) -> Result<u64, RpcError> {
        let result = self
            .call("getBlockHeight", json!([{"commitment": commitment}]))
            .await?;
        result
            .as_u64()
            .ok_or_else(|| RpcError::Decode("getBlockHeight result not u64".into()))
    }

    pub async fn get_latest_blockhash(&self, commitment: CommitmentLevel) -> Result<LatestBlockhash, RpcError> {
        let result = self
            .call("getLatestBlockhash", json!([{"commitment": commitment}]))
            .await?;
        let value = result
            .get("value")
            .ok_or_else(|| RpcError::Decode("Missing value".into()))?;
        let blockhash = value
            .get("blockhash")
            .and_then(|b| b.as_str())
            .ok_or_else(|| RpcError::Decode("Missing blockhash".into()))?
            .to_string();
        let last_valid_block_height = value
            .get("lastValidBlockHeight")
            .and_then(|h| h.as_u64())
            .ok_or_else(|| RpcError::Decode("Missing lastValidBlockHeight".into()))?;
        Ok(LatestBlockhash {
            blockhash,
            last_valid_block_height,
        })
    }
}

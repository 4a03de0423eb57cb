//! Airdrop requester: one `requestAirdrop` call, then wait for the signature to confirm.
//!
//! The request itself is never retried. Only confirmation of the returned signature is raced.

use crate::commitment::CommitmentLevel;
use crate::config::ConfirmerConfig;
use crate::engine::{ConfirmationEngine, ConfirmationError, ConfirmationRequest};
use crate::expiry::Deadline;
use crate::rpc::{LatestBlockhash, RpcClient, RpcError};
use crate::signature::{Address, Signature};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Faucet side of the cluster API.
#[async_trait]
pub trait AirdropApi: Send + Sync {
    async fn request_airdrop(
        &self,
        recipient: &Address,
        lamports: u64,
        commitment: CommitmentLevel,
    ) -> Result<Signature, RpcError>;

    /// Used to bound confirmation by the validity window of the faucet's transaction.
    async fn latest_blockhash(&self, commitment: CommitmentLevel) -> Result<LatestBlockhash, RpcError>;
}

#[async_trait]
impl AirdropApi for RpcClient {
    async fn request_airdrop(
        &self,
        recipient: &Address,
        lamports: u64,
        commitment: CommitmentLevel,
    ) -> Result<Signature, RpcError> {
        RpcClient::request_airdrop(self, recipient, lamports, commitment).await
    }

    async fn latest_blockhash(&self, commitment: CommitmentLevel) -> Result<LatestBlockhash, RpcError> {
        self.get_latest_blockhash(commitment).await
    }
}

#[derive(Debug, Error)]
pub enum AirdropError {
    #[error("airdrop request failed: {0}")]
    Request(#[source] RpcError),
    #[error("airdrop request cancelled")]
    Cancelled,
    #[error(transparent)]
    Confirmation(#[from] ConfirmationError),
}

pub struct AirdropRequester {
    api: Arc<dyn AirdropApi>,
    engine: Arc<ConfirmationEngine>,
}

impl AirdropRequester {
    pub fn new(api: Arc<dyn AirdropApi>, engine: Arc<ConfirmationEngine>) -> Self {
        Self { api, engine }
    }

    /// Requester and engine over one shared HTTP client plus a WebSocket listener.
    pub fn from_config(config: ConfirmerConfig) -> Result<Self, RpcError> {
        let client = Arc::new(RpcClient::new(config.http_url.clone())?);
        let engine = ConfirmationEngine::builder()
            .config(config)
            .rpc_client(client.clone())
            .build()?;
        Ok(Self::new(client, Arc::new(engine)))
    }

    pub fn engine(&self) -> &Arc<ConfirmationEngine> {
        &self.engine
    }

    /// Credit `lamports` to `recipient` and return the signature once it reaches `commitment`.
    pub async fn request_airdrop(
        &self,
        recipient: &Address,
        lamports: u64,
        commitment: CommitmentLevel,
        cancel: Option<&CancellationToken>,
    ) -> Result<Signature, AirdropError> {
        let caller = cancel.cloned().unwrap_or_default();
        let signature = tokio::select! {
            biased;
            _ = caller.cancelled() => return Err(AirdropError::Cancelled),
            r = self.api.request_airdrop(recipient, lamports, commitment) => {
                r.map_err(AirdropError::Request)?
            }
        };
        tracing::info!(signature = %signature, recipient = %recipient, lamports, "airdrop requested");

        let blockhash_timeout = self.engine.config().blockhash_timeout;
        // Fetched after submission, so this blockhash is no older than the faucet's.
        let deadline = tokio::select! {
            biased;
            _ = caller.cancelled() => None,
            r = timeout(blockhash_timeout, self.api.latest_blockhash(commitment)) => match r {
                Ok(Ok(bh)) => Some(Deadline::BlockHeight(bh.last_valid_block_height)),
                Ok(Err(e)) => {
                    tracing::warn!(reason = %e, "getLatestBlockhash failed, using time-based deadline");
                    None
                }
                Err(_) => {
                    tracing::warn!(?blockhash_timeout, "getLatestBlockhash timed out, using time-based deadline");
                    None
                }
            },
        };

        let mut request = ConfirmationRequest::new(signature, commitment).cancel(caller);
        if let Some(deadline) = deadline {
            request = request.deadline(deadline);
        }
        self.engine.confirm(request).await?;
        Ok(signature)
    }
}

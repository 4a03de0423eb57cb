//! Status poller: one point-in-time `getSignatureStatuses` exchange per call.
//!
//! No retries here; the engine decides when to poll again.

use crate::commitment::CommitmentLevel;
use crate::rpc::{RpcClient, RpcError};
use crate::signature::Signature;
use crate::status::StatusObservation;
use async_trait::async_trait;

#[async_trait]
pub trait StatusPoller: Send + Sync {
    /// Current status of `signature`. `target` is advisory: the caller compares levels.
    async fn poll(
        &self,
        signature: &Signature,
        target: CommitmentLevel,
    ) -> Result<StatusObservation, RpcError>;
}

#[async_trait]
impl StatusPoller for RpcClient {
    async fn poll(
        &self,
        signature: &Signature,
        _target: CommitmentLevel,
    ) -> Result<StatusObservation, RpcError> {
        self.get_signature_status(signature).await
    }
}

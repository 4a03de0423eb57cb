//! Deadlines: explicit instants or the validity window of a reference blockhash.
//!
//! A transaction whose blockhash has expired can no longer land, so waiting past
//! `lastValidBlockHeight` is pointless.

use crate::commitment::CommitmentLevel;
use crate::rpc::{RpcClient, RpcError};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, timeout_at, Instant};

/// When a confirmation gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    /// Give up at this instant.
    At(Instant),
    /// Give up once the block height exceeds this value (`lastValidBlockHeight`).
    BlockHeight(u64),
}

impl Deadline {
    pub fn after(d: Duration) -> Self {
        Deadline::At(Instant::now() + d)
    }
}

/// Source of the current block height, used to watch [Deadline::BlockHeight].
#[async_trait]
pub trait BlockHeightSource: Send + Sync {
    async fn block_height(&self, commitment: CommitmentLevel) -> Result<u64, RpcError>;
}

#[async_trait]
impl BlockHeightSource for RpcClient {
    async fn block_height(&self, commitment: CommitmentLevel) -> Result<u64, RpcError> {
        self.get_block_height(commitment).await
    }
}

/// Resolves once `deadline` has passed. A failed block height read is retried on
/// the next tick. If no read succeeds for `unavailable_after`, the deadline is
/// treated as expired.
pub(crate) async fn expired(
    deadline: Deadline,
    blocks: &dyn BlockHeightSource,
    commitment: CommitmentLevel,
    interval: Duration,
    unavailable_after: Duration,
) {
    match deadline {
        Deadline::At(at) => sleep_until(at).await,
        Deadline::BlockHeight(last_valid) => {
            let mut fresh_until = Instant::now() + unavailable_after;
            loop {
                match timeout_at(fresh_until, blocks.block_height(commitment)).await {
                    Ok(Ok(height)) if height > last_valid => {
                        tracing::debug!(height, last_valid, "block height exceeded");
                        return;
                    }
                    Ok(Ok(_)) => fresh_until = Instant::now() + unavailable_after,
                    Ok(Err(e)) => {
                        tracing::warn!(reason = %e, "getBlockHeight failed");
                        if Instant::now() >= fresh_until {
                            tracing::warn!(last_valid, "block height unavailable, giving up");
                            return;
                        }
                    }
                    Err(_) => {
                        tracing::warn!(last_valid, "getBlockHeight stalled, giving up");
                        return;
                    }
                }
                sleep(interval).await;
            }
        }
    }
}

//! Confirmer configuration.

use crate::commitment::CommitmentLevel;
use std::time::Duration;

/// Endpoints and timing knobs shared by the poller, listener and engine.
#[derive(Debug, Clone)]
pub struct ConfirmerConfig {
    /// HTTP RPC URL (requestAirdrop, getSignatureStatuses, getBlockHeight, getLatestBlockhash).
    pub http_url: String,
    /// WebSocket RPC URL for signatureSubscribe.
    pub ws_url: String,
    /// Delay between status polls while no terminal observation has arrived.
    pub poll_interval: Duration,
    /// Upper bound of random extra delay added to each poll interval. Zero disables jitter.
    pub poll_jitter: Duration,
    /// Delay between block height checks when the deadline is a block height.
    pub block_height_interval: Duration,
    /// Max wait for the subscription id after signatureSubscribe.
    pub subscribe_timeout: Duration,
    /// Max wait for getLatestBlockhash after an airdrop is submitted.
    pub blockhash_timeout: Duration,
    /// Validity window used for `processed` when no deadline is given.
    pub processed_timeout: Duration,
    /// Validity window used for `confirmed`/`finalized` when no deadline is given.
    pub default_timeout: Duration,
    /// Max number of confirmed signatures remembered for the fast path.
    pub cache_capacity: usize,
}

impl ConfirmerConfig {
    /// Config for `http_url` with the WebSocket URL derived by scheme substitution.
    pub fn new(http_url: impl Into<String>) -> Self {
        let http_url = http_url.into();
        let ws_url = http_url
            .replace("http://", "ws://")
            .replace("https://", "wss://");
        Self {
            http_url,
            ws_url,
            ..Default::default()
        }
    }

    /// Deadline applied when the caller gives none and no block height is known.
    pub fn validity_window(&self, commitment: CommitmentLevel) -> Duration {
        match commitment {
            CommitmentLevel::Processed => self.processed_timeout,
            _ => self.default_timeout,
        }
    }
}

impl Default for ConfirmerConfig {
    fn default() -> Self {
        Self {
            http_url: "http://127.0.0.1:8899".into(),
            ws_url: "ws://127.0.0.1:8900".into(),
            poll_interval: Duration::from_secs(1),
            poll_jitter: Duration::ZERO,
            block_height_interval: Duration::from_secs(2),
            subscribe_timeout: Duration::from_secs(10),
            blockhash_timeout: Duration::from_secs(5),
            processed_timeout: Duration::from_secs(30),
            default_timeout: Duration::from_secs(60),
            cache_capacity: 1024,
        }
    }
}

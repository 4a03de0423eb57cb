//! Confirmation engine: races the push listener against the status poll loop.
//!
//! Each `confirm` call owns one cancellation scope (a child of the caller's token).
//! The decision loop and both strategies are joined inside the call, so by the time
//! it returns the scope is cancelled, the subscription is released and no timer or
//! poll is left running. The first observation at or above the target, or any
//! execution error, decides the outcome. Within one wakeup the order of precedence is
//! caller cancellation, then push, then poll, then the deadline.

use crate::cache::ConfirmedSignatures;
use crate::commitment::CommitmentLevel;
use crate::config::ConfirmerConfig;
use crate::expiry::{expired, BlockHeightSource, Deadline};
use crate::listener::{SignatureListener, WsSignatureListener};
use crate::poller::StatusPoller;
use crate::rpc::{RpcClient, RpcError};
use crate::signature::Signature;
use crate::status::{Source, StatusObservation, TransactionError};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// One confirmation: which signature, how durable, and when to give up.
#[derive(Debug, Clone)]
pub struct ConfirmationRequest {
    pub signature: Signature,
    pub commitment: CommitmentLevel,
    /// Caller-owned; the engine only observes it.
    pub cancel: Option<CancellationToken>,
    /// `None` uses the commitment's validity window from [ConfirmerConfig].
    pub deadline: Option<Deadline>,
}

impl ConfirmationRequest {
    pub fn new(signature: Signature, commitment: CommitmentLevel) -> Self {
        Self {
            signature,
            commitment,
            cancel: None,
            deadline: None,
        }
    }

    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Signature reached the requested commitment.
#[derive(Debug, Clone, PartialEq)]
pub struct Confirmation {
    pub signature: Signature,
    /// Observed level; at least the requested one.
    pub commitment: CommitmentLevel,
    pub slot: Option<u64>,
    /// Winning channel. `None` when answered from previously confirmed signatures.
    pub source: Option<Source>,
}

fn describe_last(last: &Option<CommitmentLevel>) -> &'static str {
    match last {
        Some(level) => level.as_str(),
        None => "not found",
    }
}

#[derive(Debug, Error)]
pub enum ConfirmationError {
    #[error("transaction {signature} failed ({via}): {err}")]
    Execution {
        signature: Signature,
        err: TransactionError,
        via: Source,
    },
    #[error("timed out waiting for {signature} to reach {target} (last observed: {})", describe_last(.last_observed))]
    Timeout {
        signature: Signature,
        target: CommitmentLevel,
        /// `None`: never visible to the queried node. `Some`: visible but below target.
        last_observed: Option<CommitmentLevel>,
    },
    #[error("confirmation of {signature} cancelled")]
    Cancelled { signature: Signature },
}

impl ConfirmationError {
    pub fn signature(&self) -> &Signature {
        match self {
            ConfirmationError::Execution { signature, .. }
            | ConfirmationError::Timeout { signature, .. }
            | ConfirmationError::Cancelled { signature } => signature,
        }
    }
}

/// Builder for the engine. Collaborators not set explicitly are created from the config,
/// sharing a single [RpcClient] between poller and block height source.
#[derive(Default)]
pub struct ConfirmationEngineBuilder {
    config: Option<ConfirmerConfig>,
    poller: Option<Arc<dyn StatusPoller>>,
    listener: Option<Arc<dyn SignatureListener>>,
    blocks: Option<Arc<dyn BlockHeightSource>>,
}

impl ConfirmationEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: ConfirmerConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn poller(mut self, poller: Arc<dyn StatusPoller>) -> Self {
        self.poller = Some(poller);
        self
    }

    pub fn listener(mut self, listener: Arc<dyn SignatureListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn block_heights(mut self, blocks: Arc<dyn BlockHeightSource>) -> Self {
        self.blocks = Some(blocks);
        self
    }

    /// Use one client for both polling and block heights.
    pub fn rpc_client(self, client: Arc<RpcClient>) -> Self {
        let poller: Arc<dyn StatusPoller> = client.clone();
        self.poller(poller).block_heights(client)
    }

    pub fn build(self) -> Result<ConfirmationEngine, RpcError> {
        let config = self.config.unwrap_or_default();
        let (poller, blocks) = match (self.poller, self.blocks) {
            (Some(p), Some(b)) => (p, b),
            (p, b) => {
                let client = Arc::new(RpcClient::new(config.http_url.clone())?);
                let poller: Arc<dyn StatusPoller> = p.unwrap_or_else(|| client.clone());
                let blocks: Arc<dyn BlockHeightSource> = b.unwrap_or(client);
                (poller, blocks)
            }
        };
        let listener = self.listener.unwrap_or_else(|| {
            Arc::new(WsSignatureListener::new(
                config.ws_url.clone(),
                config.subscribe_timeout,
            ))
        });
        Ok(ConfirmationEngine {
            confirmed: ConfirmedSignatures::new(config.cache_capacity),
            poller,
            listener,
            blocks,
            config,
        })
    }
}

/// Races push and poll per call. Safe to share across concurrent confirmations.
pub struct ConfirmationEngine {
    poller: Arc<dyn StatusPoller>,
    listener: Arc<dyn SignatureListener>,
    blocks: Arc<dyn BlockHeightSource>,
    confirmed: ConfirmedSignatures,
    config: ConfirmerConfig,
}

impl ConfirmationEngine {
    pub fn builder() -> ConfirmationEngineBuilder {
        ConfirmationEngineBuilder::new()
    }

    pub fn config(&self) -> &ConfirmerConfig {
        &self.config
    }

    /// Wait until `request.signature` reaches `request.commitment`, fails on chain,
    /// the deadline passes, or the caller cancels. Exactly one outcome per call.
    pub async fn confirm(&self, request: ConfirmationRequest) -> Result<Confirmation, ConfirmationError> {
        let ConfirmationRequest {
            signature,
            commitment: target,
            cancel,
            deadline,
        } = request;

        if let Some(level) = self.confirmed.satisfying(&signature, target).await {
            tracing::debug!(signature = %signature, %level, "already confirmed");
            return Ok(Confirmation {
                signature,
                commitment: level,
                slot: None,
                source: None,
            });
        }

        let caller = cancel.unwrap_or_default();
        if caller.is_cancelled() {
            return Err(ConfirmationError::Cancelled { signature });
        }
        let scope = caller.child_token();
        let deadline =
            deadline.unwrap_or_else(|| Deadline::after(self.config.validity_window(target)));

        let (push_tx, push_rx) = mpsc::channel(1);
        let (poll_tx, poll_rx) = mpsc::channel(1);
        let decide = self.decide(signature, target, deadline, &caller, &scope, push_rx, poll_rx);
        let strategies = async {
            tokio::join!(
                self.listen(signature, target, &scope, push_tx),
                self.poll_loop(signature, target, &scope, poll_tx),
            )
        };
        let (outcome, _) = tokio::join!(decide, strategies);

        match &outcome {
            Ok(c) => {
                tracing::info!(signature = %signature, commitment = %c.commitment, source = ?c.source, "signature confirmed");
                self.confirmed.record(signature, c.commitment).await;
            }
            Err(e) => tracing::warn!(signature = %signature, reason = %e, "confirmation failed"),
        }
        outcome
    }

    #[allow(clippy::too_many_arguments)]
    async fn decide(
        &self,
        signature: Signature,
        target: CommitmentLevel,
        deadline: Deadline,
        caller: &CancellationToken,
        scope: &CancellationToken,
        mut push_rx: mpsc::Receiver<StatusObservation>,
        mut poll_rx: mpsc::Receiver<StatusObservation>,
    ) -> Result<Confirmation, ConfirmationError> {
        // Every return below cancels the scope, stopping both strategies.
        let _scope_guard = scope.clone().drop_guard();
        let expiry = expired(
            deadline,
            self.blocks.as_ref(),
            target,
            self.config.block_height_interval,
            self.config.validity_window(target),
        );
        tokio::pin!(expiry);

        let mut last_observed: Option<CommitmentLevel> = None;
        let mut push_open = true;
        let mut poll_open = true;
        loop {
            let obs = tokio::select! {
                biased;
                _ = caller.cancelled() => {
                    return Err(ConfirmationError::Cancelled { signature });
                }
                r = push_rx.recv(), if push_open => match r {
                    Some(obs) => obs,
                    None => {
                        push_open = false;
                        continue;
                    }
                },
                r = poll_rx.recv(), if poll_open => match r {
                    Some(obs) => obs,
                    None => {
                        poll_open = false;
                        continue;
                    }
                },
                _ = &mut expiry => {
                    return Err(ConfirmationError::Timeout {
                        signature,
                        target,
                        last_observed,
                    });
                }
            };

            if let Some(err) = obs.err {
                return Err(ConfirmationError::Execution {
                    signature,
                    err,
                    via: obs.source,
                });
            }
            if let Some(level) = obs.commitment.filter(|l| l.satisfies(target)) {
                return Ok(Confirmation {
                    signature,
                    commitment: level,
                    slot: obs.slot,
                    source: Some(obs.source),
                });
            }
            // Option orders None below Some, so this never lowers what was seen.
            last_observed = last_observed.max(obs.commitment);
            tracing::trace!(signature = %signature, via = %obs.source, last = describe_last(&last_observed), "not yet at target");
        }
    }

    async fn listen(
        &self,
        signature: Signature,
        target: CommitmentLevel,
        scope: &CancellationToken,
        tx: mpsc::Sender<StatusObservation>,
    ) {
        match self.listener.listen(&signature, target, scope).await {
            Ok(Some(obs)) => {
                let _ = tx.send(obs).await;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(signature = %signature, reason = %e, "signature listener exhausted, polling only");
            }
        }
    }

    async fn poll_loop(
        &self,
        signature: Signature,
        target: CommitmentLevel,
        scope: &CancellationToken,
        tx: mpsc::Sender<StatusObservation>,
    ) {
        loop {
            let polled = tokio::select! {
                biased;
                _ = scope.cancelled() => return,
                r = self.poller.poll(&signature, target) => r,
            };
            match polled {
                Ok(obs) => {
                    let terminal = obs.is_execution_failure() || obs.satisfies(target);
                    if tx.send(obs).await.is_err() || terminal {
                        return;
                    }
                }
                Err(e) => {
                    tracing::debug!(signature = %signature, reason = %e, "signature status poll failed");
                }
            }
            tokio::select! {
                biased;
                _ = scope.cancelled() => return,
                _ = sleep(self.poll_pause()) => {}
            }
        }
    }

    fn poll_pause(&self) -> Duration {
        let jitter = self.config.poll_jitter;
        if jitter.is_zero() {
            return self.config.poll_interval;
        }
        let max = u64::try_from(jitter.as_millis()).unwrap_or(u64::MAX);
        let extra = rand::thread_rng().gen_range(0..=max);
        self.config.poll_interval.saturating_add(Duration::from_millis(extra))
    }
}

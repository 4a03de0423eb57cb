//! Signature listener: push channel via `signatureSubscribe` over WebSocket.
//!
//! The cluster sends at most one `signatureNotification` per subscription and then drops it.
//! The listener yields that single event, or an error when the channel itself fails. Channel
//! failures are never reported as transaction failures.

use crate::commitment::CommitmentLevel;
use crate::signature::Signature;
use crate::status::{decode_signature_notification, StatusObservation};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, WebSocketStream};
use tokio_util::sync::CancellationToken;

/// Upper bound on unsubscribe + close during teardown.
const RELEASE_TIMEOUT: Duration = Duration::from_secs(2);

const SUBSCRIBE_ID: u64 = 1;
const UNSUBSCRIBE_ID: u64 = 2;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("WS connect failed: {0}")]
    Connect(String),
    #[error("ws: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("subscribe timeout")]
    SubscribeTimeout,
    #[error("subscribe error: {0}")]
    Rpc(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("subscription closed without a notification")]
    Closed,
}

#[async_trait]
pub trait SignatureListener: Send + Sync {
    /// Wait for the first status change of `signature` at `commitment`.
    ///
    /// Returns `Ok(None)` once `scope` is cancelled. Implementations release the
    /// subscription before returning on every path.
    async fn listen(
        &self,
        signature: &Signature,
        commitment: CommitmentLevel,
        scope: &CancellationToken,
    ) -> Result<Option<StatusObservation>, ListenerError>;
}

/// WebSocket listener. Opens one connection per subscription; concurrent calls share nothing.
#[derive(Debug, Clone)]
pub struct WsSignatureListener {
    ws_url: String,
    subscribe_timeout: Duration,
}

impl WsSignatureListener {
    pub fn new(ws_url: impl Into<String>, subscribe_timeout: Duration) -> Self {
        Self {
            ws_url: ws_url.into(),
            subscribe_timeout,
        }
    }
}

#[async_trait]
impl SignatureListener for WsSignatureListener {
    async fn listen(
        &self,
        signature: &Signature,
        commitment: CommitmentLevel,
        scope: &CancellationToken,
    ) -> Result<Option<StatusObservation>, ListenerError> {
        let (ws_stream, _) = tokio::select! {
            biased;
            _ = scope.cancelled() => return Ok(None),
            r = connect_async(self.ws_url.as_str()) => {
                r.map_err(|e| ListenerError::Connect(e.to_string()))?
            }
        };
        let mut sub = Subscription::new(ws_stream);
        let result = sub
            .run(signature, commitment, self.subscribe_timeout, scope)
            .await;
        sub.release().await;
        result
    }
}

/// One open `signatureSubscribe`. Owned by a single `listen` call.
struct Subscription<S> {
    sender: SplitSink<WebSocketStream<S>, Message>,
    receiver: SplitStream<WebSocketStream<S>>,
    id: Option<u64>,
    exhausted: bool,
}

impl<S> Subscription<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn new(ws: WebSocketStream<S>) -> Self {
        let (sender, receiver) = ws.split();
        Self {
            sender,
            receiver,
            id: None,
            exhausted: false,
        }
    }

    async fn run(
        &mut self,
        signature: &Signature,
        commitment: CommitmentLevel,
        subscribe_timeout: Duration,
        scope: &CancellationToken,
    ) -> Result<Option<StatusObservation>, ListenerError> {
        let sub_req = json!({
            "jsonrpc": "2.0",
            "id": SUBSCRIBE_ID,
            "method": "signatureSubscribe",
            "params": [signature.to_string(), {"commitment": commitment}]
        });
        tokio::select! {
            biased;
            _ = scope.cancelled() => return Ok(None),
            r = self.sender.send(Message::Text(sub_req.to_string())) => r?,
        }

        let sub_id = tokio::select! {
            biased;
            _ = scope.cancelled() => return Ok(None),
            r = timeout(subscribe_timeout, self.await_subscription_id()) => {
                r.map_err(|_| ListenerError::SubscribeTimeout)??
            }
        };
        self.id = Some(sub_id);
        tracing::debug!(signature = %signature, subscription = sub_id, "signature subscription open");

        loop {
            let msg = tokio::select! {
                biased;
                _ = scope.cancelled() => return Ok(None),
                msg = self.receiver.next() => msg,
            };
            let text = match msg {
                Some(Ok(Message::Text(t))) => t,
                Some(Ok(Message::Close(_))) | None => return Err(ListenerError::Closed),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            };
            let v: Value = serde_json::from_str(&text).map_err(|e| ListenerError::Decode(e.to_string()))?;
            if v.get("method").and_then(|m| m.as_str()) != Some("signatureNotification") {
                continue;
            }
            let params = v
                .get("params")
                .ok_or_else(|| ListenerError::Decode("no params".into()))?;
            if params.get("subscription").and_then(|s| s.as_u64()) != Some(sub_id) {
                continue;
            }
            let result = params
                .get("result")
                .ok_or_else(|| ListenerError::Decode("no params.result".into()))?;
            let observed = decode_signature_notification(result, *signature, commitment)
                .map_err(|e| ListenerError::Decode(e.to_string()))?;
            if let Some(obs) = observed {
                // The cluster drops the subscription after its first status notification.
                self.exhausted = true;
                return Ok(Some(obs));
            }
        }
    }

    async fn await_subscription_id(&mut self) -> Result<u64, ListenerError> {
        while let Some(msg) = self.receiver.next().await {
            let text = match msg? {
                Message::Text(t) => t,
                Message::Close(_) => break,
                _ => continue,
            };
            let v: Value = serde_json::from_str(&text).map_err(|e| ListenerError::Decode(e.to_string()))?;
            if v.get("id").and_then(|i| i.as_u64()) != Some(SUBSCRIBE_ID) {
                continue;
            }
            if let Some(err) = v.get("error") {
                let msg = err
                    .get("message")
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| err.to_string());
                return Err(ListenerError::Rpc(msg));
            }
            return v
                .get("result")
                .and_then(|r| r.as_u64())
                .ok_or_else(|| ListenerError::Decode("no subscription id".into()));
        }
        Err(ListenerError::Closed)
    }

    /// Unsubscribe (unless the cluster already dropped it) and close the socket.
    async fn release(mut self) {
        let teardown = async {
            if let (Some(id), false) = (self.id, self.exhausted) {
                let unsub = json!({
                    "jsonrpc": "2.0",
                    "id": UNSUBSCRIBE_ID,
                    "method": "signatureUnsubscribe",
                    "params": [id]
                });
                if let Err(e) = self.sender.send(Message::Text(unsub.to_string())).await {
                    tracing::debug!(reason = %e, subscription = id, "signatureUnsubscribe send failed");
                }
            }
            let _ = self.sender.close().await;
        };
        if timeout(RELEASE_TIMEOUT, teardown).await.is_err() {
            tracing::debug!("subscription teardown timed out");
        }
    }
}

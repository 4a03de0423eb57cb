//! Signature status observations and decoding from RPC payloads.
//!
//! Poll results come from `getSignatureStatuses`, push results from `signatureNotification`.
//! Both decode into [StatusObservation]; the engine reconciles them.

use crate::commitment::CommitmentLevel;
use crate::signature::Signature;
use anyhow::{Context, Result};
use serde_json::Value;
use std::fmt;

/// Which channel produced an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Poll,
    Push,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Poll => f.write_str("poll"),
            Source::Push => f.write_str("push"),
        }
    }
}

/// On-chain execution error attached to a signature, kept as the raw RPC value.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionError(pub Value);

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Point-in-time status of one signature. `commitment == None` means not yet visible.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusObservation {
    pub signature: Signature,
    pub commitment: Option<CommitmentLevel>,
    pub err: Option<TransactionError>,
    pub slot: Option<u64>,
    pub source: Source,
}

impl StatusObservation {
    pub fn not_found(signature: Signature, source: Source) -> Self {
        Self {
            signature,
            commitment: None,
            err: None,
            slot: None,
            source,
        }
    }

    /// The transaction landed and was rejected. Terminal at any target level.
    pub fn is_execution_failure(&self) -> bool {
        self.err.is_some()
    }

    /// Succeeded at or above `target`.
    pub fn satisfies(&self, target: CommitmentLevel) -> bool {
        self.err.is_none()
            && self
                .commitment
                .map(|c| c.satisfies(target))
                .unwrap_or(false)
    }
}

/// Decode the `result` of `getSignatureStatuses([signature])` into an observation.
pub fn decode_signature_statuses(result: &Value, signature: Signature) -> Result<StatusObservation> {
    let values = result
        .get("value")
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow::anyhow!("Missing value array"))?;
    let entry = values
        .first()
        .ok_or_else(|| anyhow::anyhow!("Empty value array"))?;
    if entry.is_null() {
        return Ok(StatusObservation::not_found(signature, Source::Poll));
    }
    let commitment = match entry.get("confirmationStatus") {
        Some(Value::String(s)) => s.parse::<CommitmentLevel>().context("parse confirmationStatus")?,
        // Nodes that predate confirmationStatus report `confirmations: null` once rooted.
        _ => match entry.get("confirmations") {
            Some(Value::Null) => CommitmentLevel::Finalized,
            Some(_) | None => CommitmentLevel::Processed,
        },
    };
    let err = match entry.get("err") {
        None | Some(Value::Null) => None,
        Some(e) => Some(TransactionError(e.clone())),
    };
    let slot = entry.get("slot").and_then(|s| s.as_u64());
    Ok(StatusObservation {
        signature,
        commitment: Some(commitment),
        err,
        slot,
        source: Source::Poll,
    })
}

/// Decode `params.result` of a `signatureNotification`. The level is the one subscribed at.
/// Returns `None` for `"receivedSignature"` notifications, which carry no status.
pub fn decode_signature_notification(
    result: &Value,
    signature: Signature,
    commitment: CommitmentLevel,
) -> Result<Option<StatusObservation>> {
    let value = result
        .get("value")
        .ok_or_else(|| anyhow::anyhow!("Missing value"))?;
    if value.as_str() == Some("receivedSignature") {
        return Ok(None);
    }
    if !value.is_object() {
        anyhow::bail!("notification value not an object: {}", value);
    }
    let err = match value.get("err") {
        None | Some(Value::Null) => None,
        Some(e) => Some(TransactionError(e.clone())),
    };
    let slot = result
        .get("context")
        .and_then(|c| c.get("slot"))
        .and_then(|s| s.as_u64());
    Ok(Some(StatusObservation {
        signature,
        commitment: Some(commitment),
        err,
        slot,
        source: Source::Push,
    }))
}

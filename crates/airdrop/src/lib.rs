//! Airdrop runtime: request funds from a cluster faucet and confirm the resulting signature.
//!
//! - **ConfirmationEngine**: races a `signatureSubscribe` push listener against a
//!   `getSignatureStatuses` poll loop under one cancellation scope, bounded by an explicit
//!   deadline or the blockhash validity window. Produces exactly one [Confirmation] or
//!   [ConfirmationError] per request.
//! - **AirdropRequester**: single `requestAirdrop` call (no retry), then delegates to the engine.

pub mod airdrop;
pub mod cache;
pub mod commitment;
pub mod config;
pub mod engine;
pub mod expiry;
pub mod listener;
pub mod poller;
pub mod rpc;
pub mod signature;
pub mod status;

pub use airdrop::{AirdropApi, AirdropError, AirdropRequester};
pub use cache::ConfirmedSignatures;
pub use commitment::{CommitmentLevel, ParseCommitmentError};
pub use config::ConfirmerConfig;
pub use engine::{
    Confirmation, ConfirmationEngine, ConfirmationEngineBuilder, ConfirmationError,
    ConfirmationRequest,
};
pub use expiry::{BlockHeightSource, Deadline};
pub use listener::{ListenerError, SignatureListener, WsSignatureListener};
pub use poller::StatusPoller;
pub use rpc::{LatestBlockhash, RpcClient, RpcError};
pub use signature::{Address, ParseKeyError, Signature};
pub use status::{Source, StatusObservation, TransactionError};

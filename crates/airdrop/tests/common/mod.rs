//! Scripted collaborators for engine and requester tests.
//! Not every test binary uses every helper.
#![allow(dead_code)]

use airdrop::{
    AirdropApi, BlockHeightSource, CommitmentLevel, ConfirmationEngine, ConfirmerConfig,
    LatestBlockhash, ListenerError, RpcError, Signature, SignatureListener, Source,
    StatusObservation, StatusPoller, TransactionError,
};
use airdrop::Address;
use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("airdrop=debug".parse().unwrap()))
        .with_test_writer()
        .try_init();
}

pub fn sig(n: u8) -> Signature {
    Signature::new([n; 64])
}

/// One scripted status report.
#[derive(Debug, Clone)]
pub enum Step {
    NotFound,
    Level(CommitmentLevel),
    Failed,
    Transport,
}

impl Step {
    fn observe(&self, signature: Signature, source: Source) -> Result<StatusObservation, RpcError> {
        let mut obs = StatusObservation::not_found(signature, source);
        match self {
            Step::NotFound => {}
            Step::Level(level) => {
                obs.commitment = Some(*level);
                obs.slot = Some(42);
            }
            Step::Failed => {
                obs.commitment = Some(CommitmentLevel::Processed);
                obs.err = Some(TransactionError(json!({"InstructionError": [0, {"Custom": 1}]})));
            }
            Step::Transport => return Err(RpcError::Decode("connection reset".into())),
        }
        Ok(obs)
    }
}

/// Pops one step per poll; the last step repeats once the script runs out.
pub struct ScriptedPoller {
    default_script: Mutex<VecDeque<Step>>,
    scripts: Mutex<HashMap<Signature, VecDeque<Step>>>,
    calls: AtomicUsize,
    calls_by_sig: Mutex<HashMap<Signature, usize>>,
}

fn next_step(script: &mut VecDeque<Step>) -> Step {
    if script.len() > 1 {
        script.pop_front().unwrap_or(Step::NotFound)
    } else {
        script.front().cloned().unwrap_or(Step::NotFound)
    }
}

impl ScriptedPoller {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            default_script: Mutex::new(steps.into()),
            scripts: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            calls_by_sig: Mutex::new(HashMap::new()),
        })
    }

    pub fn per_signature(scripts: Vec<(Signature, Vec<Step>)>) -> Arc<Self> {
        let poller = Self::new(vec![Step::NotFound]);
        {
            let mut map = poller.scripts.lock().unwrap();
            for (s, steps) in scripts {
                map.insert(s, steps.into());
            }
        }
        poller
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, signature: &Signature) -> usize {
        self.calls_by_sig.lock().unwrap().get(signature).copied().unwrap_or(0)
    }
}

#[async_trait]
impl StatusPoller for ScriptedPoller {
    async fn poll(&self, signature: &Signature, _: CommitmentLevel) -> Result<StatusObservation, RpcError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.calls_by_sig.lock().unwrap().entry(*signature).or_default() += 1;
        let step = {
            let mut scripts = self.scripts.lock().unwrap();
            match scripts.get_mut(signature) {
                Some(script) => next_step(script),
                None => next_step(&mut self.default_script.lock().unwrap()),
            }
        };
        step.observe(*signature, Source::Poll)
    }
}

#[derive(Debug, Clone)]
pub enum Push {
    /// Never emits; returns when the scope is cancelled.
    Silent,
    /// Emits the step after the delay.
    After(Duration, Step),
    /// Channel error after the delay.
    FailAfter(Duration),
}

/// Listener with subscribe counts and a gauge of subscriptions still held.
pub struct ScriptedListener {
    behavior: Push,
    subscribes: AtomicUsize,
    active: AtomicUsize,
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedListener {
    pub fn new(behavior: Push) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            subscribes: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
        })
    }

    pub fn subscribes(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignatureListener for ScriptedListener {
    async fn listen(
        &self,
        signature: &Signature,
        _: CommitmentLevel,
        scope: &CancellationToken,
    ) -> Result<Option<StatusObservation>, ListenerError> {
        if scope.is_cancelled() {
            return Ok(None);
        }
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_add(1, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.active);
        match &self.behavior {
            Push::Silent => {
                scope.cancelled().await;
                Ok(None)
            }
            Push::After(delay, step) => tokio::select! {
                biased;
                _ = scope.cancelled() => Ok(None),
                _ = sleep(*delay) => {
                    let obs = step
                        .observe(*signature, Source::Push)
                        .map_err(|e| ListenerError::Decode(e.to_string()))?;
                    Ok(Some(obs))
                }
            },
            Push::FailAfter(delay) => tokio::select! {
                biased;
                _ = scope.cancelled() => Ok(None),
                _ = sleep(*delay) => Err(ListenerError::Closed),
            },
        }
    }
}

/// Block height that advances by one on every read.
pub struct RisingHeight {
    next: AtomicU64,
    failures: AtomicUsize,
    reads: AtomicUsize,
}

impl RisingHeight {
    pub fn starting_at(h: u64) -> Arc<Self> {
        Self::recovering_after(0, h)
    }

    /// Every read fails.
    pub fn unavailable() -> Arc<Self> {
        Self::recovering_after(usize::MAX, 0)
    }

    /// The first `failures` reads fail; later reads rise from `h`.
    pub fn recovering_after(failures: usize, h: u64) -> Arc<Self> {
        Arc::new(Self {
            next: AtomicU64::new(h),
            failures: AtomicUsize::new(failures),
            reads: AtomicUsize::new(0),
        })
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlockHeightSource for RisingHeight {
    async fn block_height(&self, _: CommitmentLevel) -> Result<u64, RpcError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(RpcError::Decode("getBlockHeight unavailable".into()));
        }
        Ok(self.next.fetch_add(1, Ordering::SeqCst))
    }
}

/// Faucet returning a fixed signature (or error) after an optional delay.
pub struct FakeFaucet {
    result: Result<Signature, String>,
    delay: Duration,
    last_valid_block_height: Option<u64>,
    blockhash_stalls: bool,
    calls: AtomicUsize,
}

impl FakeFaucet {
    pub fn ok(signature: Signature) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(signature),
            delay: Duration::ZERO,
            last_valid_block_height: Some(1_000_000),
            blockhash_stalls: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            result: Err(message.to_string()),
            delay: Duration::ZERO,
            last_valid_block_height: Some(1_000_000),
            blockhash_stalls: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn slow(signature: Signature, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(signature),
            delay,
            last_valid_block_height: Some(1_000_000),
            blockhash_stalls: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn without_blockhash(signature: Signature) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(signature),
            delay: Duration::ZERO,
            last_valid_block_height: None,
            blockhash_stalls: false,
            calls: AtomicUsize::new(0),
        })
    }

    /// getLatestBlockhash never answers.
    pub fn stalled_blockhash(signature: Signature) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(signature),
            delay: Duration::ZERO,
            last_valid_block_height: Some(1_000_000),
            blockhash_stalls: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AirdropApi for FakeFaucet {
    async fn request_airdrop(
        &self,
        _recipient: &Address,
        _lamports: u64,
        _commitment: CommitmentLevel,
    ) -> Result<Signature, RpcError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        self.result.clone().map_err(|message| RpcError::Rpc { code: -32600, message })
    }

    async fn latest_blockhash(&self, _: CommitmentLevel) -> Result<LatestBlockhash, RpcError> {
        if self.blockhash_stalls {
            std::future::pending::<()>().await;
        }
        match self.last_valid_block_height {
            Some(h) => Ok(LatestBlockhash {
                blockhash: "EkSnNWid2cvwEVnVx9aBqawnmiCNiDgp3gUdkDPTKN1N".into(),
                last_valid_block_height: h,
            }),
            None => Err(RpcError::Decode("getLatestBlockhash unavailable".into())),
        }
    }
}

pub fn engine(
    poller: Arc<ScriptedPoller>,
    listener: Arc<ScriptedListener>,
    blocks: Arc<RisingHeight>,
) -> ConfirmationEngine {
    ConfirmationEngine::builder()
        .config(ConfirmerConfig::default())
        .poller(poller)
        .listener(listener)
        .block_heights(blocks)
        .build()
        .expect("engine")
}

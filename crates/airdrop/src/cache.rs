//! In-memory record of signatures already confirmed by this engine (no persistence).
//!
//! Backs the confirm fast path. Levels only move forward; the oldest entries are
//! evicted once capacity is reached.

use crate::commitment::CommitmentLevel;
use crate::signature::Signature;
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    levels: HashMap<Signature, CommitmentLevel>,
    order: VecDeque<Signature>,
}

pub struct ConfirmedSignatures {
    inner: RwLock<Inner>,
    capacity: usize,
}

impl ConfirmedSignatures {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            capacity,
        }
    }

    /// Recorded level for `signature` if it already satisfies `target`.
    pub async fn satisfying(&self, signature: &Signature, target: CommitmentLevel) -> Option<CommitmentLevel> {
        let guard = self.inner.read().await;
        guard
            .levels
            .get(signature)
            .copied()
            .filter(|level| level.satisfies(target))
    }

    /// Record a confirmed level, never lowering one already recorded.
    pub async fn record(&self, signature: Signature, level: CommitmentLevel) {
        if self.capacity == 0 {
            return;
        }
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        if let Some(existing) = inner.levels.get_mut(&signature) {
            if level > *existing {
                *existing = level;
            }
            return;
        }
        while inner.order.len() >= self.capacity {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.levels.remove(&oldest);
                }
                None => break,
            }
        }
        inner.levels.insert(signature, level);
        inner.order.push_back(signature);
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.levels.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

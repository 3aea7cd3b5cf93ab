//! Job tokens shared between the pipeline and its workers
//!
//! The interactive thread may cancel a token at any time. The worker marks it
//! started when it picks the job up and checks it again once the page is
//! rasterised. A worker already inside the backend is never interrupted; its
//! result is dropped when the pipeline polls it.

use crate::JobId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const STARTED: u8 = 0b01;
const CANCELLED: u8 = 0b10;

/// Started and cancelled flags of one job. Clones share the flags.
///
/// ```
/// use pageflow_scheduler::CancellationToken;
///
/// let token = CancellationToken::new();
/// let worker = token.clone();
///
/// token.cancel();
/// assert!(!worker.start());
/// assert!(worker.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    state: Arc<AtomicU8>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.state.fetch_or(CANCELLED, Ordering::AcqRel);
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) & CANCELLED != 0
    }

    /// Mark the job as picked up by a worker.
    ///
    /// Returns `false` when the job was cancelled before it started and
    /// should be skipped.
    pub fn start(&self) -> bool {
        self.state.fetch_or(STARTED, Ordering::AcqRel) & CANCELLED == 0
    }

    pub fn is_started(&self) -> bool {
        self.state.load(Ordering::Acquire) & STARTED != 0
    }
}

/// Tokens of live jobs keyed by id, so every job can be cancelled in one
/// sweep.
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    tokens: Mutex<HashMap<JobId, CancellationToken>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn tokens(&self) -> MutexGuard<'_, HashMap<JobId, CancellationToken>> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create the token for a new job.
    pub fn register(&self, id: JobId) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens().insert(id, token.clone());
        token
    }

    /// Cancel one job and forget it. Returns `false` for unknown ids.
    pub fn cancel(&self, id: JobId) -> bool {
        match self.tokens().remove(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel and forget every job. Returns how many there were.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self.tokens().drain().collect();
        for (_, token) in &drained {
            token.cancel();
        }
        drained.len()
    }

    /// Forget a finished job; its token is left as is.
    pub fn unregister(&self, id: JobId) -> bool {
        self.tokens().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.tokens().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens().is_empty()
    }
}

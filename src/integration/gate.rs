//! Single-flight gate in front of the inference backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

const IDLE: u8 = 0;
const BUSY: u8 = 1;

/// Gate state. The only transitions are Idle -> Busy on admission and
/// Busy -> Idle when the in-flight ticket is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Idle,
    Busy,
}

/// Result of offering a frame to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Dropped,
}

/// Admission counters, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GateStats {
    pub admitted: u64,
    pub dropped: u64,
}

#[derive(Debug)]
struct GateInner {
    state: AtomicU8,
    admitted: AtomicU64,
    dropped: AtomicU64,
}

/// Allows at most one inference to be outstanding.
///
/// Cloning yields another handle to the same gate.
#[derive(Debug, Clone)]
pub struct InferenceGate {
    inner: Arc<GateInner>,
}

impl Default for InferenceGate {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceGate {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(GateInner {
                state: AtomicU8::new(IDLE),
                admitted: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Try the Idle -> Busy transition. Never blocks.
    ///
    /// On success the returned ticket holds the gate busy until it is
    /// completed or dropped.
    pub fn try_admit(&self) -> Option<InFlight> {
        match self
            .inner
            .state
            .compare_exchange(IDLE, BUSY, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                self.inner.admitted.fetch_add(1, Ordering::Relaxed);
                Some(InFlight {
                    inner: Arc::clone(&self.inner),
                })
            }
            Err(_) => {
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn state(&self) -> GateState {
        match self.inner.state.load(Ordering::Acquire) {
            IDLE => GateState::Idle,
            _ => GateState::Busy,
        }
    }

    pub fn stats(&self) -> GateStats {
        GateStats {
            admitted: self.inner.admitted.load(Ordering::Relaxed),
            dropped: self.inner.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Proof that an inference is outstanding.
///
/// Releasing happens on drop, so a failing or panicking backend can never
/// leave the gate stuck busy.
#[derive(Debug)]
#[must_use = "dropping the ticket immediately releases the gate"]
pub struct InFlight {
    inner: Arc<GateInner>,
}

impl InFlight {
    /// Busy -> Idle.
    pub fn complete(self) {
        drop(self);
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.inner.state.store(IDLE, Ordering::Release);
    }
}

//! Tuner module - Twiddle gain search and its cancellation flag

pub mod twiddle;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use twiddle::{Phase, StopReason, TuneOutcome, Twiddle, TwiddleSettings};

/// Shared abort flag, tripped from a signal handler and polled between evaluations.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

//! # Task Execution Context
//!
//! What a background phase may use while it runs on a worker thread. The context
//! is created by the worker for each run and dropped when the phase returns.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use log::trace;
use web_time::{Duration, Instant};

use super::task::TaskError;

/// Shared flag asking background phases to stop before they mutate anything.
///
/// Cancellation is cooperative: a phase that has already started its mutation
/// runs to completion regardless.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation for every holder of this token.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Clears a previous cancellation request.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    /// Returns `true` once `cancel` has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Ambient facilities for one background phase.
#[derive(Debug)]
pub struct TaskExecutionContext {
    worker_index: usize,
    cancellation: CancellationToken,
    progress: f32,
    started: Instant,
}

impl TaskExecutionContext {
    /// Creates the context for a phase about to run on `worker_index`.
    pub fn new(worker_index: usize, cancellation: CancellationToken) -> Self {
        Self {
            worker_index,
            cancellation,
            progress: 0.0,
            started: Instant::now(),
        }
    }

    /// Index of the worker thread running the phase.
    pub fn worker_index(&self) -> usize {
        self.worker_index
    }

    /// Returns `true` if the pool asked pending work to stop.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Fails with `TaskError::Cancelled` if cancellation was requested.
    ///
    /// Call before starting a mutation, never halfway through one.
    pub fn check_cancelled(&self) -> Result<(), TaskError> {
        if self.is_cancelled() {
            Err(TaskError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Records how far the phase has got, clamped to `0.0..=1.0`.
    pub fn report_progress(&mut self, fraction: f32) {
        self.progress = if fraction.is_nan() {
            self.progress
        } else {
            fraction.clamp(0.0, 1.0)
        };
        trace!(
            "worker {} progress {:.0}%",
            self.worker_index,
            self.progress * 100.0
        );
    }

    /// Last reported progress.
    pub fn progress(&self) -> f32 {
        self.progress
    }

    /// Time since the phase started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

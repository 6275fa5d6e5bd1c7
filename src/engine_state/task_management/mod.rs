//! # Task Management System
//!
//! This module runs two-phase tasks: the background phase on a pool of worker
//! threads, the main-thread phase on whichever thread pumps the manager (the
//! render thread).
//!
//! ## Architecture Overview
//!
//! - `TaskManager`: Central coordinator for task distribution and worker management
//! - `TaskUnit`: A published task plus its lifecycle state
//! - `TaskChannel`: Communication channel between the main thread and one worker
//! - `TaskReport`: What one call to `process_completed_tasks()` finished or dropped
//!
//! ## Task Lifecycle
//! 1. Tasks are wrapped in a `TaskUnit` and published via `TaskManager::publish_task()`
//! 2. The manager distributes units to worker channels using round-robin
//! 3. Workers run the background phase and send the unit back on a result
//!    channel shared by every worker
//! 4. `process_completed_tasks()` runs the main-thread phase of every unit whose
//!    background phase succeeded, and reports every unit whose phase failed
//! 5. Units whose main-thread phase is not yet complete are retried on the next
//!    call, up to `max_commit_retries` times
//!
//! ## Ordering
//! - A unit's background phase always finishes before its main-thread phase
//!   starts: the unit itself travels through the channel
//! - Within one channel, units complete in publish order
//! - Main-thread phases run in the order background phases finished, whichever
//!   worker ran them
//! - No order is promised between the background phases of different channels
//!
//! ## Example Usage
//! ```
//! use terrain_area_tasks::config::TaskManagerConfig;
//! use terrain_area_tasks::engine_state::{
//!     rendering::FrameDirtyRegions, task_management::TaskManager,
//! };
//!
//! let mut task_manager = TaskManager::new(&TaskManagerConfig::default()).unwrap();
//! let mut sink = FrameDirtyRegions::new(64.0);
//!
//! // In your main/game loop:
//! sink.begin_frame();
//! let report = task_manager.process_completed_tasks(&mut sink);
//! task_manager.process_queued_tasks();
//! let batch = sink.drain();
//! assert!(report.is_empty() && batch.is_empty());
//! ```

pub mod execution_context;
pub mod task;

use std::collections::VecDeque;
use std::io;
use std::sync::mpsc::{channel, Receiver, SendError, Sender};
use std::thread::{self, JoinHandle};

use log::{debug, error, info, warn};

use crate::config::TaskManagerConfig;
use crate::engine_state::rendering::DirtyRegionSink;
use execution_context::{CancellationToken, TaskExecutionContext};
use task::{Task, TaskError, TaskId, TaskUnit};

/// A unit coming back from a worker, with the outcome of its background phase.
struct CompletedTask {
    worker_index: usize,
    unit: TaskUnit,
    outcome: Result<(), TaskError>,
}

/// A communication channel between the main thread and a worker thread.
///
/// Each channel is backed by one OS thread. The worker exits once the task
/// sender is dropped.
struct TaskChannel {
    task_sender: Sender<TaskUnit>,
    num_tasks_in_flight: usize,
    worker: JoinHandle<()>,
}

/// A task whose background phase failed, or whose commit was rejected.
#[derive(Debug)]
pub struct TaskFailure {
    /// The failed task.
    pub id: TaskId,
    /// Its log name.
    pub task_name: &'static str,
    /// Why it failed.
    pub error: TaskError,
}

/// Outcome of one `process_completed_tasks()` call.
#[derive(Debug, Default)]
pub struct TaskReport {
    /// Tasks whose main-thread phase completed.
    pub completed: Vec<TaskId>,
    /// Tasks whose main-thread phase asked to run again next frame.
    pub deferred: Vec<TaskId>,
    /// Tasks that failed; none of them ran a main-thread phase.
    pub failed: Vec<TaskFailure>,
    /// Tasks whose commit was abandoned after `max_commit_retries` retries.
    pub dropped: Vec<TaskId>,
}

impl TaskReport {
    /// Returns `true` if nothing finished, failed or was deferred.
    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
            && self.deferred.is_empty()
            && self.failed.is_empty()
            && self.dropped.is_empty()
    }

    /// Looks up the failure recorded for `id`.
    pub fn failure(&self, id: TaskId) -> Option<&TaskFailure> {
        self.failed.iter().find(|failure| failure.id == id)
    }

    /// Ids that left the manager for good, whatever the outcome.
    pub fn finished(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.completed
            .iter()
            .copied()
            .chain(self.failed.iter().map(|failure| failure.id))
            .chain(self.dropped.iter().copied())
    }

    fn absorb(&mut self, other: TaskReport) {
        self.completed.extend(other.completed);
        self.deferred.extend(other.deferred);
        self.failed.extend(other.failed);
        self.dropped.extend(other.dropped);
    }
}

/// Manages a pool of worker threads and coordinates two-phase task execution.
///
/// The `TaskManager` is responsible for:
/// - Creating and managing worker threads
/// - Distributing tasks across available workers
/// - Running main-thread phases of tasks whose background phase succeeded
/// - Handling task queuing when all workers are busy
///
/// # Thread Safety
/// The manager itself lives on the main thread. Only `TaskUnit`s cross to the
/// workers, and the sink passed to `process_completed_tasks()` never does.
pub struct TaskManager {
    channels: Vec<TaskChannel>,
    /// Shared by every worker, so results arrive in completion order
    result_receiver: Receiver<CompletedTask>,
    queued_tasks: VecDeque<TaskUnit>,
    pending_commits: VecDeque<TaskUnit>,
    current_channel: usize,
    next_task_id: u64,
    max_tasks_in_flight: usize,
    max_commit_retries: u32,
    cancellation: CancellationToken,
}

impl TaskManager {
    /// Creates a new `TaskManager` and spawns its worker threads.
    ///
    /// # Errors
    /// Returns the OS error if a worker thread cannot be spawned.
    pub fn new(config: &TaskManagerConfig) -> io::Result<Self> {
        let cancellation = CancellationToken::new();
        let mut channels = Vec::with_capacity(config.workers);
        let (result_tx, result_rx) = channel::<CompletedTask>();

        info!(
            "Starting {} terrain task workers (available parallelism: {:?})",
            config.workers,
            thread::available_parallelism()
        );

        for worker_index in 0..config.workers {
            let (task_tx, task_rx) = channel::<TaskUnit>();
            let result_tx = result_tx.clone();
            let worker_cancellation = cancellation.clone();

            let task_closure = move || {
                while let Ok(mut unit) = task_rx.recv() {
                    let mut context =
                        TaskExecutionContext::new(worker_index, worker_cancellation.clone());
                    let outcome = unit.run_background(&mut context);
                    debug!(
                        "{} ({}) background phase finished on worker {} in {:?}",
                        unit.id(),
                        unit.name(),
                        worker_index,
                        context.elapsed()
                    );
                    let completed = CompletedTask {
                        worker_index,
                        unit,
                        outcome,
                    };
                    if result_tx.send(completed).is_err() {
                        break;
                    }
                }
                debug!("Terrain task worker {} exiting", worker_index);
            };

            let worker = thread::Builder::new()
                .name(format!("terrain-task-{worker_index}"))
                .spawn(task_closure)?;

            channels.push(TaskChannel {
                task_sender: task_tx,
                num_tasks_in_flight: 0,
                worker,
            });
        }

        Ok(TaskManager {
            channels,
            result_receiver: result_rx,
            queued_tasks: VecDeque::new(),
            pending_commits: VecDeque::new(),
            current_channel: 0,
            next_task_id: 1,
            max_tasks_in_flight: config.max_tasks_in_flight.max(1),
            max_commit_retries: config.max_commit_retries,
            cancellation,
        })
    }

    /// Attempts to send a unit to a specific worker channel.
    ///
    /// Returns the unit back if the worker has disconnected.
    fn try_send_task(&mut self, unit: TaskUnit, channel_idx: usize) -> Result<(), TaskUnit> {
        match self.channels[channel_idx].task_sender.send(unit) {
            Ok(()) => {
                self.channels[channel_idx].num_tasks_in_flight += 1;
                Ok(())
            }
            Err(SendError(unit)) => Err(unit),
        }
    }

    /// Finds a worker channel that can accept another unit.
    ///
    /// Round-robin from the last used channel, skipping channels that already hold
    /// `max_tasks_in_flight` units.
    fn find_available_channel(&self) -> Option<usize> {
        if self.channels.is_empty() {
            return None;
        }

        let start_channel = self.current_channel % self.channels.len();
        let mut current = start_channel;
        loop {
            if self.channels[current].num_tasks_in_flight < self.max_tasks_in_flight {
                return Some(current);
            }
            current = (current + 1) % self.channels.len();
            if current == start_channel {
                return None;
            }
        }
    }

    /// Publishes a new task for execution.
    ///
    /// The task starts as soon as a worker is free, or is queued if all workers are
    /// busy. Queued tasks are dispatched by `process_queued_tasks()`.
    ///
    /// # Returns
    /// The id the task is reported under.
    pub fn publish_task(&mut self, task: Box<dyn Task>) -> TaskId {
        let id = TaskId(self.next_task_id);
        self.next_task_id += 1;

        let unit = TaskUnit::new(id, task);
        debug!("Publishing {} ({})", id, unit.name());

        match self.find_available_channel() {
            Some(channel_idx) => match self.try_send_task(unit, channel_idx) {
                Ok(()) => {
                    self.current_channel = (channel_idx + 1) % self.channels.len();
                }
                Err(unit) => {
                    warn!("Worker {} disconnected, queueing {}", channel_idx, id);
                    self.queued_tasks.push_back(unit);
                }
            },
            None => self.queued_tasks.push_back(unit),
        }
        id
    }

    /// Dispatches queued tasks to free workers, oldest first.
    ///
    /// Call once per frame.
    pub fn process_queued_tasks(&mut self) {
        while !self.queued_tasks.is_empty() {
            let Some(channel_idx) = self.find_available_channel() else {
                break;
            };
            let Some(unit) = self.queued_tasks.pop_front() else {
                break;
            };
            match self.try_send_task(unit, channel_idx) {
                Ok(()) => {
                    self.current_channel = (channel_idx + 1) % self.channels.len();
                }
                Err(unit) => {
                    // Channel is disconnected, put task back and stop processing
                    self.queued_tasks.push_front(unit);
                    break;
                }
            }
        }
    }

    /// Runs main-thread phases for everything the workers have finished.
    ///
    /// Must be called from the main thread. Units deferred on an earlier call are
    /// retried first, then completed units are committed in the order their
    /// background phases finished.
    /// Background failures are logged and reported, never committed.
    pub fn process_completed_tasks(&mut self, sink: &mut dyn DirtyRegionSink) -> TaskReport {
        let mut report = TaskReport::default();

        let retries: Vec<TaskUnit> = self.pending_commits.drain(..).collect();
        for unit in retries {
            let outcome = self.commit(unit, sink);
            report.absorb(outcome);
        }

        while let Ok(completed) = self.result_receiver.try_recv() {
            let CompletedTask {
                worker_index,
                unit,
                outcome,
            } = completed;
            if let Some(channel) = self.channels.get_mut(worker_index) {
                channel.num_tasks_in_flight = channel.num_tasks_in_flight.saturating_sub(1);
            }
            match outcome {
                Ok(()) => {
                    let outcome = self.commit(unit, sink);
                    report.absorb(outcome);
                }
                Err(error) => {
                    warn!("{} ({}) failed: {}", unit.id(), unit.name(), error);
                    report.failed.push(TaskFailure {
                        id: unit.id(),
                        task_name: unit.name(),
                        error,
                    });
                }
            }
        }

        report
    }

    fn commit(&mut self, mut unit: TaskUnit, sink: &mut dyn DirtyRegionSink) -> TaskReport {
        let mut report = TaskReport::default();
        match unit.run_main_thread(sink) {
            Ok(true) => report.completed.push(unit.id()),
            Ok(false) if unit.commit_attempts() > self.max_commit_retries => {
                error!(
                    "{} ({}) dropped after {} commit attempts; its visual update is lost",
                    unit.id(),
                    unit.name(),
                    unit.commit_attempts()
                );
                report.dropped.push(unit.id());
            }
            Ok(false) => {
                report.deferred.push(unit.id());
                self.pending_commits.push_back(unit);
            }
            Err(error) => {
                error!("{} ({}) could not commit: {}", unit.id(), unit.name(), error);
                report.failed.push(TaskFailure {
                    id: unit.id(),
                    task_name: unit.name(),
                    error,
                });
            }
        }
        report
    }

    /// Number of units sent to workers and not yet collected.
    pub fn in_flight(&self) -> usize {
        self.channels
            .iter()
            .map(|channel| channel.num_tasks_in_flight)
            .sum()
    }

    /// Number of units waiting for a free worker.
    pub fn queued(&self) -> usize {
        self.queued_tasks.len()
    }

    /// Number of units waiting to retry their main-thread phase.
    pub fn awaiting_commit(&self) -> usize {
        self.pending_commits.len()
    }

    /// Returns `true` when nothing is queued, running or awaiting commit.
    pub fn is_idle(&self) -> bool {
        self.queued() == 0 && self.in_flight() == 0 && self.awaiting_commit() == 0
    }

    /// Asks every background phase that has not started mutating to fail with
    /// `TaskError::Cancelled`.
    pub fn cancel_pending(&self) {
        info!("Cancelling pending terrain tasks");
        self.cancellation.cancel();
    }

    /// Lets tasks published after a `cancel_pending()` run normally again.
    pub fn resume(&self) {
        self.cancellation.reset();
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        for channel in self.channels.drain(..) {
            let TaskChannel {
                task_sender,
                worker,
                ..
            } = channel;
            // Closing the task channel ends the worker's receive loop
            drop(task_sender);
            if worker.join().is_err() {
                error!("Terrain task worker panicked outside of a task");
            }
        }
    }
}

//! # Task System Core Traits
//!
//! This module defines the two-phase unit of work the task pool runs.
//!
//! ## Core Components
//! - `Task`: A unit of work with a background phase and a main-thread phase
//! - `TaskState`: Where a task is in its lifecycle
//! - `TaskUnit`: The scheduler's wrapper that enforces the lifecycle
//!
//! ## Task Lifecycle
//! 1. A `Task` is created and published via `TaskManager::publish_task()`
//! 2. `execute_in_background()` runs once on a worker thread
//! 3. If it succeeded, `execute_in_main_thread()` runs on the main thread
//! 4. The main-thread phase is repeated on later frames until it reports completion
//!
//! ```text
//! Created -> BackgroundRunning -> BackgroundDone -> MainThreadRunning -> Complete
//!                  |
//!                  +-> Failed
//! ```
//!
//! ## Thread Safety
//! - `Task` must be `Send` to move to a worker and back
//! - The background phase must not touch main-thread-only state; the sink is only
//!   reachable from the main-thread phase

use std::{
    any::Any,
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
};

use thiserror::Error;

use super::execution_context::TaskExecutionContext;
use crate::engine_state::{rendering::DirtyRegionSink, terrain::TerrainError};

/// Identifies a published task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Errors that end a task.
#[derive(Error, Debug)]
pub enum TaskError {
    /// The terrain store refused the edit.
    #[error(transparent)]
    Terrain(#[from] TerrainError),
    /// The pool asked pending work to stop before the mutation began.
    #[error("task cancelled before its mutation started")]
    Cancelled,
    /// The background phase panicked.
    #[error("background phase panicked: {0}")]
    Panicked(String),
    /// A phase was invoked out of order or twice.
    #[error("illegal task state transition {from} -> {to}")]
    InvalidTransition {
        /// State the task was in.
        from: TaskState,
        /// State the call tried to enter.
        to: TaskState,
    },
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Constructed, not yet scheduled on a worker.
    Created,
    /// Background phase in progress.
    BackgroundRunning,
    /// Background phase succeeded; waiting for the main thread.
    BackgroundDone,
    /// Main-thread phase started but not yet complete.
    MainThreadRunning,
    /// Both phases done.
    Complete,
    /// Background phase failed; the main-thread phase will never run.
    Failed,
}

impl TaskState {
    /// Returns `true` if `next` directly follows this state.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (TaskState::Created, TaskState::BackgroundRunning)
                | (TaskState::BackgroundRunning, TaskState::BackgroundDone)
                | (TaskState::BackgroundRunning, TaskState::Failed)
                | (TaskState::BackgroundDone, TaskState::MainThreadRunning)
                | (TaskState::MainThreadRunning, TaskState::Complete)
        )
    }

    /// Returns `true` for `Complete` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Complete | TaskState::Failed)
    }

    fn name(self) -> &'static str {
        match self {
            TaskState::Created => "Created",
            TaskState::BackgroundRunning => "BackgroundRunning",
            TaskState::BackgroundDone => "BackgroundDone",
            TaskState::MainThreadRunning => "MainThreadRunning",
            TaskState::Complete => "Complete",
            TaskState::Failed => "Failed",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A two-phase unit of work.
///
/// The scheduler calls `execute_in_background` exactly once, on a worker thread,
/// and then, only if it returned `Ok`, calls `execute_in_main_thread` on the main
/// thread until it returns `true`. The two are never called concurrently.
pub trait Task: Send {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Does the heavy work off the main thread.
    ///
    /// Must not touch anything only the main thread may use. Returning an error
    /// is terminal: the task becomes `Failed` and its main-thread phase never runs.
    fn execute_in_background(&mut self, context: &mut TaskExecutionContext)
        -> Result<(), TaskError>;

    /// Commits render-thread side effects.
    ///
    /// Returns `true` when the task is fully complete, `false` to be called again
    /// next frame.
    fn execute_in_main_thread(&mut self, sink: &mut dyn DirtyRegionSink) -> bool;
}

/// A published task and its lifecycle state.
///
/// Every phase call goes through a `TaskUnit`, which rejects calls the state
/// machine does not allow.
pub struct TaskUnit {
    id: TaskId,
    task: Box<dyn Task>,
    state: TaskState,
    commit_attempts: u32,
    progress: f32,
}

impl TaskUnit {
    /// Wraps a freshly constructed task.
    pub fn new(id: TaskId, task: Box<dyn Task>) -> Self {
        Self {
            id,
            task,
            state: TaskState::Created,
            commit_attempts: 0,
            progress: 0.0,
        }
    }

    /// The task's id.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// The task's log name.
    pub fn name(&self) -> &'static str {
        self.task.name()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TaskState {
        self.state
    }

    /// How many times the main-thread phase has been invoked.
    pub fn commit_attempts(&self) -> u32 {
        self.commit_attempts
    }

    /// Progress the background phase last reported.
    pub fn progress(&self) -> f32 {
        self.progress
    }

    fn transition(&mut self, next: TaskState) -> Result<(), TaskError> {
        if !self.state.can_transition_to(next) {
            return Err(TaskError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Runs the background phase.
    ///
    /// A panic inside the phase is caught and reported as `TaskError::Panicked`,
    /// leaving the calling worker thread alive.
    pub fn run_background(&mut self, context: &mut TaskExecutionContext) -> Result<(), TaskError> {
        self.transition(TaskState::BackgroundRunning)?;

        let task = &mut self.task;
        let outcome = catch_unwind(AssertUnwindSafe(|| task.execute_in_background(context)))
            .unwrap_or_else(|payload| Err(TaskError::Panicked(panic_message(payload))));
        self.progress = context.progress();

        match outcome {
            Ok(()) => self.transition(TaskState::BackgroundDone),
            Err(error) => {
                self.transition(TaskState::Failed)?;
                Err(error)
            }
        }
    }

    /// Runs the main-thread phase once.
    ///
    /// Returns whether the task is now complete. Fails without calling the task if
    /// the background phase has not succeeded or the task already completed.
    pub fn run_main_thread(&mut self, sink: &mut dyn DirtyRegionSink) -> Result<bool, TaskError> {
        if self.state != TaskState::MainThreadRunning {
            self.transition(TaskState::MainThreadRunning)?;
        }
        self.commit_attempts += 1;

        let complete = self.task.execute_in_main_thread(sink);
        if complete {
            self.transition(TaskState::Complete)?;
        }
        Ok(complete)
    }
}

impl fmt::Debug for TaskUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskUnit")
            .field("id", &self.id)
            .field("name", &self.task.name())
            .field("state", &self.state)
            .field("commit_attempts", &self.commit_attempts)
            .finish()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::{
        rendering::FrameDirtyRegions, task_management::execution_context::CancellationToken,
    };

    /// Counts its phase calls; fails or panics on request.
    struct ScriptedTask {
        fail: bool,
        panic: bool,
        commits_needed: u32,
        background_calls: u32,
        main_calls: u32,
    }

    impl ScriptedTask {
        fn new() -> Self {
            Self {
                fail: false,
                panic: false,
                commits_needed: 1,
                background_calls: 0,
                main_calls: 0,
            }
        }
    }

    impl Task for ScriptedTask {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn execute_in_background(
            &mut self,
            context: &mut TaskExecutionContext,
        ) -> Result<(), TaskError> {
            self.background_calls += 1;
            if self.panic {
                panic!("scripted task panicked");
            }
            if self.fail {
                return Err(TaskError::Cancelled);
            }
            context.report_progress(1.0);
            Ok(())
        }

        fn execute_in_main_thread(&mut self, _sink: &mut dyn DirtyRegionSink) -> bool {
            self.main_calls += 1;
            self.main_calls >= self.commits_needed
        }
    }

    fn context() -> TaskExecutionContext {
        TaskExecutionContext::new(0, CancellationToken::new())
    }

    #[test]
    fn test_only_forward_transitions_allowed() {
        use TaskState::*;
        let all = [
            Created,
            BackgroundRunning,
            BackgroundDone,
            MainThreadRunning,
            Complete,
            Failed,
        ];
        let allowed = [
            (Created, BackgroundRunning),
            (BackgroundRunning, BackgroundDone),
            (BackgroundRunning, Failed),
            (BackgroundDone, MainThreadRunning),
            (MainThreadRunning, Complete),
        ];
        for from in all {
            for to in all {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
        assert!(Complete.is_terminal());
        assert!(Failed.is_terminal());
        assert!(!BackgroundDone.is_terminal());
    }

    #[test]
    fn test_happy_path_reaches_complete() {
        let mut unit = TaskUnit::new(TaskId(1), Box::new(ScriptedTask::new()));
        let mut sink = FrameDirtyRegions::new(10.0);

        unit.run_background(&mut context()).unwrap();
        assert_eq!(unit.state(), TaskState::BackgroundDone);
        assert_eq!(unit.progress(), 1.0);

        assert!(unit.run_main_thread(&mut sink).unwrap());
        assert_eq!(unit.state(), TaskState::Complete);
        assert_eq!(unit.commit_attempts(), 1);
    }

    #[test]
    fn test_main_thread_before_background_rejected() {
        let mut unit = TaskUnit::new(TaskId(1), Box::new(ScriptedTask::new()));
        let mut sink = FrameDirtyRegions::new(10.0);

        let result = unit.run_main_thread(&mut sink);

        assert!(matches!(
            result,
            Err(TaskError::InvalidTransition {
                from: TaskState::Created,
                to: TaskState::MainThreadRunning,
            })
        ));
        assert_eq!(unit.commit_attempts(), 0);
    }

    #[test]
    fn test_failed_task_never_commits() {
        let mut task = ScriptedTask::new();
        task.fail = true;
        let mut unit = TaskUnit::new(TaskId(1), Box::new(task));
        let mut sink = FrameDirtyRegions::new(10.0);

        assert!(matches!(
            unit.run_background(&mut context()),
            Err(TaskError::Cancelled)
        ));
        assert_eq!(unit.state(), TaskState::Failed);
        assert!(matches!(
            unit.run_main_thread(&mut sink),
            Err(TaskError::InvalidTransition {
                from: TaskState::Failed,
                ..
            })
        ));
    }

    #[test]
    fn test_background_runs_once() {
        let mut unit = TaskUnit::new(TaskId(1), Box::new(ScriptedTask::new()));
        unit.run_background(&mut context()).unwrap();
        assert!(matches!(
            unit.run_background(&mut context()),
            Err(TaskError::InvalidTransition {
                from: TaskState::BackgroundDone,
                to: TaskState::BackgroundRunning,
            })
        ));
    }

    #[test]
    fn test_panic_becomes_failure() {
        let mut task = ScriptedTask::new();
        task.panic = true;
        let mut unit = TaskUnit::new(TaskId(9), Box::new(task));

        let result = unit.run_background(&mut context());

        match result {
            Err(TaskError::Panicked(message)) => assert_eq!(message, "scripted task panicked"),
            other => panic!("expected a panic failure, got {other:?}"),
        }
        assert_eq!(unit.state(), TaskState::Failed);
    }

    #[test]
    fn test_multi_step_commit_stays_running() {
        let mut task = ScriptedTask::new();
        task.commits_needed = 3;
        let mut unit = TaskUnit::new(TaskId(1), Box::new(task));
        let mut sink = FrameDirtyRegions::new(10.0);
        unit.run_background(&mut context()).unwrap();

        assert!(!unit.run_main_thread(&mut sink).unwrap());
        assert_eq!(unit.state(), TaskState::MainThreadRunning);
        assert!(!unit.run_main_thread(&mut sink).unwrap());
        assert!(unit.run_main_thread(&mut sink).unwrap());
        assert_eq!(unit.state(), TaskState::Complete);
        assert_eq!(unit.commit_attempts(), 3);

        assert!(unit.run_main_thread(&mut sink).is_err());
    }
}

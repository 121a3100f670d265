use crate::{
    config::Config,
    types::{TaskKey, TaskOutput},
};
use core::{fmt::Debug, hash::Hash};

/// A single unit of computation whose dependencies are discovered at runtime.
///
/// The executor calls `discover` one or more times while the task is being
/// explored. Each call returns every dependency the task currently needs;
/// later calls may return more once `deps.read(..)` starts yielding values,
/// which models data-dependent dependency graphs. Once every declared
/// dependency has completed and `discover` has seen all of them, `compute` is
/// invoked exactly once.
///
/// Two tasks with equal `key` are the same computation: the executor keeps
/// whichever instance it saw first and runs it at most once.
pub trait Task<C: Config>: Debug + Send + Sync + 'static {
    /// Task identity, used for memoization and cycle detection.
    type Key: Clone + Eq + Hash + Debug + Send + Sync + 'static;
    /// Task output type.
    type Output: Send + Sync + 'static;
    /// Error returned by a failing `compute`.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Identity of this task.
    fn key(&self) -> Self::Key;

    /// Declare the dependencies this task needs, given the outputs of those
    /// that have already completed.
    ///
    /// Must be pure with respect to `deps`. The default declares none.
    fn discover(&self, deps: &impl DepsApi<C>) -> Vec<C::Task> {
        let _ = deps;
        Vec::new()
    }

    /// Compute the task's output.
    ///
    /// Every dependency returned by the last `discover` call is readable
    /// through `deps`.
    ///
    /// # Errors
    /// Any error is recorded on this task and short-circuits its dependents.
    fn compute(&self, deps: &impl DepsApi<C>) -> Result<Self::Output, Self::Error>;
}

/// Read access to the outputs of a task's completed dependencies.
pub trait DepsApi<C: Config> {
    /// Output of the dependency with the given key, if it was declared by the
    /// current task and has completed successfully.
    fn read(&self, key: &TaskKey<C>) -> Option<&TaskOutput<C>>;
}

/// Scheduling state of a task.
///
/// States only move forward, except that a task waiting on its
/// dependencies re-enters `Exploring` each time a worker picks it up again.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TaskState {
    /// Known to the executor but not yet claimed by a worker.
    NotStarted = 0,
    /// A worker is running its discovery step.
    Exploring = 1,
    /// Queued behind unresolved dependencies.
    WaitingDeps = 2,
    /// A worker is running its compute step.
    Executing = 3,
    /// Computed successfully.
    Done = 4,
    /// Failed by its own compute, a dependency, or a cycle.
    Failed = 5,
    /// Cancelled by executor shutdown before it executed.
    Cancelled = 6,
}

impl TaskState {
    pub(crate) const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::NotStarted,
            1 => Self::Exploring,
            2 => Self::WaitingDeps,
            3 => Self::Executing,
            4 => Self::Done,
            5 => Self::Failed,
            _ => Self::Cancelled,
        }
    }

    /// Whether the task's result is final.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }

    /// Whether a worker has taken the task past `NotStarted` without
    /// finishing it yet.
    #[must_use]
    pub const fn is_claimed(self) -> bool {
        matches!(self, Self::Exploring | Self::WaitingDeps | Self::Executing)
    }
}

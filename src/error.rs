use std::{error::Error as StdError, sync::Arc};
use thiserror::Error;

/// Failure recorded in a task's result cell.
///
/// Every variant names the task it is recorded on or the tasks that caused
/// it. A task that fails because one of its dependencies failed carries the
/// root cause rather than the immediate dependency's own wrapper, so the
/// error seen through any future points at the task that actually broke.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum TaskError<K> {
    /// The task's own `compute` returned an error.
    #[error("task {task:?} failed: {source}")]
    Compute {
        /// The failing task.
        task: K,
        /// Error returned by `compute`.
        source: Arc<dyn StdError + Send + Sync + 'static>,
    },
    /// The task's `discover` or `compute` panicked.
    #[error("task {task:?} panicked: {message}")]
    Panicked {
        /// The panicking task.
        task: K,
        /// Panic payload rendered as text.
        message: String,
    },
    /// The task is part of a dependency cycle.
    #[error("cyclic dependency: {cycle:?}")]
    Cycle {
        /// Keys along the cycle, each depending on the next and the last on
        /// the first.
        cycle: Vec<K>,
    },
    /// The task was cancelled by executor shutdown before it executed.
    #[error("task {task:?} was cancelled by executor shutdown")]
    Cancelled {
        /// The cancelled task.
        task: K,
    },
    /// A dependency of the task failed, so the task never computed.
    #[error("task {task:?} depends on failed task {origin:?}")]
    Dependency {
        /// The task that did not compute.
        task: K,
        /// The task where the failure originated.
        origin: K,
        /// The originating failure. Never itself a `Dependency`.
        cause: Arc<TaskError<K>>,
    },
}

impl<K: Clone> TaskError<K> {
    /// The failure that started the chain this error belongs to.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Dependency { cause, .. } => cause.root_cause(),
            other => other,
        }
    }

    /// Key of the task where the failure originated.
    ///
    /// For a cycle this is the task that detected it.
    #[must_use]
    pub fn origin(&self) -> Option<&K> {
        match self {
            Self::Compute { task, .. } | Self::Panicked { task, .. } | Self::Cancelled { task } => {
                Some(task)
            }
            Self::Cycle { cycle } => cycle.first(),
            Self::Dependency { origin, .. } => Some(origin),
        }
    }

    /// Whether the root cause is a dependency cycle.
    #[must_use]
    pub fn is_cycle(&self) -> bool {
        matches!(self.root_cause(), Self::Cycle { .. })
    }

    /// Whether the root cause is executor shutdown.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root_cause(), Self::Cancelled { .. })
    }

    /// Error to record on `task` when one of its dependencies failed with
    /// `self`.
    pub(crate) fn propagate_to(&self, task: K) -> Self {
        let root = self.root_cause();
        match root.origin() {
            Some(origin) => Self::Dependency {
                task,
                origin: origin.clone(),
                cause: Arc::new(root.clone()),
            },
            // Only an empty cycle has no origin, and cycles are never empty.
            None => root.clone(),
        }
    }
}

/// Error returned when submitting work to an executor.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SubmitError {
    /// The executor has been shut down and accepts no more tasks.
    #[error("executor has been shut down")]
    Shutdown,
}

/// Error returned when building an executor.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BuildError {
    /// The worker thread pool could not be created.
    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

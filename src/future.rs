use crate::{
    config::Config,
    executor::TaskNode,
    sync::Arc,
    task::TaskState,
    types::{TaskFailure, TaskKey, TaskOutcome, TaskOutput},
};
use core::fmt;

/// Caller-side handle to the eventual outcome of a submitted task.
///
/// Cloning is cheap; every clone, and every future obtained for the same key,
/// observes the same outcome. Reads after completion do not block.
#[must_use]
pub struct TaskFuture<C: Config> {
    node: Arc<TaskNode<C>>,
}

impl<C: Config> fmt::Debug for TaskFuture<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFuture")
            .field("key", self.node.key())
            .field("state", &self.node.state())
            .finish()
    }
}

impl<C: Config> Clone for TaskFuture<C> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
        }
    }
}

fn to_result<C: Config>(outcome: &TaskOutcome<C>) -> Result<&TaskOutput<C>, TaskFailure<C>> {
    outcome.as_ref().map_err(Clone::clone)
}

impl<C: Config> TaskFuture<C> {
    pub(crate) fn new(node: Arc<TaskNode<C>>) -> Self {
        Self { node }
    }

    /// Key of the task behind this future.
    #[must_use]
    pub fn key(&self) -> &TaskKey<C> {
        self.node.key()
    }

    /// Current scheduling state of the task.
    #[must_use]
    pub fn state(&self) -> TaskState {
        self.node.state()
    }

    /// Whether the outcome is available.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.node.cell().is_set()
    }

    /// Block until the task finishes and return its output.
    ///
    /// Must not be called from inside a task: a worker blocked here cannot
    /// run the task it waits for.
    ///
    /// # Errors
    /// The failure recorded on the task.
    pub fn get(&self) -> Result<&TaskOutput<C>, TaskFailure<C>> {
        to_result::<C>(self.node.cell().wait())
    }

    /// The outcome if the task has finished, without blocking.
    #[must_use]
    pub fn try_get(&self) -> Option<Result<&TaskOutput<C>, TaskFailure<C>>> {
        self.node.cell().get().map(to_result::<C>)
    }

    /// Block until the task finishes or `timeout` elapses.
    ///
    /// Returns `None` on timeout; the task keeps running.
    #[cfg(not(feature = "loom"))]
    #[must_use]
    pub fn get_timeout(
        &self,
        timeout: core::time::Duration,
    ) -> Option<Result<&TaskOutput<C>, TaskFailure<C>>> {
        self.node.cell().wait_timeout(timeout).map(to_result::<C>)
    }
}

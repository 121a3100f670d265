use crate::{
    cell::ResultCell,
    config::Config,
    error::TaskError,
    sync::{Arc, AtomicU8, Mutex, Ordering, lock},
    task::{DepsApi, Task, TaskState},
    types::{IndexMap, TaskFailure, TaskKey, TaskOutcome, TaskOutput},
};
use derive_more::Debug;
use tracing::debug;

/// Declared dependencies of a task, in declaration order.
pub(crate) type DepMap<C> = IndexMap<TaskKey<C>, Arc<TaskNode<C>>>;

/// Executor-side wrapper of a task: identity, state machine, dependency
/// edges and result cell.
#[must_use]
#[derive(Debug)]
pub(crate) struct TaskNode<C: Config> {
    key: TaskKey<C>,
    #[debug(skip)]
    task: C::Task,
    state: AtomicU8,
    /// Written only by the worker that holds the task in `Exploring`; read
    /// by cycle detection on other workers.
    #[debug(skip)]
    deps: Mutex<DepMap<C>>,
    #[debug(skip)]
    cell: ResultCell<TaskOutput<C>, TaskFailure<C>>,
}

impl<C: Config> TaskNode<C> {
    pub(crate) fn new(key: TaskKey<C>, task: C::Task) -> Self {
        Self {
            key,
            task,
            state: AtomicU8::new(TaskState::NotStarted as u8),
            deps: Mutex::new(IndexMap::default()),
            cell: ResultCell::new(),
        }
    }

    pub(crate) fn key(&self) -> &TaskKey<C> {
        &self.key
    }

    pub(crate) fn task(&self) -> &C::Task {
        &self.task
    }

    pub(crate) fn cell(&self) -> &ResultCell<TaskOutput<C>, TaskFailure<C>> {
        &self.cell
    }

    pub(crate) fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn outcome(&self) -> Option<&TaskOutcome<C>> {
        self.cell.get()
    }

    /// Atomically move `from -> to`. Returns whether this caller made the
    /// move.
    pub(crate) fn transition(&self, from: TaskState, to: TaskState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether the task can still end up waiting on something, i.e. whether
    /// it can be part of a dependency cycle.
    pub(crate) fn may_wait(&self) -> bool {
        matches!(
            self.state(),
            TaskState::NotStarted | TaskState::Exploring | TaskState::WaitingDeps
        )
    }

    pub(crate) fn deps_snapshot(&self) -> DepMap<C> {
        lock(&self.deps).clone()
    }

    /// Add newly declared dependencies, keeping the first instance of each
    /// key. Returns the nodes that were actually added.
    pub(crate) fn declare(
        &self,
        declared: impl IntoIterator<Item = Arc<TaskNode<C>>>,
    ) -> Vec<Arc<TaskNode<C>>> {
        let mut deps = lock(&self.deps);
        declared
            .into_iter()
            .filter(|dep| {
                if deps.contains_key(dep.key()) {
                    return false;
                }
                deps.insert(dep.key().clone(), Arc::clone(dep));
                true
            })
            .collect()
    }

    pub(crate) fn is_declared(&self, key: &TaskKey<C>) -> bool {
        lock(&self.deps).contains_key(key)
    }

    /// Drop the dependency edges. Called once the task can no longer need
    /// them, so that cyclic graphs do not keep each other alive.
    pub(crate) fn release_deps(&self) {
        let released = core::mem::take(&mut *lock(&self.deps));
        drop(released);
    }

    /// Publish the outcome of `compute`. Only the worker that moved the task
    /// into `Executing` may call this.
    pub(crate) fn finish(&self, outcome: TaskOutcome<C>) {
        let terminal = if outcome.is_ok() {
            TaskState::Done
        } else {
            TaskState::Failed
        };
        let published = self.cell.set(outcome).is_ok();
        assert!(published, "TaskNode::finish: [1]");
        self.state.store(terminal as u8, Ordering::Release);
        self.release_deps();
        if let Some(Err(err)) = self.cell.get() {
            debug!(task = ?self.key, error = %err, "task failed");
        }
    }

    /// Fail or cancel a task that has not started executing.
    ///
    /// Returns `false` if the task already executes or has finished, in which
    /// case its own outcome stands.
    pub(crate) fn abort(&self, error: TaskFailure<C>) -> bool {
        let terminal = if matches!(error, TaskError::Cancelled { .. }) {
            TaskState::Cancelled
        } else {
            TaskState::Failed
        };
        let mut current = self.state();
        loop {
            if !matches!(
                current,
                TaskState::NotStarted | TaskState::Exploring | TaskState::WaitingDeps
            ) {
                return false;
            }
            match self.state.compare_exchange(
                current as u8,
                terminal as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = TaskState::from_u8(actual),
            }
        }
        // The state exchange above admits exactly one aborting caller, and
        // the worker that owned the task can no longer reach `finish`.
        let published = self.cell.set(Err(error)).is_ok();
        assert!(published, "TaskNode::abort: [1]");
        self.release_deps();
        if let Some(Err(error)) = self.cell.get() {
            debug!(task = ?self.key, from = ?current, error = %error, "task aborted");
        }
        true
    }

    /// Cancel the task because the executor is shutting down.
    pub(crate) fn cancel(&self) -> bool {
        self.abort(TaskError::Cancelled {
            task: self.key.clone(),
        })
    }
}

/// View over a task's declared dependencies, exposing the outputs of the
/// ones that completed successfully.
pub(crate) struct ResolvedDeps<'a, C: Config> {
    deps: &'a DepMap<C>,
}

impl<'a, C: Config> ResolvedDeps<'a, C> {
    pub(crate) fn new(deps: &'a DepMap<C>) -> Self {
        Self { deps }
    }

    /// Number of dependencies whose outputs are readable.
    pub(crate) fn readable(&self) -> usize {
        self.deps
            .values()
            .filter(|dep| matches!(dep.outcome(), Some(Ok(_))))
            .count()
    }
}

impl<C: Config> DepsApi<C> for ResolvedDeps<'_, C> {
    fn read(&self, key: &TaskKey<C>) -> Option<&TaskOutput<C>> {
        self.deps.get(key)?.outcome()?.as_ref().ok()
    }
}

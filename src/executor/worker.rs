use crate::{
    config::Config,
    error::TaskError,
    executor::{
        Shared,
        node::{DepMap, ResolvedDeps, TaskNode},
    },
    sync::{Arc, yield_now},
    task::{Task, TaskState},
    types::{HashSet, TaskKey},
    utils::panic_message,
};
use core::any::Any;
use rustc_hash::FxBuildHasher;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::{trace, warn};

/// Run the scheduling loop until the queue reports shutdown.
pub(super) fn run<C: Config>(shared: &Shared<C>, worker: usize) {
    trace!(worker, "worker started");
    let worker_ref = Worker { shared, id: worker };
    while let Some(node) = shared.queue.pop() {
        worker_ref.step(&node);
    }
    trace!(worker, "worker exiting");
}

struct Worker<'a, C: Config> {
    shared: &'a Shared<C>,
    id: usize,
}

/// What a single exploration round concluded.
enum Round<C: Config> {
    /// Every declared dependency resolved and `discover` saw all of them.
    Ready(DepMap<C>),
    /// Some dependencies are still pending.
    Blocked(Vec<Arc<TaskNode<C>>>),
    /// The task was failed during the round.
    Failed,
    /// Dependencies resolved that `discover` has not seen yet.
    Again,
}

impl<C: Config> Worker<'_, C> {
    fn step(&self, node: &Arc<TaskNode<C>>) {
        let claimed = match node.state() {
            TaskState::NotStarted if self.shared.is_shutdown() => {
                node.cancel();
                false
            }
            TaskState::NotStarted => node.transition(TaskState::NotStarted, TaskState::Exploring),
            TaskState::WaitingDeps => node.transition(TaskState::WaitingDeps, TaskState::Exploring),
            // Finished, or owned by another worker that will re-queue it if
            // needed.
            _ => false,
        };
        if !claimed {
            return;
        }
        // Keys, their hashing and logging run user code outside `discover`
        // and `compute`. A panic there fails the claimed task only.
        let explored = catch_unwind(AssertUnwindSafe(|| {
            trace!(worker = self.id, task = ?node.key(), "claimed task");
            self.explore(node);
        }));
        if let Err(payload) = explored {
            self.recover(node, &*payload);
        }
    }

    /// Record a panic that escaped the user hooks on the task being
    /// explored, wherever in its claim the worker was.
    fn recover(&self, node: &Arc<TaskNode<C>>, payload: &(dyn Any + Send)) {
        let message = panic_message(payload);
        warn!(worker = self.id, %message, "panic while scheduling task");
        let error = TaskError::Panicked {
            task: node.key().clone(),
            message,
        };
        match node.state() {
            TaskState::Executing if !node.cell().is_set() => node.finish(Err(error)),
            _ => self.fail(node, error),
        }
    }

    fn explore(&self, node: &Arc<TaskNode<C>>) {
        let mut fresh = Vec::new();
        loop {
            match self.round(node, &mut fresh) {
                Round::Again => {}
                Round::Failed => return,
                Round::Ready(deps) => return self.execute(node, &deps),
                Round::Blocked(pending) => return self.park(node, &pending, &fresh),
            }
        }
    }

    /// Run `discover` once, merge what it declared and classify the
    /// dependency set. New unresolved edges are collected into `fresh`.
    fn round(&self, node: &Arc<TaskNode<C>>, fresh: &mut Vec<Arc<TaskNode<C>>>) -> Round<C> {
        let seen = node.deps_snapshot();
        let view = ResolvedDeps::new(&seen);
        let readable_before = view.readable();
        let declared = match catch_unwind(AssertUnwindSafe(|| node.task().discover(&view))) {
            Ok(declared) => declared,
            Err(payload) => {
                self.fail(
                    node,
                    TaskError::Panicked {
                        task: node.key().clone(),
                        message: panic_message(&*payload),
                    },
                );
                return Round::Failed;
            }
        };

        let interned = declared
            .into_iter()
            .filter(|task| !node.is_declared(&task.key()))
            .map(|task| self.shared.registry.intern(task).0)
            .collect::<Vec<_>>();
        let added = node.declare(interned);
        fresh.extend(added.into_iter().filter(|dep| dep.outcome().is_none()));

        let deps = node.deps_snapshot();
        let mut pending = Vec::new();
        for dep in deps.values() {
            match dep.outcome() {
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    // Declaration order decides which failure is reported.
                    self.fail(node, err.propagate_to(node.key().clone()));
                    return Round::Failed;
                }
                None => pending.push(Arc::clone(dep)),
            }
        }
        if !pending.is_empty() {
            Round::Blocked(pending)
        } else if deps.len() > readable_before {
            Round::Again
        } else {
            Round::Ready(deps)
        }
    }

    fn park(
        &self,
        node: &Arc<TaskNode<C>>,
        pending: &[Arc<TaskNode<C>>],
        fresh: &[Arc<TaskNode<C>>],
    ) {
        if let Some(cycle) = find_cycle(node, fresh) {
            self.fail_cycle(&cycle);
            return;
        }
        if !node.transition(TaskState::Exploring, TaskState::WaitingDeps) {
            // Failed by another worker's cycle detection mid-exploration.
            node.release_deps();
            return;
        }
        let mut admitted = false;
        // Reverse so that the first declared dependency ends up frontmost.
        for dep in pending.iter().rev() {
            if dep.state() != TaskState::NotStarted {
                continue;
            }
            match self.shared.queue.admit_front(Arc::clone(dep)) {
                Ok(()) => admitted = true,
                Err(dep) => {
                    dep.cancel();
                }
            }
        }
        trace!(
            worker = self.id,
            task = ?node.key(),
            pending = pending.len(),
            "task waiting on dependencies"
        );
        if let Err(node) = self.shared.queue.requeue_back(Arc::clone(node)) {
            node.cancel();
            return;
        }
        if !admitted {
            // Everything this task waits on is owned by other workers; let
            // them run before this worker picks the task up again.
            yield_now();
        }
    }

    fn execute(&self, node: &Arc<TaskNode<C>>, deps: &DepMap<C>) {
        if !node.transition(TaskState::Exploring, TaskState::Executing) {
            node.release_deps();
            return;
        }
        trace!(worker = self.id, task = ?node.key(), "executing task");
        let view = ResolvedDeps::new(deps);
        let key = node.key();
        let outcome = match catch_unwind(AssertUnwindSafe(|| node.task().compute(&view))) {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(err)) => Err(TaskError::Compute {
                task: key.clone(),
                source: std::sync::Arc::new(err),
            }),
            Err(payload) => Err(TaskError::Panicked {
                task: key.clone(),
                message: panic_message(&*payload),
            }),
        };
        node.finish(outcome);
    }

    fn fail(&self, node: &TaskNode<C>, error: TaskError<TaskKey<C>>) {
        if !node.abort(error) {
            node.release_deps();
        }
        trace!(worker = self.id, task = ?node.key(), "task failed during exploration");
    }

    fn fail_cycle(&self, cycle: &[Arc<TaskNode<C>>]) {
        let keys = cycle
            .iter()
            .map(|node| node.key().clone())
            .collect::<Vec<_>>();
        warn!(worker = self.id, cycle = ?keys, "dependency cycle detected");
        for member in cycle {
            member.abort(TaskError::Cycle {
                cycle: keys.clone(),
            });
        }
        if let Some(origin) = cycle.first() {
            origin.release_deps();
        }
    }
}

/// Look for a path from any of `fresh` back to `origin` through tasks that
/// can still wait. Returns the cycle starting at `origin`.
fn find_cycle<C: Config>(
    origin: &Arc<TaskNode<C>>,
    fresh: &[Arc<TaskNode<C>>],
) -> Option<Vec<Arc<TaskNode<C>>>> {
    let mut visited = HashSet::with_capacity_and_hasher(fresh.len(), FxBuildHasher);
    for start in fresh {
        // Depth-first walk; `path` holds the chain from `start` to the parent
        // of the node being visited.
        let mut path: Vec<Arc<TaskNode<C>>> = Vec::new();
        let mut stack = vec![(Arc::clone(start), 0usize)];
        while let Some((current, depth)) = stack.pop() {
            path.truncate(depth);
            if current.key() == origin.key() {
                let mut cycle = Vec::with_capacity(path.len() + 1);
                cycle.push(Arc::clone(origin));
                cycle.extend(path);
                return Some(cycle);
            }
            if !current.may_wait() || !visited.insert(current.key().clone()) {
                continue;
            }
            for dep in current.deps_snapshot().into_values() {
                stack.push((dep, depth + 1));
            }
            path.push(current);
        }
    }
    None
}

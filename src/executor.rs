mod node;
mod queue;
mod registry;
mod worker;

pub(crate) use crate::executor::node::TaskNode;
use crate::{
    config::Config,
    error::{BuildError, SubmitError},
    executor::{
        queue::{Phase, WorkQueue},
        registry::Registry,
    },
    future::TaskFuture,
    sync::{Arc, Condvar, Mutex, lock, wait},
    task::TaskState,
    types::TaskKey,
};
use core::num::NonZeroUsize;
use derive_more::Debug;
use tracing::{debug, info};

/// Executor for tasks whose dependencies are discovered while they run.
///
/// A fixed set of `P` workers shares one double-ended queue:
/// - Submitted tasks join the back of the queue.
/// - A worker that pops a task runs its discovery step. Newly needed
///   dependencies jump to the front of the queue, so the deepest unmet needs
///   are resolved first; the task itself goes to the back until they finish.
/// - Once everything a task declared has completed, the worker computes it and
///   publishes the outcome to the task's future.
///
/// Tasks are memoized by key for the executor's lifetime: however often a
/// task is submitted or depended upon, it computes at most once. Cycles are
/// detected during discovery and fail every task on the cycle.
///
/// Workers never block on a dependency. A task whose pending dependencies
/// are all being run by other workers goes back in the queue and its worker
/// yields, so while one long `compute` runs, up to `P - 1` idle workers may
/// keep a CPU busy each by requeueing the tasks that wait on it.
#[must_use]
#[derive(Debug)]
pub struct Executor<C: Config> {
    #[debug(skip)]
    shared: Arc<Shared<C>>,
    parallelism: usize,
    #[cfg(not(feature = "loom"))]
    #[debug(skip)]
    pool: Arc<rayon::ThreadPool>,
    #[cfg(feature = "loom")]
    #[debug(skip)]
    handles: Mutex<Vec<loom::thread::JoinHandle<()>>>,
}

/// State shared between the façade and the workers.
pub(crate) struct Shared<C: Config> {
    queue: WorkQueue<Arc<TaskNode<C>>>,
    registry: Registry<C>,
    workers: WorkerCount,
}

impl<C: Config> Shared<C> {
    fn is_shutdown(&self) -> bool {
        self.queue.phase() != Phase::Running
    }
}

/// Number of live workers, with a way to wait for all of them to exit.
struct WorkerCount {
    live: Mutex<usize>,
    exited: Condvar,
}

impl WorkerCount {
    fn new(live: usize) -> Self {
        Self {
            live: Mutex::new(live),
            exited: Condvar::new(),
        }
    }

    fn leave(&self) {
        let mut live = lock(&self.live);
        *live -= 1;
        if *live == 0 {
            self.exited.notify_all();
        }
    }

    fn wait_all(&self) {
        let mut live = lock(&self.live);
        while *live != 0 {
            live = wait(&self.exited, live);
        }
    }
}

/// Decrements the live worker count when the worker loop ends, even by
/// unwinding.
struct LeaveOnDrop<C: Config>(Arc<Shared<C>>);

impl<C: Config> Drop for LeaveOnDrop<C> {
    fn drop(&mut self) {
        self.0.workers.leave();
    }
}

fn run_worker<C: Config>(shared: Arc<Shared<C>>, worker: usize) {
    let guard = LeaveOnDrop(shared);
    worker::run(&guard.0, worker);
}

impl<C: Config> Executor<C> {
    /// Start an executor running `parallelism` workers.
    ///
    /// Outside `loom` the workers run on a dedicated `rayon` pool of the same
    /// size.
    ///
    /// # Errors
    /// If the worker pool cannot be created.
    pub fn new(parallelism: NonZeroUsize) -> Result<Self, BuildError> {
        #[cfg(not(feature = "loom"))]
        {
            ExecutorBuilder::new().parallelism(parallelism).build()
        }
        #[cfg(feature = "loom")]
        {
            let shared = Shared::new(parallelism.get());
            let handles = (0..parallelism.get())
                .map(|worker| {
                    let shared = Arc::clone(&shared);
                    loom::thread::spawn(move || run_worker(shared, worker))
                })
                .collect();
            info!(parallelism = parallelism.get(), "executor started");
            Ok(Self {
                shared,
                parallelism: parallelism.get(),
                handles: Mutex::new(handles),
            })
        }
    }

    /// Start an executor on an externally owned `rayon` pool, with one worker
    /// per pool thread.
    ///
    /// The workers occupy the pool's threads until the executor shuts down.
    #[cfg(not(feature = "loom"))]
    pub fn from_pool(pool: Arc<rayon::ThreadPool>) -> Self {
        let parallelism = NonZeroUsize::new(pool.current_num_threads()).unwrap_or(NonZeroUsize::MIN);
        Self::from_pool_with_parallelism(pool, parallelism)
    }

    /// Start `parallelism` workers on an externally owned `rayon` pool.
    ///
    /// It is up to the caller to ensure the pool has at least `parallelism`
    /// threads to spare; workers beyond that only start once others exit.
    #[cfg(not(feature = "loom"))]
    pub fn from_pool_with_parallelism(
        pool: Arc<rayon::ThreadPool>,
        parallelism: NonZeroUsize,
    ) -> Self {
        let shared = Shared::new(parallelism.get());
        for worker in 0..parallelism.get() {
            let shared = Arc::clone(&shared);
            pool.spawn(move || run_worker(shared, worker));
        }
        info!(parallelism = parallelism.get(), "executor started");
        Self {
            shared,
            parallelism: parallelism.get(),
            pool,
        }
    }

    /// Configure an executor step by step.
    #[cfg(not(feature = "loom"))]
    pub fn builder() -> ExecutorBuilder {
        ExecutorBuilder::new()
    }

    /// Number of workers.
    #[must_use]
    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// The `rayon` pool hosting the workers.
    #[cfg(not(feature = "loom"))]
    #[must_use]
    pub fn pool(&self) -> &Arc<rayon::ThreadPool> {
        &self.pool
    }

    /// Submit a task and get a future for its outcome.
    ///
    /// A task whose key is already known is not queued again; the returned
    /// future shares the existing outcome.
    ///
    /// # Errors
    /// If the executor has been shut down.
    pub fn submit(&self, task: C::Task) -> Result<TaskFuture<C>, SubmitError> {
        if self.shared.is_shutdown() {
            return Err(SubmitError::Shutdown);
        }
        let (node, created) = self.shared.registry.intern(task);
        debug!(task = ?node.key(), created, "task submitted");
        if node.state() == TaskState::NotStarted {
            if let Err(node) = self.shared.queue.admit_back(Arc::clone(&node)) {
                // Shutdown won the race. Cancel the node unless another
                // submission already queued it and shutdown dealt with it.
                if created {
                    node.cancel();
                }
                return Err(SubmitError::Shutdown);
            }
        }
        Ok(TaskFuture::new(node))
    }

    /// Submit several tasks, returning one future per task in order.
    ///
    /// # Errors
    /// If the executor has been shut down. Tasks submitted before the
    /// shutdown was observed keep running.
    pub fn submit_all(
        &self,
        tasks: impl IntoIterator<Item = C::Task>,
    ) -> Result<Vec<TaskFuture<C>>, SubmitError> {
        tasks.into_iter().map(|task| self.submit(task)).collect()
    }

    /// Current state of the task with `key`, if the executor knows it.
    #[must_use]
    pub fn state_of(&self, key: &TaskKey<C>) -> Option<TaskState> {
        self.shared.registry.get(key).map(|node| node.state())
    }

    /// Number of distinct tasks the executor has seen.
    #[must_use]
    pub fn known_tasks(&self) -> usize {
        self.shared.registry.len()
    }

    /// Whether `shutdown` or `shutdown_now` has been called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shared.is_shutdown()
    }

    /// Shut down gracefully and wait for every worker to exit.
    ///
    /// New submissions are rejected. Queued tasks no worker has claimed yet
    /// are cancelled before this returns. Tasks already claimed run to
    /// completion; dependencies they have yet to schedule are cancelled,
    /// which fails them with a dependency error.
    ///
    /// Must not be called from inside a task.
    pub fn shutdown(&self) {
        self.begin_shutdown(Phase::Draining);
        self.shared.workers.wait_all();
        #[cfg(feature = "loom")]
        for handle in lock(&self.handles).drain(..) {
            handle.join().expect("Executor::shutdown: [1]");
        }
        info!("executor shut down");
    }

    /// Shut down immediately without waiting for workers.
    ///
    /// Every task that is not executing yet is cancelled, including tasks
    /// waiting on their dependencies. Executing tasks are not interrupted.
    pub fn shutdown_now(&self) {
        self.begin_shutdown(Phase::Stopped);
    }

    fn begin_shutdown(&self, phase: Phase) {
        let removed = self
            .shared
            .queue
            .close(phase, |node| phase == Phase::Draining && node.state().is_claimed());
        let cancelled = removed.iter().filter(|node| node.cancel()).count();
        info!(?phase, cancelled, "executor shutting down");
    }
}

impl<C: Config> Shared<C> {
    fn new(parallelism: usize) -> Arc<Self> {
        Arc::new(Self {
            queue: WorkQueue::new(),
            registry: Registry::new(parallelism),
            workers: WorkerCount::new(parallelism),
        })
    }
}

impl<C: Config> Drop for Executor<C> {
    fn drop(&mut self) {
        self.shutdown_now();
    }
}

/// Step-by-step configuration of an [`Executor`].
#[cfg(not(feature = "loom"))]
#[must_use]
#[derive(Debug, Default)]
pub struct ExecutorBuilder {
    parallelism: Option<NonZeroUsize>,
    thread_name: Option<String>,
    #[debug(skip)]
    pool: Option<Arc<rayon::ThreadPool>>,
}

#[cfg(not(feature = "loom"))]
impl ExecutorBuilder {
    /// A builder with default settings: one worker per available CPU on a
    /// dedicated pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of workers. Defaults to the pool size for an external pool,
    /// otherwise to the available parallelism of the machine.
    pub fn parallelism(mut self, parallelism: NonZeroUsize) -> Self {
        self.parallelism = Some(parallelism);
        self
    }

    /// Name prefix for the threads of a dedicated pool.
    pub fn thread_name(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name = Some(prefix.into());
        self
    }

    /// Run the workers on an externally owned pool instead of a dedicated one.
    pub fn pool(mut self, pool: Arc<rayon::ThreadPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Start the executor.
    ///
    /// # Errors
    /// If a dedicated pool cannot be created.
    pub fn build<C: Config>(self) -> Result<Executor<C>, BuildError> {
        let Self {
            parallelism,
            thread_name,
            pool,
        } = self;
        if let Some(pool) = pool {
            return Ok(match parallelism {
                Some(parallelism) => Executor::from_pool_with_parallelism(pool, parallelism),
                None => Executor::from_pool(pool),
            });
        }
        let parallelism = parallelism
            .or_else(|| std::thread::available_parallelism().ok())
            .unwrap_or(NonZeroUsize::MIN);
        let mut builder = rayon::ThreadPoolBuilder::new().num_threads(parallelism.get());
        if let Some(prefix) = thread_name {
            builder = builder.thread_name(move |idx| format!("{prefix}-{idx}"));
        }
        let pool = builder.build()?;
        Ok(Executor::from_pool_with_parallelism(
            Arc::new(pool),
            parallelism,
        ))
    }
}

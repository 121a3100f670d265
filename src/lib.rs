//! Dependency-aware task executor for computation graphs discovered at
//! runtime.
//!
//! Build tools transform target graphs, construct action graphs and compute
//! rule keys by submitting work whose dependencies are only known once some of
//! that work has run. This crate provides the engine underneath. It:
//! - Runs a fixed number of workers over one shared double-ended queue.
//! - Lets each task declare its dependencies incrementally: a task's discovery
//!   step is called again as results become available, so it can ask for more.
//! - Admits newly discovered dependencies at the front of the queue and parks
//!   waiting tasks at the back, completing deep dependency chains first while
//!   independent work keeps flowing.
//! - Memoizes tasks by key so each computes at most once per executor.
//! - Detects dependency cycles and fails the tasks on them instead of hanging.
//! - Propagates failures to dependents without computing them, naming the task
//!   where the failure originated.
//!
//! Key modules:
//! - `config`: binds a concrete task type to the executor via the `Config`
//!   trait.
//! - `task`: defines the `Task` interface, the `DepsApi` used by tasks to read
//!   dependency outputs, and `TaskState`.
//! - `executor`: the worker pool, queue, memo table and scheduling loop.
//! - `future`: `TaskFuture`, the caller's handle to a task's outcome.
//! - `cell`: `ResultCell`, the write-once slot backing every future.
//! - `error`: task failures and executor errors.
//!
//! Quick start:
//! 1. Implement `Config` with your `Task` type (an enum if you have several
//!    kinds of task).
//! 2. Implement `Task::discover` to return the dependencies a task needs,
//!    reading already-completed ones via `DepsApi::read`, and `Task::compute`
//!    to produce its output from them.
//! 3. Create an `Executor`, `submit` root tasks and `get` their futures.
//!
//! When a task computes, every dependency it declared has completed and
//! published its output with a happens-before relation to the read.

/// Public interface to configure the executor.
///
/// Exposes the `Config` trait which binds the task type for a concrete
/// instantiation of the executor.
pub mod config;
/// The write-once result cell backing task futures.
pub mod cell;
/// Errors recorded on tasks and returned by the executor.
pub mod error;
/// The dependency-aware executor.
///
/// Contains the work queue, the per-executor memo table, the per-task state
/// machine and the worker loop with cycle detection.
pub mod executor;
/// Futures returned by task submission.
pub mod future;
mod sync;
/// Task definitions and the dependency-read API exposed to tasks.
///
/// Defines the `Task` trait (`key`, `discover`, `compute`), the `DepsApi`
/// used to read outputs of completed dependencies, and `TaskState`.
pub mod task;
/// Core types used across the crate (key/output aliases, collection aliases,
/// cell wrapper).
pub mod types;
mod utils;

pub use crate::{
    config::Config,
    error::{BuildError, SubmitError, TaskError},
    executor::Executor,
    future::TaskFuture,
    task::{DepsApi, Task, TaskState},
};
#[cfg(not(feature = "loom"))]
pub use crate::executor::ExecutorBuilder;

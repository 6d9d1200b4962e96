//! Lock aliases.
//!
//! Every crate goes through these so the underlying implementation can be
//! swapped in one place.

/// A blocking mutex for short critical sections over in-memory state.
pub type SyncMutex<T> = parking_lot::Mutex<T>;

/// A blocking reader-writer lock. Not reentrant.
pub type SyncRwLock<T> = parking_lot::RwLock<T>;
/// Exclusive guard returned by [`SyncRwLock::write`].
pub type SyncRwLockWriteGuard<'a, T> = parking_lot::RwLockWriteGuard<'a, T>;

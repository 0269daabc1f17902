//! Striped locks serializing publishes per revision.
//!
//! A key (a revision, or build type plus revision for queue removals) is
//! hashed onto one of a fixed number of mutexes. Publishes sharing a key
//! always serialize; unrelated keys only contend when they collide on a
//! stripe.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

/// A fixed pool of mutexes addressed by key.
#[derive(Debug)]
pub struct LockManager {
    stripes: Vec<Mutex<()>>,
}

impl LockManager {
    /// Creates a pool with `stripes` locks (at least one).
    pub fn new(stripes: usize) -> Self {
        LockManager {
            stripes: (0..stripes.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    pub fn stripes(&self) -> usize {
        self.stripes.len()
    }

    /// Index of the stripe guarding `key`. Stable for the life of the process.
    pub fn stripe_for(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.stripes.len() as u64) as usize
    }

    /// Blocks until the lock for `key` is held.
    pub fn lock(&self, key: &str) -> MutexGuard<'_, ()> {
        self.stripes[self.stripe_for(key)]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes the lock for `key` if it is free.
    pub fn try_lock(&self, key: &str) -> Option<MutexGuard<'_, ()>> {
        match self.stripes[self.stripe_for(key)].try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }
}

/// Lock key for publishing queue removal of a revision.
pub fn removal_lock_key(build_type: &str, revision: &str) -> String {
    format!("{build_type}:{revision}")
}

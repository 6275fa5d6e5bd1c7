use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError};

/// A thread-safe, reference-counted resource container with read-write locking.
///
/// `MtResource` is how the terrain store is shared between the main thread and
/// the worker pool. It wraps an `Arc<RwLock<T>>`; cloning it hands out another
/// handle to the same value.
///
/// A background task takes the write guard for the whole of its mutation, so
/// readers observe either the state before an edit or the state after it.
///
/// # Poisoning
/// A writer that panics while holding the write guard poisons the lock. The
/// guard is recovered rather than propagating the panic, which is only sound
/// if every writer leaves `T` consistent before it unwinds. Writers that may
/// panic halfway through a multi-step edit must catch the panic, undo the
/// partial edit and then resume unwinding, as `TerrainAreaUpdateTask` does.
pub struct MtResource<T: Send + Sync> {
    resource: Arc<RwLock<T>>,
}

impl<T: Send + Sync> MtResource<T> {
    /// Creates a new `MtResource` containing the given value.
    pub fn new(resource: T) -> Self {
        Self {
            resource: Arc::new(RwLock::new(resource)),
        }
    }

    /// Returns a read-only guard over the contained value.
    pub fn get(&self) -> RwLockReadGuard<'_, T> {
        self.resource.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns an exclusive guard over the contained value.
    ///
    /// Blocks until every outstanding read and write guard is released.
    pub fn get_mut(&self) -> RwLockWriteGuard<'_, T> {
        self.resource.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns an exclusive guard if one is available without blocking.
    ///
    /// `None` means another guard is currently held.
    pub fn try_get_mut(&self) -> Option<RwLockWriteGuard<'_, T>> {
        match self.resource.try_write() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Returns `true` if both handles point at the same value.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.resource, &other.resource)
    }
}

impl<T: Send + Sync> Clone for MtResource<T> {
    fn clone(&self) -> Self {
        Self {
            resource: self.resource.clone(),
        }
    }
}

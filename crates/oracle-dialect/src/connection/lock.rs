//! Single-statement serialization over one connection handle.
//!
//! The vendor protocol allows one statement in flight per connection, so
//! every execution path takes the lock first and holds it until the result
//! arrives, then releases it. Transactions are pinned to a connection by
//! keeping the pooled handle checked out for their whole lifetime, not by
//! holding this lock across statements. Release happens on guard drop, so
//! every exit path (including errors and cancellation) releases.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Shared, lockable wrapper around one connection handle.
#[derive(Debug)]
pub struct ResourceLock<D> {
    inner: Arc<Mutex<Option<D>>>,
    broken: Arc<AtomicBool>,
}

impl<D> Clone for ResourceLock<D> {
    fn clone(&self) -> Self {
        ResourceLock {
            inner: Arc::clone(&self.inner),
            broken: Arc::clone(&self.broken),
        }
    }
}

impl<D> ResourceLock<D> {
    pub fn new(connection: D) -> Self {
        ResourceLock {
            inner: Arc::new(Mutex::new(Some(connection))),
            broken: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Acquire exclusive use of the handle, waiting if a statement or
    /// transaction currently holds it.
    pub async fn lock(&self) -> ConnectionLock<D> {
        ConnectionLock {
            guard: Arc::clone(&self.inner).lock_owned().await,
        }
    }

    /// Mark the underlying socket as unusable so the pool evicts it.
    pub fn mark_broken(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    pub fn is_broken(&self) -> bool {
        self.broken.load(Ordering::SeqCst)
    }

    /// Remove the handle, leaving the lock empty. Used on eviction.
    pub async fn take(&self) -> Option<D> {
        self.inner.lock().await.take()
    }
}

/// Owned guard over the handle; dropping it releases the lock.
pub struct ConnectionLock<D> {
    guard: OwnedMutexGuard<Option<D>>,
}

impl<D> ConnectionLock<D> {
    /// The held connection, or `None` after eviction.
    pub fn connection(&mut self) -> Option<&mut D> {
        self.guard.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_lock_serializes_access() {
        let lock = ResourceLock::new(0u32);
        let mut first = lock.lock().await;
        *first.connection().unwrap() += 1;

        // A second locker cannot proceed while the guard lives.
        let contender = lock.clone();
        let pending = tokio::spawn(async move {
            let mut guard = contender.lock().await;
            *guard.connection().unwrap() += 1;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!pending.is_finished());

        drop(first);
        pending.await.unwrap();
        let mut guard = lock.lock().await;
        assert_eq!(*guard.connection().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_take_empties_the_lock() {
        let lock = ResourceLock::new(7u32);
        assert_eq!(lock.take().await, Some(7));
        let mut guard = lock.lock().await;
        assert!(guard.connection().is_none());
    }

    #[tokio::test]
    async fn test_broken_flag() {
        let lock = ResourceLock::new(());
        assert!(!lock.is_broken());
        lock.mark_broken();
        assert!(lock.is_broken());
        assert!(lock.clone().is_broken());
    }
}

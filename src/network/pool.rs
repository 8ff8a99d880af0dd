//! Connection Pool
//!
//! Bounded pool of reusable items (connections in production, anything in
//! tests), handed out behind an RAII guard.
//!
//! ## Lifecycle
//! - Created empty; items are built lazily by the factory up to `size`
//! - `checkout` blocks while every item is in use (the only backpressure)
//! - Dropping a `Pooled` guard checks the item back in, exactly once
//! - Broken items are dropped on checkin and their slot is freed
//! - `close` drops idle items and fails all current and future checkouts

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::{CacheError, Result};

type Factory<T> = Box<dyn Fn() -> Result<T> + Send + Sync>;

struct PoolState<T> {
    idle: VecDeque<T>,
    /// idle + checked out + being created
    total: usize,
    closed: bool,
}

struct PoolInner<T> {
    size: usize,
    factory: Factory<T>,
    state: Mutex<PoolState<T>>,
    available: Condvar,
    checkouts: AtomicU64,
    checkins: AtomicU64,
}

/// Pool handle (cheap to clone)
pub struct Pool<T: Send + 'static> {
    inner: Arc<PoolInner<T>>,
}

impl<T: Send + 'static> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Point-in-time pool counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub idle: usize,
    pub total: usize,
    pub checkouts: u64,
    pub checkins: u64,
}

impl<T: Send + 'static> Pool<T> {
    /// Create a pool of at most `size` items built by `factory`
    pub fn new<F>(size: usize, factory: F) -> Self
    where
        F: Fn() -> Result<T> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(PoolInner {
                size,
                factory: Box::new(factory),
                state: Mutex::new(PoolState {
                    idle: VecDeque::with_capacity(size),
                    total: 0,
                    closed: false,
                }),
                available: Condvar::new(),
                checkouts: AtomicU64::new(0),
                checkins: AtomicU64::new(0),
            }),
        }
    }

    /// Take an item, creating one if under capacity, else waiting for a checkin
    pub fn checkout(&self) -> Result<Pooled<T>> {
        let mut state = self.inner.state.lock();
        loop {
            if state.closed {
                return Err(CacheError::PoolClosed);
            }
            if let Some(item) = state.idle.pop_front() {
                drop(state);
                return Ok(self.hand_out(item));
            }
            if state.total < self.inner.size {
                state.total += 1;
                break;
            }
            tracing::trace!(size = self.inner.size, "pool exhausted, waiting for checkin");
            self.inner.available.wait(&mut state);
        }
        drop(state);

        // Build outside the lock; connecting may take a while.
        match (self.inner.factory)() {
            Ok(item) => {
                tracing::debug!("pool created new item");
                Ok(self.hand_out(item))
            }
            Err(e) => {
                self.release_slot();
                Err(e)
            }
        }
    }

    /// Drop idle items and refuse further checkouts
    ///
    /// Items currently checked out are dropped when their guard is.
    pub fn close(&self) {
        let drained: Vec<T> = {
            let mut state = self.inner.state.lock();
            state.closed = true;
            let drained: Vec<T> = state.idle.drain(..).collect();
            state.total = state.total.saturating_sub(drained.len());
            drained
        };
        self.inner.available.notify_all();
        tracing::debug!(dropped = drained.len(), "pool closed");
        drop(drained);
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            idle: state.idle.len(),
            total: state.total,
            checkouts: self.inner.checkouts.load(Ordering::Relaxed),
            checkins: self.inner.checkins.load(Ordering::Relaxed),
        }
    }

    pub fn size(&self) -> usize {
        self.inner.size
    }

    fn hand_out(&self, item: T) -> Pooled<T> {
        self.inner.checkouts.fetch_add(1, Ordering::Relaxed);
        Pooled {
            pool: self.clone(),
            item: Some(item),
            broken: false,
        }
    }

    fn checkin(&self, item: T, broken: bool) {
        self.inner.checkins.fetch_add(1, Ordering::Relaxed);
        let discarded = {
            let mut state = self.inner.state.lock();
            if broken || state.closed {
                state.total = state.total.saturating_sub(1);
                Some(item)
            } else {
                state.idle.push_back(item);
                None
            }
        };
        self.inner.available.notify_one();
        if discarded.is_some() {
            tracing::debug!(broken, "pool discarded item on checkin");
        }
    }

    fn release_slot(&self) {
        let mut state = self.inner.state.lock();
        state.total = state.total.saturating_sub(1);
        drop(state);
        self.inner.available.notify_one();
    }
}

/// RAII guard returning its item to the pool on drop
pub struct Pooled<T: Send + 'static> {
    pool: Pool<T>,
    item: Option<T>,
    broken: bool,
}

impl<T: Send + 'static> Pooled<T> {
    /// Mark the item as unusable; it is discarded instead of reused
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }
}

impl<T: Send + 'static> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only `drop` takes the item.
        self.item.as_ref().expect("pooled item present until drop")
    }
}

impl<T: Send + 'static> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.item.as_mut().expect("pooled item present until drop")
    }
}

impl<T: Send + 'static> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool.checkin(item, self.broken);
        }
    }
}

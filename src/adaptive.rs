//! Live-updatable category limits.
//!
//! Default uses `ArcSwap` for lock-free reads on the request path; feature `adaptive-rwlock`
//! switches to an `RwLock` if desired.

use std::sync::Arc;

#[cfg(not(feature = "adaptive-rwlock"))]
use arc_swap::ArcSwap;
#[cfg(feature = "adaptive-rwlock")]
use parking_lot::RwLock;

use crate::category::{CategoryLimits, QuotaCategory};
use crate::config::LimitTable;

/// Shared handle to the limit table. Clones observe the same table.
#[derive(Debug, Clone)]
pub struct LiveLimits {
    #[cfg(not(feature = "adaptive-rwlock"))]
    inner: Arc<ArcSwap<LimitTable>>,
    #[cfg(feature = "adaptive-rwlock")]
    inner: Arc<RwLock<Arc<LimitTable>>>,
}

impl LiveLimits {
    pub fn new(table: LimitTable) -> Self {
        #[cfg(not(feature = "adaptive-rwlock"))]
        {
            Self { inner: Arc::new(ArcSwap::from_pointee(table)) }
        }
        #[cfg(feature = "adaptive-rwlock")]
        {
            Self { inner: Arc::new(RwLock::new(Arc::new(table))) }
        }
    }

    /// Snapshot of the whole table (cheap clone of `Arc`).
    pub fn table(&self) -> Arc<LimitTable> {
        #[cfg(not(feature = "adaptive-rwlock"))]
        {
            self.inner.load_full()
        }
        #[cfg(feature = "adaptive-rwlock")]
        {
            self.inner.read().clone()
        }
    }

    /// Current limits of `category`.
    pub fn get(&self, category: QuotaCategory) -> Option<CategoryLimits> {
        #[cfg(not(feature = "adaptive-rwlock"))]
        {
            self.inner.load().get(&category).copied()
        }
        #[cfg(feature = "adaptive-rwlock")]
        {
            self.inner.read().get(&category).copied()
        }
    }

    /// Replace the whole table.
    pub fn replace(&self, table: LimitTable) {
        #[cfg(not(feature = "adaptive-rwlock"))]
        {
            self.inner.store(Arc::new(table));
        }
        #[cfg(feature = "adaptive-rwlock")]
        {
            *self.inner.write() = Arc::new(table);
        }
    }

    /// Set the limits of one category, keeping the rest. Returns the previous limits.
    pub fn set(&self, category: QuotaCategory, limits: CategoryLimits) -> Option<CategoryLimits> {
        let mut previous = None;
        self.update(|table| {
            let mut next = table.clone();
            previous = next.insert(category, limits);
            next
        });
        previous
    }

    /// Remove a category; requests for it become contract violations.
    pub fn remove(&self, category: QuotaCategory) -> Option<CategoryLimits> {
        let mut previous = None;
        self.update(|table| {
            let mut next = table.clone();
            previous = next.remove(&category);
            next
        });
        previous
    }

    fn update<F>(&self, mut f: F)
    where
        F: FnMut(&LimitTable) -> LimitTable,
    {
        #[cfg(not(feature = "adaptive-rwlock"))]
        {
            self.inner.rcu(|cur| f(&**cur));
        }
        #[cfg(feature = "adaptive-rwlock")]
        {
            let mut guard = self.inner.write();
            let next = f(&guard);
            *guard = Arc::new(next);
        }
    }
}

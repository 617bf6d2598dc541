//! In-process guard allowing at most one reconciliation run per partition.
//!
//! Stores that span processes (Postgres) add their own lock on top; this one
//! rejects a second trigger inside the same process before any I/O happens.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use catsync_core::ProductTypeId;

#[derive(Debug, Clone, Default)]
pub struct PartitionLocks {
    held: Arc<Mutex<HashSet<ProductTypeId>>>,
}

impl PartitionLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `product_type`, or returns `None` when a run already holds it.
    /// The claim is released when the returned guard drops.
    #[must_use]
    pub fn try_acquire(&self, product_type: ProductTypeId) -> Option<PartitionGuard> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if !held.insert(product_type) {
            return None;
        }
        Some(PartitionGuard {
            held: Arc::clone(&self.held),
            product_type,
        })
    }

    #[must_use]
    pub fn is_held(&self, product_type: ProductTypeId) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&product_type)
    }
}

#[derive(Debug)]
pub struct PartitionGuard {
    held: Arc<Mutex<HashSet<ProductTypeId>>>,
    product_type: ProductTypeId,
}

impl PartitionGuard {
    #[must_use]
    pub fn product_type(&self) -> ProductTypeId {
        self.product_type
    }
}

impl Drop for PartitionGuard {
    fn drop(&mut self) {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.product_type);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(n: i16) -> ProductTypeId {
        ProductTypeId::new(n).unwrap()
    }

    #[test]
    fn second_claim_on_same_partition_is_rejected() {
        let locks = PartitionLocks::new();
        let guard = locks.try_acquire(pt(1)).expect("first claim");
        assert!(locks.try_acquire(pt(1)).is_none());
        assert!(locks.is_held(pt(1)));
        drop(guard);
        assert!(!locks.is_held(pt(1)));
        assert!(locks.try_acquire(pt(1)).is_some());
    }

    #[test]
    fn partitions_are_independent() {
        let locks = PartitionLocks::new();
        let _doors = locks.try_acquire(pt(1)).unwrap();
        let hardware = locks.try_acquire(pt(2)).unwrap();
        assert_eq!(hardware.product_type(), pt(2));
    }

    #[test]
    fn clones_share_state() {
        let locks = PartitionLocks::new();
        let other = locks.clone();
        let _guard = locks.try_acquire(pt(3)).unwrap();
        assert!(other.try_acquire(pt(3)).is_none());
    }
}

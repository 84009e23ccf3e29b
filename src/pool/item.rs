//! Per-heavy-resource bookkeeping.

use crate::error::PoolError;
use crate::resource::{HeavyResource, ItemId, ResourceId};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Bookkeeping for one live heavy resource.
///
/// Tracks when the heavy resource was created, how many lightweight
/// resources were ever allocated from it, and which of those are currently
/// checked out. The allocation counter only increases; once it reaches the
/// cap the item is exhausted, and an exhausted item with no active resources
/// is eligible for retirement.
pub struct PoolItem<H: HeavyResource> {
    id: ItemId,
    heavy: Arc<H>,
    created_at: Instant,
    alloc_counter: usize,
    capacity: usize,
    /// Insertion-ordered set of checked-out resources. Linear scans are fine
    /// at pool scale.
    active: Vec<(ResourceId, Arc<H::Lightweight>)>,
}

/// Point-in-time view of one pool item, as reported by
/// [`status`](crate::PoolManager::status).
#[derive(Debug, Clone, Serialize)]
pub struct ItemSnapshot {
    /// How long the heavy resource has been alive.
    pub lifetime: Duration,
    /// Total lightweight resources ever allocated from it.
    pub alloc_counter: usize,
    /// Lightweight resources currently checked out.
    pub active_count: usize,
}

impl<H: HeavyResource> PoolItem<H> {
    /// Wrap a freshly created heavy resource with `capacity` as its
    /// lifetime allocation cap.
    pub fn new(heavy: Arc<H>, capacity: usize) -> Self {
        Self {
            id: ItemId::new(),
            heavy,
            created_at: Instant::now(),
            alloc_counter: 0,
            capacity,
            active: Vec::new(),
        }
    }

    /// This item's identifier.
    pub fn id(&self) -> ItemId {
        self.id
    }

    /// The heavy resource this item wraps.
    pub fn heavy(&self) -> &Arc<H> {
        &self.heavy
    }

    /// Whether the allocation cap has been reached.
    pub fn is_exhausted(&self) -> bool {
        self.alloc_counter >= self.capacity
    }

    /// Whether the item can be retired: exhausted and nothing checked out.
    pub fn is_retirable(&self) -> bool {
        self.is_exhausted() && self.active.is_empty()
    }

    /// Whether `id` is currently checked out from this item.
    pub fn contains(&self, id: ResourceId) -> bool {
        self.active.iter().any(|(rid, _)| *rid == id)
    }

    /// Number of resources currently checked out.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Register a newly created lightweight resource.
    ///
    /// Callers must check [`is_exhausted`](Self::is_exhausted) first; all
    /// allocation happens inside the single-flight reconciliation pass, so a
    /// failure here is a logic error rather than a race.
    pub fn allocate(&mut self, id: ResourceId, resource: Arc<H::Lightweight>) -> Result<(), PoolError> {
        if self.is_exhausted() {
            return Err(PoolError::Exhausted);
        }
        self.alloc_counter += 1;
        self.active.push((id, resource));
        Ok(())
    }

    /// Remove a checked-out resource and return it.
    ///
    /// Fails with [`PoolError::NotFound`] if `id` is not held here, which
    /// signals a resource foreign to this item.
    pub fn release(&mut self, id: ResourceId) -> Result<Arc<H::Lightweight>, PoolError> {
        let index = self
            .active
            .iter()
            .position(|(rid, _)| *rid == id)
            .ok_or(PoolError::NotFound)?;
        Ok(self.active.remove(index).1)
    }

    /// Empty the active set and return everything that was checked out.
    /// Used during full pool teardown.
    pub fn release_all(&mut self) -> Vec<Arc<H::Lightweight>> {
        std::mem::take(&mut self.active)
            .into_iter()
            .map(|(_, resource)| resource)
            .collect()
    }

    /// Pure read of the item's current state.
    pub fn snapshot(&self) -> ItemSnapshot {
        ItemSnapshot {
            lifetime: self.created_at.elapsed(),
            alloc_counter: self.alloc_counter,
            active_count: self.active.len(),
        }
    }

    /// Consume the item, yielding its heavy resource and whatever is still
    /// checked out.
    pub fn into_parts(mut self) -> (Arc<H>, Vec<Arc<H::Lightweight>>) {
        let active = self.release_all();
        (self.heavy, active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct TestHeavy;
    #[derive(Debug)]
    struct TestLight;

    #[async_trait]
    impl crate::resource::LightweightResource for TestLight {
        async fn dispose(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl HeavyResource for TestHeavy {
        type Lightweight = TestLight;

        async fn create_lightweight(&self) -> anyhow::Result<TestLight> {
            Ok(TestLight)
        }

        async fn dispose(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn item(capacity: usize) -> PoolItem<TestHeavy> {
        PoolItem::new(Arc::new(TestHeavy), capacity)
    }

    #[test]
    fn allocate_until_exhausted() {
        let mut item = item(2);
        assert!(!item.is_exhausted());

        item.allocate(ResourceId::new(), Arc::new(TestLight)).unwrap();
        item.allocate(ResourceId::new(), Arc::new(TestLight)).unwrap();
        assert!(item.is_exhausted());

        let err = item
            .allocate(ResourceId::new(), Arc::new(TestLight))
            .unwrap_err();
        assert!(matches!(err, PoolError::Exhausted));
    }

    #[test]
    fn release_unknown_resource_fails() {
        let mut item = item(2);
        let id = ResourceId::new();
        item.allocate(id, Arc::new(TestLight)).unwrap();

        let err = item.release(ResourceId::new()).unwrap_err();
        assert!(matches!(err, PoolError::NotFound));

        // The known resource is untouched by the failed release.
        assert!(item.contains(id));
        item.release(id).unwrap();
        assert!(!item.contains(id));
    }

    #[test]
    fn retirable_only_when_exhausted_and_idle() {
        let mut item = item(1);
        assert!(!item.is_retirable());

        let id = ResourceId::new();
        item.allocate(id, Arc::new(TestLight)).unwrap();
        assert!(item.is_exhausted());
        assert!(!item.is_retirable());

        item.release(id).unwrap();
        assert!(item.is_retirable());
    }

    #[test]
    fn release_all_empties_the_active_set() {
        let mut item = item(3);
        item.allocate(ResourceId::new(), Arc::new(TestLight)).unwrap();
        item.allocate(ResourceId::new(), Arc::new(TestLight)).unwrap();

        let drained = item.release_all();
        assert_eq!(drained.len(), 2);
        assert_eq!(item.active_count(), 0);

        // Allocation history is not rewound by a drain.
        let snapshot = item.snapshot();
        assert_eq!(snapshot.alloc_counter, 2);
        assert_eq!(snapshot.active_count, 0);
    }
}

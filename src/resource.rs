//! Resource traits and handles.
//!
//! The pool never creates or destroys resources itself. A
//! [`ResourceFactory`] produces heavy resources, a [`HeavyResource`]
//! produces lightweight resources, and both kinds are destroyed through
//! their own `dispose` calls. All four operations are asynchronous and
//! fallible; the pool treats them as black boxes.

use async_trait::async_trait;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use uuid::Uuid;

/// Identifier of a live pool item (one heavy resource and its bookkeeping).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ItemId(Uuid);

impl ItemId {
    /// Create a new random item identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of an issued lightweight resource.
///
/// Assigned by the pool when a lightweight resource is allocated; it is what
/// ties a [`Pooled`] handle back to the pool item that owns it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResourceId(Uuid);

impl ResourceId {
    /// Create a new random resource identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ResourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A cheap sub-resource obtained from a heavy resource.
///
/// This is what callers actually acquire and release.
#[async_trait]
pub trait LightweightResource: Send + Sync + 'static {
    /// Destroy the resource. Failures are reported through the pool's
    /// notification channel and never block other teardowns.
    async fn dispose(&self) -> anyhow::Result<()>;
}

/// An expensive, slow-to-create unit of capacity that can be subdivided into
/// lightweight resources.
#[async_trait]
pub trait HeavyResource: Send + Sync + 'static {
    /// The lightweight resource type this heavy resource produces.
    type Lightweight: LightweightResource;

    /// Create one lightweight resource.
    ///
    /// The pool guarantees it never asks for more than the configured
    /// concurrency ceiling over the lifetime of one heavy resource.
    async fn create_lightweight(&self) -> anyhow::Result<Self::Lightweight>;

    /// Destroy the heavy resource.
    ///
    /// The pool only calls this after every lightweight resource created from
    /// it has finished its own teardown.
    async fn dispose(&self) -> anyhow::Result<()>;
}

/// Factory for heavy resources, injected at pool construction.
#[async_trait]
pub trait ResourceFactory: Send + Sync + 'static {
    /// The heavy resource type this factory produces.
    type Heavy: HeavyResource;

    /// Create a new heavy resource.
    async fn create_heavy(&self) -> anyhow::Result<Self::Heavy>;
}

/// Handle to an acquired lightweight resource.
///
/// The pool keeps its own reference to the underlying resource so that
/// [`close_all`](crate::PoolManager::close_all) can tear down resources that
/// are still checked out. Dropping a `Pooled` does not return the resource;
/// pass it to [`close`](crate::PoolManager::close).
pub struct Pooled<L> {
    id: ResourceId,
    resource: Arc<L>,
}

impl<L> Pooled<L> {
    pub(crate) fn new(id: ResourceId, resource: Arc<L>) -> Self {
        Self { id, resource }
    }

    /// The pool-assigned identifier of this resource.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// The underlying lightweight resource.
    pub fn resource(&self) -> &Arc<L> {
        &self.resource
    }
}

impl<L> Deref for Pooled<L> {
    type Target = L;

    fn deref(&self) -> &L {
        &self.resource
    }
}

impl<L> fmt::Debug for Pooled<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pooled({})", self.id)
    }
}

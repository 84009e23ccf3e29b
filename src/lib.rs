#![deny(warnings)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

//! # tiered_pool
//!
//! A bounded pool of expensive, slow-to-create "heavy" resources, each of
//! which can yield a limited number of cheaper "lightweight" sub-resources
//! before it must be retired.
//!
//! Callers request a lightweight resource with
//! [`acquire`](PoolManager::acquire) and return it with
//! [`close`](PoolManager::close); the pool transparently creates, reuses, and
//! retires heavy resources to respect a global concurrency ceiling and a
//! per-heavy-resource allocation cap. Creation and destruction of the
//! resources themselves are injected through the [`ResourceFactory`],
//! [`HeavyResource`], and [`LightweightResource`] traits; the pool treats
//! them as opaque asynchronous collaborators.
//!
//! ## Guarantees
//!
//! - The number of simultaneously checked-out lightweight resources never
//!   exceeds the configured concurrency ceiling.
//! - Acquire requests resolve in strict FIFO order among requests that are
//!   simultaneously satisfiable; a timed-out request leaves the queue and is
//!   never resolved afterwards.
//! - A heavy resource is torn down exactly when it has produced its maximum
//!   number of lightweight resources and none of them is still checked out.
//! - Teardown is deferred and batched; teardown failures surface only
//!   through the notification channel and never fail a caller.
//!
//! ## Not provided
//!
//! No idle-resource pre-warming, no health checks, no validation before
//! reuse, no persistence across restarts, and no scheduling fairness beyond
//! arrival order.

pub mod config;
pub mod error;
pub mod events;
pub mod pool;
pub mod resource;

pub use config::PoolConfig;
pub use error::{PoolError, Result};
pub use events::{EventSink, Listener, PoolEvent};
pub use pool::{ItemSnapshot, LightOf, PoolManager, PoolStatus, QueueStats};
pub use resource::{
    HeavyResource, ItemId, LightweightResource, Pooled, ResourceFactory, ResourceId,
};

//! The acquisition/release state machine.
//!
//! Components, leaves first:
//!
//! - [`item`]: bookkeeping for one heavy resource and its checked-out
//!   lightweight resources
//! - [`queue`]: FIFO queue of pending acquire requests with deadline
//!   cancellation and latency statistics
//! - [`closer`]: deferred, batched teardown isolated from the request path
//! - [`runner`]: single-flight, coalescing driver for the reconciliation
//!   routine
//! - [`manager`]: the façade wiring the above together

pub mod closer;
pub mod item;
pub mod manager;
pub mod queue;
pub mod runner;

pub use item::ItemSnapshot;
pub use manager::{LightOf, PoolManager, PoolStatus};
pub use queue::QueueStats;

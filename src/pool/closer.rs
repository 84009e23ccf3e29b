//! Deferred, batched resource teardown.
//!
//! `close` and `close_all` never tear resources down inline; they park them
//! here and the next reconciliation pass flushes the batch. Teardown errors
//! are isolated: each dispose runs independently, failures surface only as
//! error notifications, and no failure blocks another teardown. All
//! lightweight resources finish before any heavy resource is disposed, so a
//! heavy resource is never destroyed under a child that is mid-teardown.

use crate::error::PoolError;
use crate::events::{EventSink, PoolEvent};
use crate::resource::{HeavyResource, LightweightResource};
use futures::future::join_all;
use log::{debug, warn};
use std::sync::Arc;

/// Accumulator for resources awaiting teardown.
///
/// Lives inside the pool's state mutex; scheduling is append-only and a
/// flush atomically swaps both lists out, so anything scheduled during a
/// running flush lands in fresh lists for the next pass.
pub(crate) struct DeferredCloser<H: HeavyResource> {
    lightweight: Vec<Arc<H::Lightweight>>,
    heavy: Vec<Arc<H>>,
}

impl<H: HeavyResource> DeferredCloser<H> {
    pub(crate) fn new() -> Self {
        Self {
            lightweight: Vec::new(),
            heavy: Vec::new(),
        }
    }

    pub(crate) fn schedule_lightweight(&mut self, resource: Arc<H::Lightweight>) {
        self.lightweight.push(resource);
    }

    pub(crate) fn schedule_lightweight_batch(
        &mut self,
        resources: impl IntoIterator<Item = Arc<H::Lightweight>>,
    ) {
        self.lightweight.extend(resources);
    }

    pub(crate) fn schedule_heavy(&mut self, resource: Arc<H>) {
        self.heavy.push(resource);
    }

    /// Swap out both accumulated lists.
    pub(crate) fn take(&mut self) -> (Vec<Arc<H::Lightweight>>, Vec<Arc<H>>) {
        (
            std::mem::take(&mut self.lightweight),
            std::mem::take(&mut self.heavy),
        )
    }
}

/// Tear down one swapped-out batch.
///
/// Runs outside the state mutex. Lightweight disposals run concurrently and
/// complete before any heavy disposal starts; each success emits an
/// after-close notification and each failure a non-fatal error notification.
pub(crate) async fn flush<H: HeavyResource>(
    lightweight: Vec<Arc<H::Lightweight>>,
    heavy: Vec<Arc<H>>,
    sink: &EventSink<H::Lightweight>,
) {
    if lightweight.is_empty() && heavy.is_empty() {
        return;
    }
    debug!(
        "flushing deferred teardown: {} lightweight, {} heavy",
        lightweight.len(),
        heavy.len()
    );

    join_all(lightweight.into_iter().map(|resource| async move {
        match resource.dispose().await {
            Ok(()) => sink.emit(&PoolEvent::AfterClose { resource }),
            Err(e) => {
                warn!("lightweight resource teardown failed: {e:#}");
                sink.emit(&PoolEvent::Error(PoolError::TeardownFailed(format!(
                    "{e:#}"
                ))));
            }
        }
    }))
    .await;

    join_all(heavy.into_iter().map(|resource| async move {
        if let Err(e) = resource.dispose().await {
            warn!("heavy resource teardown failed: {e:#}");
            sink.emit(&PoolEvent::Error(PoolError::TeardownFailed(format!(
                "{e:#}"
            ))));
        }
    }))
    .await;
}

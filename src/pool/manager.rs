//! Pool façade and the reconciliation routine.
//!
//! `PoolManager` owns the live pool items, the acquire queue, and the
//! deferred-teardown accumulators, all behind one async mutex. Every
//! mutation of that state happens either in a short lock-holding section of
//! `acquire`/`close`/`close_all` or inside the single-flight reconciliation
//! pass; resource creation awaits run with the lock released, which is safe
//! because only the one in-flight pass ever creates resources.

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::events::{EventSink, Listener, PoolEvent, SharedEventSink};
use crate::pool::closer::{self, DeferredCloser};
use crate::pool::item::{ItemSnapshot, PoolItem};
use crate::pool::queue::{AcquireQueue, QueueStats, ResolveOutcome};
use crate::pool::runner::{SingleFlightRunner, WorkFuture};
use crate::resource::{HeavyResource, ItemId, Pooled, ResourceFactory, ResourceId};
use log::{debug, info, trace};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::time::sleep;

/// The lightweight resource type produced by factory `F`.
pub type LightOf<F> = <<F as ResourceFactory>::Heavy as HeavyResource>::Lightweight;

/// Point-in-time view of the whole pool.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    /// One snapshot per live pool item, in reuse-priority order.
    pub items: Vec<ItemSnapshot>,
    /// Aggregate acquisition-latency statistics.
    pub queue: QueueStats,
    /// Acquire requests currently waiting in the queue.
    pub pending: usize,
}

/// Everything the reconciliation pass and the public API share.
struct PoolShared<F: ResourceFactory> {
    config: PoolConfig,
    factory: F,
    state: Mutex<PoolState<F>>,
    events: SharedEventSink<LightOf<F>>,
}

/// Mutable pool state, exclusively owned by the manager's mutex.
struct PoolState<F: ResourceFactory> {
    /// Live items in insertion order; reuse is first-fit over this list.
    items: Vec<PoolItem<F::Heavy>>,
    /// Running count of checked-out lightweight resources across all items.
    active_total: usize,
    queue: AcquireQueue<LightOf<F>>,
    closer: DeferredCloser<F::Heavy>,
}

/// A bounded pool of heavy resources yielding lightweight sub-resources.
///
/// Callers [`acquire`](Self::acquire) a lightweight resource and later
/// [`close`](Self::close) it; the pool creates, reuses, and retires heavy
/// resources through the injected [`ResourceFactory`] so that the number of
/// simultaneously checked-out resources never exceeds the configured
/// concurrency ceiling.
pub struct PoolManager<F: ResourceFactory> {
    shared: Arc<PoolShared<F>>,
    runner: SingleFlightRunner,
}

impl<F: ResourceFactory> PoolManager<F> {
    /// Create a pool.
    ///
    /// Fails with [`PoolError::Config`] if the configuration is invalid;
    /// no resources are created until the first acquire.
    pub fn new(config: PoolConfig, factory: F) -> Result<Self, PoolError> {
        config.validate()?;

        let events: SharedEventSink<LightOf<F>> = Arc::new(EventSink::new());
        let shared = Arc::new(PoolShared {
            config: config.clone(),
            factory,
            state: Mutex::new(PoolState {
                items: Vec::new(),
                active_total: 0,
                queue: AcquireQueue::new(),
                closer: DeferredCloser::new(),
            }),
            events: Arc::clone(&events),
        });

        let work = {
            let shared = Arc::clone(&shared);
            move || -> WorkFuture {
                let shared = Arc::clone(&shared);
                Box::pin(async move { reconcile(&shared).await })
            }
        };
        let on_error = {
            let events = Arc::clone(&events);
            move |e: PoolError| {
                events.emit(&PoolEvent::Error(e));
            }
        };
        let runner =
            SingleFlightRunner::new(config.retry_backoff, Box::new(work), Box::new(on_error));

        info!(
            "pool initialized: concurrency={}, acquire_timeout={:?}",
            config.concurrency, config.acquire_timeout
        );
        Ok(Self { shared, runner })
    }

    /// Acquire a lightweight resource.
    ///
    /// The request joins a FIFO queue and resolves once a reconciliation
    /// pass can satisfy it. Fails with [`PoolError::AcquireTimeout`] if
    /// still unresolved when the configured deadline fires; a timed-out
    /// request leaves the queue and is never resolved afterwards.
    pub async fn acquire(
        &self,
        metadata: serde_json::Value,
    ) -> Result<Pooled<LightOf<F>>, PoolError> {
        let (tx, mut rx) = oneshot::channel();
        let request_id = {
            let mut state = self.shared.state.lock().await;
            state.queue.enqueue(metadata, tx)
        };
        trace!("acquire request queued");
        self.runner.signal();

        let deadline = self.shared.config.acquire_timeout;
        tokio::select! {
            delivered = &mut rx => delivered.map_err(|_| PoolError::Shutdown),
            _ = sleep(deadline) => {
                let cancelled = {
                    let mut state = self.shared.state.lock().await;
                    state.queue.cancel(request_id)
                };
                if cancelled {
                    Err(PoolError::AcquireTimeout(deadline.as_millis() as u64))
                } else {
                    // The request was resolved while the deadline fired; the
                    // send completed under the state lock, so the resource is
                    // already waiting on the channel.
                    rx.await.map_err(|_| PoolError::Shutdown)
                }
            }
        }
    }

    /// Return a lightweight resource to the pool.
    ///
    /// The resource is handed to the deferred closer; if its pool item is
    /// now exhausted and idle the item is retired and its heavy resource is
    /// scheduled for teardown too. Fails with
    /// [`PoolError::ForeignResource`] (leaving pool state untouched) if this
    /// pool never issued the resource.
    pub async fn close(&self, pooled: &Pooled<LightOf<F>>) -> Result<(), PoolError> {
        {
            let mut state = self.shared.state.lock().await;
            let Some(index) = state
                .items
                .iter()
                .position(|item| item.contains(pooled.id()))
            else {
                return Err(PoolError::ForeignResource);
            };

            let resource = state.items[index].release(pooled.id())?;
            state.active_total -= 1;
            state.closer.schedule_lightweight(resource);

            if state.items[index].is_retirable() {
                let item = state.items.remove(index);
                debug!("retiring exhausted pool item {}", item.id());
                let (heavy, _) = item.into_parts();
                state.closer.schedule_heavy(heavy);
            }
        }
        self.runner.signal();
        Ok(())
    }

    /// Tear down every live pool item.
    ///
    /// The live list is emptied synchronously (an immediate
    /// [`status`](Self::status) reports zero items); the scheduled teardowns
    /// complete asynchronously on the next reconciliation pass. Requests
    /// still queued stay queued.
    pub async fn close_all(&self) {
        {
            let mut state = self.shared.state.lock().await;
            let items: Vec<_> = state.items.drain(..).collect();
            info!("closing all {} pool items", items.len());
            for item in items {
                let (heavy, active) = item.into_parts();
                state.closer.schedule_lightweight_batch(active);
                state.closer.schedule_heavy(heavy);
            }
            state.active_total = 0;
        }
        self.runner.signal();
    }

    /// Snapshot of the live items plus acquisition-latency statistics.
    pub async fn status(&self) -> PoolStatus {
        let state = self.shared.state.lock().await;
        PoolStatus {
            items: state.items.iter().map(PoolItem::snapshot).collect(),
            queue: state.queue.stats(),
            pending: state.queue.len(),
        }
    }

    /// Register an observer for lifecycle notifications.
    ///
    /// Listeners run inline on the emitting task and must not block; their
    /// behavior never feeds back into pool control flow.
    pub fn subscribe(&self, listener: Listener<LightOf<F>>) {
        self.shared.events.subscribe(listener);
    }
}

/// One reconciliation pass: flush deferred teardown, then match queued
/// demand against free capacity until one side runs out.
async fn reconcile<F: ResourceFactory>(shared: &PoolShared<F>) -> Result<(), PoolError> {
    let (lights, heavies) = {
        let mut state = shared.state.lock().await;
        state.closer.take()
    };
    closer::flush::<F::Heavy>(lights, heavies, &shared.events).await;

    loop {
        // Decide under the lock, create with it released. Only this pass
        // creates resources, so the capacity check cannot be raced into
        // over-allocation; items can only disappear meanwhile, which the
        // post-creation re-check handles.
        let reuse = {
            let state = shared.state.lock().await;
            if state.queue.is_empty() || state.active_total >= shared.config.concurrency {
                break;
            }
            state
                .items
                .iter()
                .find(|item| !item.is_exhausted())
                .map(|item| (item.id(), Arc::clone(item.heavy())))
        };

        match reuse {
            Some((item_id, heavy)) => {
                trace!("allocating lightweight resource from item {item_id}");
                let light = heavy
                    .create_lightweight()
                    .await
                    .map_err(|e| PoolError::CreationFailed(format!("{e:#}")))?;
                let mut state = shared.state.lock().await;
                register_and_resolve(&mut state, item_id, Arc::new(light), &shared.events)?;
            }
            None => {
                debug!("no reusable pool item, creating heavy resource");
                let heavy = shared
                    .factory
                    .create_heavy()
                    .await
                    .map_err(|e| PoolError::CreationFailed(format!("{e:#}")))?;
                let heavy = Arc::new(heavy);
                match heavy.create_lightweight().await {
                    Ok(light) => {
                        let mut state = shared.state.lock().await;
                        let item = PoolItem::new(Arc::clone(&heavy), shared.config.concurrency);
                        let item_id = item.id();
                        state.items.push(item);
                        register_and_resolve(&mut state, item_id, Arc::new(light), &shared.events)?;
                    }
                    Err(e) => {
                        // The half-built heavy resource must not leak; park it
                        // for teardown and let the runner retry the pass. The
                        // triggering request stays queued.
                        let mut state = shared.state.lock().await;
                        state.closer.schedule_heavy(heavy);
                        return Err(PoolError::CreationFailed(format!("{e:#}")));
                    }
                }
            }
        }
    }

    Ok(())
}

/// Register a freshly created lightweight resource on `item_id` and hand it
/// to the oldest queued request.
///
/// Covers the two ways the world can have moved on during the creation
/// await: the item may have been retired by `close_all` (the resource goes
/// straight to teardown), or every queued request may have timed out (the
/// allocation is rolled back and the resource goes to teardown, retiring the
/// item if that left it exhausted and idle).
fn register_and_resolve<F: ResourceFactory>(
    state: &mut PoolState<F>,
    item_id: ItemId,
    light: Arc<LightOf<F>>,
    events: &EventSink<LightOf<F>>,
) -> Result<(), PoolError> {
    let Some(index) = state.items.iter().position(|item| item.id() == item_id) else {
        debug!("pool item {item_id} vanished during creation, discarding resource");
        state.closer.schedule_lightweight(light);
        return Ok(());
    };

    let resource_id = ResourceId::new();
    state.items[index].allocate(resource_id, Arc::clone(&light))?;
    state.active_total += 1;

    match state
        .queue
        .resolve_oldest(Pooled::new(resource_id, light), events)
    {
        ResolveOutcome::Delivered => Ok(()),
        ResolveOutcome::NoWaiter(pooled) | ResolveOutcome::Disconnected(pooled) => {
            let resource = state.items[index].release(pooled.id())?;
            state.active_total -= 1;
            state.closer.schedule_lightweight(resource);
            if state.items[index].is_retirable() {
                let item = state.items.remove(index);
                let (heavy, _) = item.into_parts();
                state.closer.schedule_heavy(heavy);
            }
            Ok(())
        }
    }
}

//! Single-flight execution of the reconciliation routine.
//!
//! Any number of tasks may signal that reconciliation is needed; at most one
//! execution runs at a time. Signals arriving during a run coalesce into a
//! single follow-up pass. A failing pass is reported through the error
//! callback and retried after a fixed backoff rather than letting the loop
//! stop while demand may remain unresolved.

use crate::error::PoolError;
use log::{debug, warn};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Future returned by one invocation of the runner's work.
pub(crate) type WorkFuture = Pin<Box<dyn Future<Output = Result<(), PoolError>> + Send>>;

/// Factory producing one reconciliation pass per call.
pub(crate) type WorkFn = Box<dyn Fn() -> WorkFuture + Send + Sync>;

/// Out-of-band error reporting for failed passes.
pub(crate) type ErrorFn = Box<dyn Fn(PoolError) + Send + Sync>;

#[derive(Default)]
struct RunFlags {
    running: bool,
    rerun: bool,
}

struct RunnerInner {
    flags: Mutex<RunFlags>,
    work: WorkFn,
    on_error: ErrorFn,
    backoff: Duration,
}

/// Coalescing single-flight driver for the reconciliation loop.
pub(crate) struct SingleFlightRunner {
    inner: Arc<RunnerInner>,
}

impl SingleFlightRunner {
    pub(crate) fn new(backoff: Duration, work: WorkFn, on_error: ErrorFn) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                flags: Mutex::new(RunFlags::default()),
                work,
                on_error,
                backoff,
            }),
        }
    }

    /// Request a reconciliation pass.
    ///
    /// Spawns the execution loop if none is running; otherwise marks that
    /// one more pass is needed after the current one finishes. N signals
    /// during one execution produce at most one extra pass.
    pub(crate) fn signal(&self) {
        {
            let mut flags = self.inner.flags.lock().unwrap();
            if flags.running {
                flags.rerun = true;
                return;
            }
            flags.running = true;
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            loop {
                match (inner.work)().await {
                    Ok(()) => {
                        let mut flags = inner.flags.lock().unwrap();
                        if flags.rerun {
                            flags.rerun = false;
                            continue;
                        }
                        flags.running = false;
                        return;
                    }
                    Err(e) => {
                        warn!("reconciliation pass failed, retrying: {e}");
                        (inner.on_error)(e);
                        tokio::time::sleep(inner.backoff).await;
                        debug!("retrying reconciliation after backoff");
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    fn counting_runner(
        passes: Arc<AtomicUsize>,
        done: Arc<Notify>,
    ) -> SingleFlightRunner {
        SingleFlightRunner::new(
            Duration::from_millis(10),
            Box::new(move || {
                let passes = Arc::clone(&passes);
                let done = Arc::clone(&done);
                Box::pin(async move {
                    // Yield so concurrent signals can land mid-pass.
                    tokio::task::yield_now().await;
                    passes.fetch_add(1, Ordering::SeqCst);
                    done.notify_one();
                    Ok(())
                })
            }),
            Box::new(|_| {}),
        )
    }

    #[tokio::test]
    async fn concurrent_signals_coalesce() {
        let passes = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(Notify::new());
        let runner = counting_runner(Arc::clone(&passes), Arc::clone(&done));

        for _ in 0..10 {
            runner.signal();
        }

        done.notified().await;
        // One running pass plus at most one coalesced follow-up.
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert!(passes.load(Ordering::SeqCst) <= 2);
        assert!(passes.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_pass_retries_after_backoff() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(Notify::new());

        let runner = {
            let attempts = Arc::clone(&attempts);
            let done = Arc::clone(&done);
            SingleFlightRunner::new(
                Duration::from_secs(1),
                Box::new(move || {
                    let attempts = Arc::clone(&attempts);
                    let done = Arc::clone(&done);
                    Box::pin(async move {
                        if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                            Err(PoolError::CreationFailed("boom".to_string()))
                        } else {
                            done.notify_one();
                            Ok(())
                        }
                    })
                }),
                {
                    let errors = Arc::clone(&errors);
                    Box::new(move |_| {
                        errors.fetch_add(1, Ordering::SeqCst);
                    })
                },
            )
        };

        runner.signal();
        done.notified().await;

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(errors.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn signal_after_completion_runs_again() {
        let passes = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(Notify::new());
        let runner = counting_runner(Arc::clone(&passes), Arc::clone(&done));

        runner.signal();
        done.notified().await;
        runner.signal();
        done.notified().await;

        assert!(passes.load(Ordering::SeqCst) >= 2);
    }
}

//! Trailing-edge debouncing of async side effects
//!
//! A [`Debouncer`] owns at most one pending timer. Every
//! [`schedule`](Debouncer::schedule) replaces the pending call, so a burst of
//! calls collapses into a single execution carrying the last value, `delay`
//! after the burst ends. Once the delay elapsed the call is in flight and is
//! no longer cancelled by later schedules.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::error::Result;

type Task<T> = Arc<dyn Fn(T) -> BoxFuture<'static, Result<()>> + Send + Sync>;

#[derive(Default)]
struct Pending {
    /// Bumped on every schedule/cancel; a timer only fires if it still matches
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

/// Coalesces bursts of calls into one delayed call
pub struct Debouncer<T> {
    label: String,
    delay: Duration,
    task: Task<T>,
    pending: Arc<Mutex<Pending>>,
}

impl<T: Send + 'static> Debouncer<T> {
    /// Create a debouncer running `f` `delay` after the last schedule.
    ///
    /// Errors returned by `f` are logged under `label` and never reach the
    /// caller of [`schedule`](Self::schedule).
    pub fn new<F, Fut>(label: impl Into<String>, delay: Duration, f: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            label: label.into(),
            delay,
            task: Arc::new(move |value| f(value).boxed()),
            pending: Arc::new(Mutex::new(Pending::default())),
        }
    }

    /// Schedule a call with `value`, replacing any pending one.
    ///
    /// Outside a tokio runtime the call is dropped with an error log and any
    /// pending call is left in place.
    pub fn schedule(&self, value: T) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::error!("No async runtime available, {} not scheduled", self.label);
                return;
            }
        };

        let mut pending = self.pending.lock();
        if let Some(handle) = pending.handle.take() {
            handle.abort();
        }
        pending.generation += 1;

        let generation = pending.generation;
        let slot = self.pending.clone();
        let task = self.task.clone();
        let delay = self.delay;
        let label = self.label.clone();

        pending.handle = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut pending = slot.lock();
                if pending.generation != generation {
                    return;
                }
                pending.handle = None;
            }
            if let Err(e) = task(value).await {
                tracing::warn!("Debounced {} failed: {}", label, e);
            }
        }));
    }

    /// Drop the pending call, if any
    pub fn cancel_pending(&self) {
        let mut pending = self.pending.lock();
        pending.generation += 1;
        if let Some(handle) = pending.handle.take() {
            handle.abort();
        }
    }

    /// Whether a call is waiting for its delay to elapse
    pub fn is_pending(&self) -> bool {
        self.pending.lock().handle.is_some()
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        let mut pending = self.pending.lock();
        if let Some(handle) = pending.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MiceptError;

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, Debouncer<u32>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        let debouncer = Debouncer::new("test", Duration::from_millis(100), move |v| {
            let sink = sink.clone();
            async move {
                sink.lock().push(v);
                Ok(())
            }
        });
        (calls, debouncer)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_to_last_value() {
        let (calls, debouncer) = recorder();

        for i in 0..10 {
            debouncer.schedule(i);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(calls.lock().is_empty());
        assert!(debouncer.is_pending());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(*calls.lock(), vec![9]);
        assert!(!debouncer.is_pending());
    }

    #[test]
    fn test_schedule_outside_runtime_is_dropped() {
        let (calls, debouncer) = recorder();

        debouncer.schedule(1);

        assert!(!debouncer.is_pending());
        assert!(calls.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_bursts_each_fire() {
        let (calls, debouncer) = recorder();

        debouncer.schedule(1);
        tokio::time::sleep(Duration::from_millis(200)).await;
        debouncer.schedule(2);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(*calls.lock(), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_pending() {
        let (calls, debouncer) = recorder();

        debouncer.schedule(1);
        debouncer.cancel_pending();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(calls.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_are_swallowed() {
        let attempts = Arc::new(Mutex::new(0u32));
        let counter = attempts.clone();
        let debouncer = Debouncer::new("failing", Duration::from_millis(10), move |_: ()| {
            let counter = counter.clone();
            async move {
                *counter.lock() += 1;
                Err(MiceptError::Persist("disk full".to_string()))
            }
        });

        debouncer.schedule(());
        tokio::time::sleep(Duration::from_millis(50)).await;
        debouncer.schedule(());
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(*attempts.lock(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_call_is_not_cancelled() {
        let done = Arc::new(Mutex::new(Vec::new()));
        let sink = done.clone();
        let debouncer = Debouncer::new("slow", Duration::from_millis(10), move |v: u32| {
            let sink = sink.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                sink.lock().push(v);
                Ok(())
            }
        });

        debouncer.schedule(1);
        // Past the delay: the first call is writing
        tokio::time::sleep(Duration::from_millis(20)).await;
        debouncer.schedule(2);
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(*done.lock(), vec![1, 2]);
    }
}

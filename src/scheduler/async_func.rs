//! Cross-context function dispatch.
//!
//! Other execution contexts (timer callbacks, network handlers) hand
//! closures to the scheduler's owner context through a bounded queue.
//! The submitter gets an `Arc<Future>` to wait on; the owner context
//! drains the queue on its next round and completes each future with
//! the closure's status.

use std::mem;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::warn;

use super::Task;
use crate::error::{Error, Result};
use crate::sync::{Future, lock_unpoisoned};

type Job = Box<dyn FnOnce() -> Result<()> + Send>;

pub struct AsyncFuncScheduler {
    capacity: usize,
    queue: Mutex<Vec<Job>>,
}

impl AsyncFuncScheduler {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be non-zero");
        Self {
            capacity,
            queue: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.queue).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queues `func` for execution in the owner context. Returns the
    /// future that will carry its status, or `Err(InvalidState)` when
    /// the queue is full. Never blocks.
    pub fn add<F>(&self, func: F) -> Result<Arc<Future>>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let mut queue = lock_unpoisoned(&self.queue);
        if queue.len() >= self.capacity {
            return Err(Error::InvalidState);
        }
        let future = Arc::new(Future::new());
        let handle = Arc::clone(&future);
        queue.push(Box::new(move || {
            let code = func();
            // A future is completed once; ours is private until now.
            let _ = handle.notify(code);
            code
        }));
        Ok(future)
    }

    /// Executes everything queued so far. The queue is detached before
    /// execution, so a running closure may queue follow-up work without
    /// deadlocking; that work runs on the next drain.
    pub fn drain(&self) {
        let jobs = mem::take(&mut *lock_unpoisoned(&self.queue));
        for job in jobs {
            if let Err(err) = job() {
                warn!("async-scheduler: dispatched function failed: {err}");
            }
        }
    }
}

impl Task for Arc<AsyncFuncScheduler> {
    fn run(&mut self) -> Result<()> {
        self.drain();
        Ok(())
    }
}

/// Periodic bridge task: submits a fixed function into another context's
/// [`AsyncFuncScheduler`] and waits for its completion.
///
/// A wait timeout abandons the result only; the closure may still run
/// later and its status is discarded. There is no cancellation.
pub struct AsyncFunc {
    scheduler: Arc<AsyncFuncScheduler>,
    func: Arc<dyn Fn() -> Result<()> + Send + Sync>,
    timeout: Option<Duration>,
}

impl AsyncFunc {
    /// `timeout` of `None` waits forever.
    pub fn new<F>(scheduler: Arc<AsyncFuncScheduler>, func: F, timeout: Option<Duration>) -> Self
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        Self {
            scheduler,
            func: Arc::new(func),
            timeout,
        }
    }
}

impl Task for AsyncFunc {
    fn run(&mut self) -> Result<()> {
        let func = Arc::clone(&self.func);
        let future = self.scheduler.add(move || func())?;
        future.wait(self.timeout)?;
        match future.code() {
            Some(code) => code,
            // Unreachable after a successful wait; kept total.
            None => Err(Error::Failed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn queued_function_runs_on_drain() {
        let scheduler = AsyncFuncScheduler::new(4);
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_job = Arc::clone(&hits);
        let future = scheduler
            .add(move || {
                hits_job.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 0, "nothing runs before drain");
        assert_eq!(future.code(), None);
        scheduler.drain();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(future.code(), Some(Ok(())));
    }

    #[test]
    fn failure_status_reaches_the_future() {
        let scheduler = AsyncFuncScheduler::new(4);
        let future = scheduler.add(|| Err(Error::Failed)).unwrap();
        scheduler.drain();
        assert_eq!(future.code(), Some(Err(Error::Failed)));
    }

    #[test]
    fn full_queue_rejects_without_blocking() {
        let scheduler = AsyncFuncScheduler::new(1);
        let _kept = scheduler.add(|| Ok(())).unwrap();
        assert!(matches!(
            scheduler.add(|| Ok(())),
            Err(Error::InvalidState)
        ));
        scheduler.drain();
        assert!(scheduler.add(|| Ok(())).is_ok(), "slot frees after drain");
    }

    #[test]
    fn drained_closure_may_requeue() {
        let scheduler = Arc::new(AsyncFuncScheduler::new(4));
        let inner = Arc::clone(&scheduler);
        let _ = scheduler
            .add(move || {
                inner.add(|| Ok(())).map(|_| ())
            })
            .unwrap();

        scheduler.drain();
        assert_eq!(scheduler.len(), 1, "follow-up waits for the next drain");
        scheduler.drain();
        assert_eq!(scheduler.len(), 0);
    }

    #[test]
    fn async_func_round_trips_across_threads() {
        let scheduler = Arc::new(AsyncFuncScheduler::new(4));
        let hits = Arc::new(AtomicUsize::new(0));

        let hits_fn = Arc::clone(&hits);
        let mut bridge = AsyncFunc::new(
            Arc::clone(&scheduler),
            move || {
                hits_fn.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            Some(Duration::from_secs(5)),
        );

        let owner = {
            let scheduler = Arc::clone(&scheduler);
            thread::spawn(move || {
                // Owner context polls until the dispatched work arrived.
                while scheduler.len() == 0 {
                    thread::yield_now();
                }
                scheduler.drain();
            })
        };

        bridge.run().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        owner.join().unwrap();
    }

    #[test]
    fn async_func_times_out_when_nobody_drains() {
        let scheduler = Arc::new(AsyncFuncScheduler::new(4));
        let mut bridge = AsyncFunc::new(
            Arc::clone(&scheduler),
            || Ok(()),
            Some(Duration::from_millis(20)),
        );
        assert_eq!(bridge.run(), Err(Error::Timeout));
    }

    #[test]
    fn async_func_propagates_queue_full() {
        let scheduler = Arc::new(AsyncFuncScheduler::new(1));
        let _kept = scheduler.add(|| Ok(())).unwrap();
        let mut bridge = AsyncFunc::new(Arc::clone(&scheduler), || Ok(()), None);
        assert_eq!(bridge.run(), Err(Error::InvalidState));
    }
}

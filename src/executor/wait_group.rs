//! Join counter for in-flight tasks.
//!
//! # WaitGroup
//!
//! 1. `register` bumps the counter before the task is scheduled and hands back an
//!    `InFlight` guard.
//! 2. Dropping the guard decrements exactly once, on every exit path.
//! 3. `wait`/`wait_async` park on an `Event` until the counter drains to zero.

use std::sync::atomic::{AtomicUsize, Ordering::SeqCst};
use std::sync::Arc;

use event_listener::Event;

/// Counter of outstanding tasks with wake-on-zero.
#[derive(Debug, Default)]
pub struct WaitGroup {
    count: AtomicUsize,
    drained: Event,
}

/// One unit of in-flight work; deregisters itself on drop.
#[derive(Debug)]
#[must_use = "dropping the guard deregisters the task immediately"]
pub struct InFlight {
    group: Arc<WaitGroup>,
}

impl WaitGroup {
    /// New a WaitGroup at zero.
    pub fn new() -> Arc<WaitGroup> {
        Arc::new(WaitGroup::default())
    }

    /// Register one unit of work.
    pub fn register(self: &Arc<Self>) -> InFlight {
        self.count.fetch_add(1, SeqCst);

        InFlight {
            group: self.clone(),
        }
    }

    /// Number of registered units not yet deregistered.
    pub fn in_flight(&self) -> usize {
        self.count.load(SeqCst)
    }

    /// Block the thread until the counter is zero.
    pub fn wait(&self) {
        loop {
            if self.in_flight() == 0 {
                return;
            }

            let listener = self.drained.listen();

            if self.in_flight() == 0 {
                return;
            }

            listener.wait();
        }
    }

    /// Async-await the counter reaching zero.
    pub async fn wait_async(&self) {
        loop {
            if self.in_flight() == 0 {
                return;
            }

            let listener = self.drained.listen();

            if self.in_flight() == 0 {
                return;
            }

            listener.await;
        }
    }

    fn done(&self) {
        if self.count.fetch_sub(1, SeqCst) == 1 {
            self.drained.notify(usize::MAX);
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.group.done();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_wait_at_zero() {
        let group = WaitGroup::new();

        group.wait();
        group.wait();
        assert_eq!(group.in_flight(), 0);
    }

    #[test]
    fn test_guard_drop_deregisters() {
        let group = WaitGroup::new();

        let first = group.register();
        let second = group.register();
        assert_eq!(group.in_flight(), 2);

        drop(first);
        assert_eq!(group.in_flight(), 1);
        drop(second);
        assert_eq!(group.in_flight(), 0);
    }

    #[test]
    fn test_wait_wakes_on_drain() {
        let group = WaitGroup::new();

        let workers: Vec<_> = (0..8u64)
            .map(|i| {
                let guard = group.register();
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(5 * i));
                    drop(guard);
                })
            })
            .collect();

        group.wait();
        assert_eq!(group.in_flight(), 0);

        for worker in workers {
            worker.join().ok();
        }
    }

    #[test]
    fn test_reuse_after_drain() {
        let group = WaitGroup::new();

        let guard = group.register();
        drop(guard);
        group.wait();

        let guard = group.register();
        let waiter = {
            let group = group.clone();
            thread::spawn(move || smol::block_on(group.wait_async()))
        };

        thread::sleep(Duration::from_millis(10));
        drop(guard);
        assert!(waiter.join().is_ok());
    }

    #[test]
    fn test_guard_dropped_while_unwinding() {
        let group = WaitGroup::new();
        let guard = group.register();

        let result = thread::spawn(move || {
            let _guard = guard;
            panic!("worker died");
        })
        .join();

        assert!(result.is_err());
        assert_eq!(group.in_flight(), 0);
    }
}

#![forbid(unsafe_code)]

//! Latest-value-wins delivery onto an [`Executor`].
//!
//! Producers call [`dispatch`](LatestValueScheduler::dispatch) from any
//! thread. The consumer runs on the executor and only ever sees the most
//! recent value: values dispatched while a delivery is pending overwrite
//! each other.
//!
//! # Invariants
//!
//! 1. The consumer is never invoked concurrently with itself.
//! 2. Once dispatching stops, the last value dispatched is delivered
//!    exactly once.
//! 3. At most one drain task is queued on the executor at any time.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::executor::Executor;

struct Shared<T> {
    pending: Mutex<Option<T>>,
    scheduled: AtomicBool,
    consumer: Mutex<Box<dyn FnMut(T) + Send>>,
}

/// Collapses bursts of values into one delivery of the latest.
pub struct LatestValueScheduler<T> {
    executor: Arc<dyn Executor>,
    shared: Arc<Shared<T>>,
}

impl<T> Clone for LatestValueScheduler<T> {
    fn clone(&self) -> Self {
        Self {
            executor: Arc::clone(&self.executor),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for LatestValueScheduler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LatestValueScheduler")
            .field("scheduled", &self.shared.scheduled.load(Ordering::Relaxed))
            .finish()
    }
}

impl<T: Send + 'static> LatestValueScheduler<T> {
    pub fn new(executor: Arc<dyn Executor>, consumer: impl FnMut(T) + Send + 'static) -> Self {
        Self {
            executor,
            shared: Arc::new(Shared {
                pending: Mutex::new(None),
                scheduled: AtomicBool::new(false),
                consumer: Mutex::new(Box::new(consumer)),
            }),
        }
    }

    /// Offer `value`. Replaces any value not yet delivered. Runs the
    /// consumer inline when already on the executor's thread.
    pub fn dispatch(&self, value: T) {
        *self
            .shared
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(value);
        if self.shared.scheduled.swap(true, Ordering::AcqRel) {
            // A drain is queued or running and will see the new value.
            return;
        }
        if self.executor.is_current() {
            self.shared.drain();
        } else {
            let shared = Arc::clone(&self.shared);
            self.executor.execute(Box::new(move || shared.drain()));
        }
    }
}

impl<T> Shared<T> {
    fn take_pending(&self) -> Option<T> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn has_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn drain(&self) {
        loop {
            while let Some(value) = self.take_pending() {
                let mut consumer = self
                    .consumer
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                consumer(value);
            }
            self.scheduled.store(false, Ordering::Release);
            // A value may have landed after our last take but before the
            // flag cleared; its producer saw `scheduled == true` and left.
            if !self.has_pending() || self.scheduled.swap(true, Ordering::AcqRel) {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ImmediateExecutor;
    use std::sync::mpsc;

    /// Queues tasks until `run_all` is called.
    #[derive(Default)]
    struct QueuedExecutor {
        tasks: Mutex<Vec<crate::executor::Task>>,
    }

    impl QueuedExecutor {
        fn run_all(&self) {
            let tasks = std::mem::take(&mut *self.tasks.lock().unwrap());
            for task in tasks {
                task();
            }
        }
    }

    impl Executor for QueuedExecutor {
        fn execute(&self, task: crate::executor::Task) {
            self.tasks.lock().unwrap().push(task);
        }

        fn is_current(&self) -> bool {
            false
        }
    }

    #[test]
    fn burst_collapses_to_latest() {
        let executor = Arc::new(QueuedExecutor::default());
        let (tx, rx) = mpsc::channel();
        let scheduler = LatestValueScheduler::new(executor.clone(), move |v: u32| {
            tx.send(v).unwrap();
        });
        for v in 1..=10 {
            scheduler.dispatch(v);
        }
        assert_eq!(executor.tasks.lock().unwrap().len(), 1);
        executor.run_all();
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![10]);
    }

    #[test]
    fn immediate_executor_delivers_every_value() {
        let (tx, rx) = mpsc::channel();
        let scheduler =
            LatestValueScheduler::new(Arc::new(ImmediateExecutor), move |v: u32| tx.send(v).unwrap());
        scheduler.dispatch(1);
        scheduler.dispatch(2);
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn dispatch_after_drain_schedules_again() {
        let executor = Arc::new(QueuedExecutor::default());
        let (tx, rx) = mpsc::channel();
        let scheduler = LatestValueScheduler::new(executor.clone(), move |v: u32| {
            tx.send(v).unwrap();
        });
        scheduler.dispatch(1);
        executor.run_all();
        scheduler.dispatch(2);
        executor.run_all();
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![1, 2]);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// `true` dispatches the next value, `false` runs the executor.
            #[test]
            fn delivered_values_increase_and_end_with_the_last(
                steps in proptest::collection::vec(any::<bool>(), 1..64),
            ) {
                let executor = Arc::new(QueuedExecutor::default());
                let (tx, rx) = mpsc::channel();
                let scheduler = LatestValueScheduler::new(executor.clone(), move |v: u32| {
                    tx.send(v).unwrap();
                });

                let mut next = 0_u32;
                for dispatch in steps {
                    if dispatch {
                        next += 1;
                        scheduler.dispatch(next);
                    } else {
                        executor.run_all();
                    }
                    prop_assert!(executor.tasks.lock().unwrap().len() <= 1);
                }
                executor.run_all();

                let delivered: Vec<u32> = rx.try_iter().collect();
                prop_assert!(delivered.windows(2).all(|pair| pair[0] < pair[1]));
                prop_assert_eq!(delivered.last().copied(), (next > 0).then_some(next));
            }
        }
    }
}

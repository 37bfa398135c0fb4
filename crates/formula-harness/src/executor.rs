#![forbid(unsafe_code)]

//! An [`Executor`] that only runs work when the test says so.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::thread::{self, ThreadId};

use formula_runtime::{Executor, Task};

/// Queues tasks until [`run_pending`](Self::run_pending) is called.
///
/// While `run_pending` is running, [`Executor::is_current`] is true on the
/// calling thread, so schedulers deliver inline exactly as they would on a
/// real UI thread.
#[derive(Default)]
pub struct ManualExecutor {
    queue: Mutex<VecDeque<Task>>,
    running_on: Mutex<Option<ThreadId>>,
}

impl ManualExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks waiting to run.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Run queued tasks, including ones queued while running, until the
    /// queue is empty. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        *self.running_on.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(thread::current().id());
        let mut ran = 0;
        loop {
            let task = self
                .queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            let Some(task) = task else {
                break;
            };
            task();
            ran += 1;
        }
        *self.running_on.lock().unwrap_or_else(PoisonError::into_inner) = None;
        tracing::trace!(ran, "manual executor drained");
        ran
    }
}

impl Executor for ManualExecutor {
    fn execute(&self, task: Task) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(task);
    }

    fn is_current(&self) -> bool {
        *self.running_on.lock().unwrap_or_else(PoisonError::into_inner)
            == Some(thread::current().id())
    }
}

impl std::fmt::Debug for ManualExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualExecutor")
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn runs_only_when_asked() {
        let executor = Arc::new(ManualExecutor::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        for n in 0..3 {
            let log = Arc::clone(&log);
            executor.execute(Box::new(move || log.lock().unwrap().push(n)));
        }
        assert_eq!(executor.pending(), 3);
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(executor.run_pending(), 3);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn tasks_queued_while_running_also_run() {
        let executor = Arc::new(ManualExecutor::new());
        let inner = Arc::clone(&executor);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        executor.execute(Box::new(move || {
            sink.lock().unwrap().push(inner.is_current());
            let sink = Arc::clone(&sink);
            inner.execute(Box::new(move || sink.lock().unwrap().push(true)));
        }));
        assert!(!executor.is_current());
        assert_eq!(executor.run_pending(), 2);
        assert_eq!(*seen.lock().unwrap(), vec![true, true]);
        assert!(!executor.is_current());
    }
}

#![forbid(unsafe_code)]

//! Task executors used to hop work onto a chosen thread.
//!
//! The runtime itself never needs one: transitions run on whichever thread
//! submits them. Executors exist for the edges, e.g. delivering render
//! models on a UI thread via
//! [`LatestValueScheduler`](crate::scheduler::LatestValueScheduler).

use std::fmt;
use std::sync::mpsc;
use std::thread::{self, JoinHandle, ThreadId};

pub type Task = Box<dyn FnOnce() + Send>;

/// Runs tasks, possibly on another thread.
pub trait Executor: Send + Sync + 'static {
    fn execute(&self, task: Task);

    /// Whether the calling thread is the one tasks run on. Callers use this
    /// to run inline instead of posting.
    fn is_current(&self) -> bool;
}

/// Runs every task inline on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateExecutor;

impl Executor for ImmediateExecutor {
    fn execute(&self, task: Task) {
        task();
    }

    fn is_current(&self) -> bool {
        true
    }
}

enum Message {
    Run(Task),
    Shutdown,
}

/// A dedicated named thread that runs tasks in FIFO order.
///
/// Dropping the handle finishes queued tasks, then joins the thread.
pub struct ThreadExecutor {
    sender: mpsc::Sender<Message>,
    thread_id: ThreadId,
    handle: Option<JoinHandle<()>>,
}

impl ThreadExecutor {
    /// Spawn the worker thread.
    ///
    /// # Panics
    ///
    /// Panics if the OS refuses to spawn a thread.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        let (sender, receiver) = mpsc::channel::<Message>();
        let handle = thread::Builder::new()
            .name(name.into())
            .spawn(move || run_loop(receiver))
            .expect("failed to spawn executor thread");
        Self {
            sender,
            thread_id: handle.thread().id(),
            handle: Some(handle),
        }
    }

    /// Finish queued tasks and join the thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.sender.send(Message::Shutdown);
        if let Some(handle) = self.handle.take() {
            // Joining ourselves would deadlock; the loop exits on its own
            // once it reaches the shutdown message.
            if thread::current().id() != self.thread_id {
                let _ = handle.join();
            }
        }
    }
}

impl Executor for ThreadExecutor {
    fn execute(&self, task: Task) {
        if self.sender.send(Message::Run(task)).is_err() {
            tracing::warn!("executor thread has exited; task dropped");
        }
    }

    fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }
}

impl Drop for ThreadExecutor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for ThreadExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadExecutor")
            .field("thread_id", &self.thread_id)
            .field("running", &self.handle.is_some())
            .finish()
    }
}

fn run_loop(receiver: mpsc::Receiver<Message>) {
    while let Ok(message) = receiver.recv() {
        match message {
            Message::Run(task) => task(),
            Message::Shutdown => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn immediate_runs_inline() {
        let ran = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&ran);
        ImmediateExecutor.execute(Box::new(move || *flag.lock().unwrap() = true));
        assert!(*ran.lock().unwrap());
        assert!(ImmediateExecutor.is_current());
    }

    #[test]
    fn thread_executor_runs_in_order_on_its_thread() {
        let executor = ThreadExecutor::start("formula-test-exec");
        let seen = Arc::new(Mutex::new(Vec::new()));
        for n in 0..5 {
            let seen = Arc::clone(&seen);
            executor.execute(Box::new(move || {
                let name = thread::current().name().map(str::to_owned);
                seen.lock().unwrap().push((n, name));
            }));
        }
        assert!(!executor.is_current());
        executor.shutdown();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.iter().map(|(n, _)| *n).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
        assert!(seen.iter().all(|(_, name)| name.as_deref() == Some("formula-test-exec")));
    }

    #[test]
    fn drop_flushes_pending_tasks() {
        let count = Arc::new(Mutex::new(0));
        {
            let executor = ThreadExecutor::start("formula-test-drop");
            for _ in 0..3 {
                let count = Arc::clone(&count);
                executor.execute(Box::new(move || *count.lock().unwrap() += 1));
            }
        }
        assert_eq!(*count.lock().unwrap(), 3);
    }

    #[test]
    fn is_current_inside_task() {
        let executor = Arc::new(ThreadExecutor::start("formula-test-current"));
        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&executor);
        executor.execute(Box::new(move || {
            tx.send(inner.is_current()).unwrap();
        }));
        assert!(rx.recv().unwrap());
    }
}

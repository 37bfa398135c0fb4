#![forbid(unsafe_code)]

//! Push-side callback handles: [`Emitter`] and [`Cancelable`].

use std::fmt;
use std::sync::Arc;

/// Cloneable, thread-safe sink for values of type `T`.
///
/// Emitters are handed to [`Stream::subscribe`](crate::Stream::subscribe)
/// and may be invoked from any thread. What happens on `emit` is decided by
/// whoever created the emitter; the runtime's emitters only enqueue.
pub struct Emitter<T> {
    sink: Arc<dyn Fn(T) + Send + Sync>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
        }
    }
}

impl<T> fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter").finish_non_exhaustive()
    }
}

impl<T: 'static> Emitter<T> {
    /// Wrap a callback.
    pub fn new(sink: impl Fn(T) + Send + Sync + 'static) -> Self {
        Self {
            sink: Arc::new(sink),
        }
    }

    /// An emitter that discards every value.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    /// Deliver one value.
    pub fn emit(&self, value: T) {
        (self.sink)(value);
    }

    /// Adapt this emitter to accept `U`, converting each value with `map`.
    pub fn map<U: 'static>(&self, map: impl Fn(U) -> T + Send + Sync + 'static) -> Emitter<U> {
        let inner = self.clone();
        Emitter::new(move |value| inner.emit(map(value)))
    }
}

/// Best-effort cancellation handle returned by a started source.
///
/// Cancelling consumes the handle, so the wrapped closure runs at most once.
/// Dropping a handle without calling [`cancel`](Self::cancel) does *not*
/// cancel; sources that return no handle are expected to be naturally
/// bounded.
#[must_use = "dropping a Cancelable does not cancel the source"]
pub struct Cancelable {
    cancel: Box<dyn FnOnce() + Send>,
}

impl Cancelable {
    /// Wrap a cancellation closure.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Box::new(cancel),
        }
    }

    /// Stop the source.
    pub fn cancel(self) {
        (self.cancel)();
    }
}

impl fmt::Debug for Cancelable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cancelable").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn emit_forwards_to_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let emitter = Emitter::new(move |v: u32| sink.lock().unwrap().push(v));
        emitter.emit(1);
        emitter.clone().emit(2);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn map_converts_values() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let emitter = Emitter::new(move |v: String| sink.lock().unwrap().push(v));
        let numbers = emitter.map(|n: u32| format!("#{n}"));
        numbers.emit(3);
        assert_eq!(*seen.lock().unwrap(), vec!["#3".to_string()]);
    }

    #[test]
    fn cancel_runs_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let handle = Cancelable::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        handle.cancel();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_does_not_cancel() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        drop(Cancelable::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}

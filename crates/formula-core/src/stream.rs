#![forbid(unsafe_code)]

//! The push-based source contract and an in-memory multicast [`Relay`].
//!
//! `subscribe(emitter) -> Option<Cancelable>` is the lowest-level driving
//! contract in the system: runtime inputs, action bodies, and feature state
//! all reduce to it. Adapters for concrete reactive libraries only need to
//! implement [`Stream`].

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::emitter::{Cancelable, Emitter};

/// A push-based source of `T` values.
pub trait Stream<T>: Send + Sync + 'static {
    /// Start delivering values to `emitter`.
    ///
    /// Values may be emitted synchronously from inside this call or later
    /// from any thread. The returned handle, if any, stops delivery.
    fn subscribe(&self, emitter: Emitter<T>) -> Option<Cancelable>;
}

impl<T: 'static> Stream<T> for Arc<dyn Stream<T>> {
    fn subscribe(&self, emitter: Emitter<T>) -> Option<Cancelable> {
        (**self).subscribe(emitter)
    }
}

/// Adapter turning a closure into a [`Stream`].
pub struct FnStream<F> {
    subscribe: F,
}

/// Build a [`Stream`] from a subscribe closure.
pub fn stream_fn<T, F>(subscribe: F) -> FnStream<F>
where
    F: Fn(Emitter<T>) -> Option<Cancelable> + Send + Sync + 'static,
{
    FnStream { subscribe }
}

impl<T, F> Stream<T> for FnStream<F>
where
    F: Fn(Emitter<T>) -> Option<Cancelable> + Send + Sync + 'static,
{
    fn subscribe(&self, emitter: Emitter<T>) -> Option<Cancelable> {
        (self.subscribe)(emitter)
    }
}

struct RelayInner<T> {
    next_id: u64,
    subscribers: Vec<(u64, Emitter<T>)>,
}

/// Multicast in-memory stream. Every [`accept`](Relay::accept)ed value is
/// pushed to all subscribers registered at that moment, in subscription
/// order. Values accepted with no subscribers are dropped.
///
/// Emission happens outside the relay's lock, so subscribers may accept
/// further values or (un)subscribe re-entrantly.
pub struct Relay<T> {
    inner: Arc<Mutex<RelayInner<T>>>,
}

impl<T> Clone for Relay<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Relay<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Relay")
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}

impl<T: Clone + Send + 'static> Default for Relay<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> Relay<T> {
    /// Create a relay with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RelayInner {
                next_id: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Push `value` to every current subscriber.
    pub fn accept(&self, value: T) {
        let subscribers: Vec<Emitter<T>> = {
            let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.subscribers.iter().map(|(_, e)| e.clone()).collect()
        };
        let Some((last, rest)) = subscribers.split_last() else {
            tracing::trace!("relay value dropped: no subscribers");
            return;
        };
        for emitter in rest {
            emitter.emit(value.clone());
        }
        last.emit(value);
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribers
            .len()
    }
}

impl<T: Clone + Send + 'static> Stream<T> for Relay<T> {
    fn subscribe(&self, emitter: Emitter<T>) -> Option<Cancelable> {
        let id = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            let id = inner.next_id;
            inner.next_id += 1;
            inner.subscribers.push((id, emitter));
            id
        };
        let weak: Weak<Mutex<RelayInner<T>>> = Arc::downgrade(&self.inner);
        Some(Cancelable::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .subscribers
                    .retain(|(sub, _)| *sub != id);
            }
        }))
    }
}

#![forbid(unsafe_code)]

//! Controllable actions that count how the runtime drives them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use formula_core::{Action, Cancelable, Emitter, Key};

struct ProbeState<E> {
    starts: AtomicUsize,
    cancels: AtomicUsize,
    next_id: AtomicUsize,
    live: Mutex<Vec<(usize, Emitter<E>)>>,
}

/// A source whose actions record starts and cancels and let the test push
/// values into every live subscription.
///
/// Every [`action`](Self::action) of one probe shares the same counters.
/// Clones share state too.
pub struct ActionProbe<E> {
    name: Key,
    state: Arc<ProbeState<E>>,
}

impl<E> Clone for ActionProbe<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<E> std::fmt::Debug for ActionProbe<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionProbe")
            .field("name", &self.name)
            .field("starts", &self.starts())
            .field("cancels", &self.cancels())
            .finish()
    }
}

impl<E> ActionProbe<E> {
    pub fn new(name: impl Into<Key>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(ProbeState {
                starts: AtomicUsize::new(0),
                cancels: AtomicUsize::new(0),
                next_id: AtomicUsize::new(0),
                live: Mutex::new(Vec::new()),
            }),
        }
    }

    #[must_use]
    pub fn starts(&self) -> usize {
        self.state.starts.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn cancels(&self) -> usize {
        self.state.cancels.load(Ordering::SeqCst)
    }

    /// Subscriptions started and not yet cancelled.
    #[must_use]
    pub fn live(&self) -> usize {
        self.state
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<E: Clone + Send + 'static> ActionProbe<E> {
    /// An action keyed by the probe's name.
    #[must_use]
    pub fn action(&self) -> Action<E> {
        self.action_with_key(self.name.clone())
    }

    /// An action keyed by the probe's name and `key`, for declaring several
    /// instances from one probe.
    #[must_use]
    pub fn keyed(&self, key: impl Into<Key>) -> Action<E> {
        self.action_with_key(Key::pair(self.name.clone(), key.into()))
    }

    fn action_with_key(&self, key: Key) -> Action<E> {
        let state = Arc::clone(&self.state);
        Action::new(move |emitter: Emitter<E>| {
            state.starts.fetch_add(1, Ordering::SeqCst);
            let id = state.next_id.fetch_add(1, Ordering::SeqCst);
            state
                .live
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((id, emitter));
            let state = Arc::clone(&state);
            Some(Cancelable::new(move || {
                state.cancels.fetch_add(1, Ordering::SeqCst);
                state
                    .live
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .retain(|(live, _)| *live != id);
            }))
        })
        .with_key(key)
    }

    /// Push `value` to every live subscription, oldest first.
    pub fn emit(&self, value: E) {
        let emitters: Vec<Emitter<E>> = self
            .state
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, emitter)| emitter.clone())
            .collect();
        for emitter in emitters {
            emitter.emit(value.clone());
        }
    }
}

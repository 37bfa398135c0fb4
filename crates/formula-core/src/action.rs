#![forbid(unsafe_code)]

//! Keyed descriptions of cancellable event sources.
//!
//! An [`Action`] is inert: it describes *how* to start a source and *which*
//! key identifies it. Formulas declare actions on every evaluation; the
//! runtime compares keys between evaluations and only starts actions whose
//! key is new and only cancels actions whose key disappeared.
//!
//! # Keys
//!
//! Every action has a *sentinel* derived from the Rust type of its start
//! function (each closure has a distinct type, so two different
//! `Action::new` call sites never collide). [`Action::with_key`] qualifies
//! the sentinel with a user key, which is how one declaration site produces
//! many distinct actions (one per list item, one per destination, ...).

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use crate::emitter::{Cancelable, Emitter};
use crate::key::Key;
use crate::stream::Stream;

type StartFn<E> = dyn Fn(Emitter<E>) -> Option<Cancelable> + Send + Sync;

/// A keyed, cancellable, asynchronous event source description.
pub struct Action<E> {
    sentinel: Key,
    key: Key,
    start: Arc<StartFn<E>>,
}

impl<E> Clone for Action<E> {
    fn clone(&self) -> Self {
        Self {
            sentinel: self.sentinel.clone(),
            key: self.key.clone(),
            start: Arc::clone(&self.start),
        }
    }
}

impl<E> fmt::Debug for Action<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action").field("key", &self.key).finish()
    }
}

struct OnInit;
struct OnTerminate;
struct OnData;

impl<E: Send + 'static> Action<E> {
    /// Action whose body is `start`. The key is a sentinel for the type of
    /// `start`.
    pub fn new<S>(start: S) -> Self
    where
        S: Fn(Emitter<E>) -> Option<Cancelable> + Send + Sync + 'static,
    {
        let sentinel = Key::of::<S>();
        Self {
            key: sentinel.clone(),
            sentinel,
            start: Arc::new(start),
        }
    }

    /// Action subscribing to `stream`. The key is a sentinel for the stream
    /// type.
    pub fn from_stream<St: Stream<E>>(stream: St) -> Self {
        let sentinel = Key::of::<St>();
        Self {
            key: sentinel.clone(),
            sentinel,
            start: Arc::new(move |emitter| stream.subscribe(emitter)),
        }
    }

    /// Action emitting every item of `items` synchronously on start.
    pub fn from_iter<I>(items: I) -> Self
    where
        I: IntoIterator<Item = E> + Clone + Send + Sync + 'static,
    {
        let sentinel = Key::of::<I>();
        Self {
            key: sentinel.clone(),
            sentinel,
            start: Arc::new(move |emitter| {
                for item in items.clone() {
                    emitter.emit(item);
                }
                None
            }),
        }
    }

    /// Qualify the sentinel with `key`. Replaces any key set previously.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<Key>) -> Self {
        self.key = Key::pair(self.sentinel.clone(), key.into());
        self
    }

    /// Identity used for diffing.
    #[must_use]
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Start the source. Called by the runtime exactly once per key
    /// appearance.
    pub fn start(&self, emitter: Emitter<E>) -> Option<Cancelable> {
        (self.start)(emitter)
    }
}

impl Action<()> {
    /// Emits `()` once, synchronously, when started.
    #[must_use]
    pub fn on_init() -> Self {
        let sentinel = Key::of::<OnInit>();
        Self {
            key: sentinel.clone(),
            sentinel,
            start: Arc::new(|emitter: Emitter<()>| {
                emitter.emit(());
                None
            }),
        }
    }

    /// Emits `()` once, when cancelled (its owner stopped declaring it or
    /// was torn down). Only effects of the resulting transition run; the
    /// owner's state is no longer updated at that point.
    #[must_use]
    pub fn on_terminate() -> Self {
        let sentinel = Key::of::<OnTerminate>();
        Self {
            key: sentinel.clone(),
            sentinel,
            start: Arc::new(|emitter: Emitter<()>| {
                Some(Cancelable::new(move || emitter.emit(())))
            }),
        }
    }
}

impl<T> Action<T>
where
    T: Clone + Hash + Eq + fmt::Debug + Send + Sync + 'static,
{
    /// Emits `data` once on start. Keyed by the value, so declaring it with
    /// a different value restarts it and emits the new value.
    pub fn on_data(data: T) -> Self {
        let sentinel = Key::of::<OnData>();
        let payload = data.clone();
        Self {
            key: Key::pair(sentinel.clone(), Key::new(data)),
            sentinel,
            start: Arc::new(move |emitter: Emitter<T>| {
                emitter.emit(payload.clone());
                None
            }),
        }
    }
}

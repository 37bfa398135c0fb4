#![forbid(unsafe_code)]

//! Stable callback handles produced during evaluation.
//!
//! A [`Listener`] is a value that can be put into a formula's output and
//! called later from any thread. It does not capture the handler itself:
//! it names the node and key that declared it, and the runtime resolves the
//! handler from that node's *latest* evaluation when the event arrives.
//!
//! # Invariants
//!
//! 1. Two listeners from the same node and key compare equal across
//!    evaluations, so outputs containing them stay equal while nothing else
//!    changed.
//! 2. A listener whose key was not redeclared by the latest evaluation, or
//!    whose node was removed, drops events (logged at debug level).
//! 3. A listener outliving its runtime is inert.

use std::any::Any;
use std::fmt;
use std::sync::Weak;

use formula_core::{Emitter, Key};

use crate::node::{Delivery, Env, EventSink, NodeEvent, NodeId};

pub(crate) type ListenerDeliverFn<E> = fn(&mut dyn Any, Key, E, &Env) -> Delivery;

/// Callback handle that routes `E` events to the handler declared under the
/// same key by its owning formula.
pub struct Listener<E> {
    node: NodeId,
    key: Key,
    sink: Weak<dyn EventSink>,
    deliver: ListenerDeliverFn<E>,
}

impl<E> Clone for Listener<E> {
    fn clone(&self) -> Self {
        Self {
            node: self.node,
            key: self.key.clone(),
            sink: self.sink.clone(),
            deliver: self.deliver,
        }
    }
}

impl<E> PartialEq for Listener<E> {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node && self.key == other.key
    }
}

impl<E> Eq for Listener<E> {}

impl<E> fmt::Debug for Listener<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("node", &self.node)
            .field("key", &self.key)
            .finish()
    }
}

impl<E: Send + 'static> Listener<E> {
    pub(crate) fn new(
        node: NodeId,
        key: Key,
        sink: Weak<dyn EventSink>,
        deliver: ListenerDeliverFn<E>,
    ) -> Self {
        Self {
            node,
            key,
            sink,
            deliver,
        }
    }

    /// Send `event` to the owning formula. Callable from any thread. The
    /// transition is applied on whichever thread is driving the runtime.
    pub fn emit(&self, event: E) {
        let Some(sink) = self.sink.upgrade() else {
            tracing::trace!(node = self.node.get(), key = %self.key, "listener outlived its runtime");
            return;
        };
        let key = self.key.clone();
        let deliver = self.deliver;
        sink.submit_event(NodeEvent::new(self.node, move |node, env| {
            deliver(node, key, event, env)
        }));
    }

    /// Adapt into an [`Emitter`], e.g. to hand to a stream.
    #[must_use]
    pub fn to_emitter(&self) -> Emitter<E> {
        let listener = self.clone();
        Emitter::new(move |event| listener.emit(event))
    }

    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    #[must_use]
    pub fn key(&self) -> &Key {
        &self.key
    }
}

impl Listener<()> {
    /// Shorthand for `emit(())`.
    pub fn call(&self) {
        self.emit(());
    }
}

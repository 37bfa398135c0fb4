#![forbid(unsafe_code)]

//! Per-node action lifecycle: diff declared actions by key, start new ones,
//! cancel dropped ones.
//!
//! # Invariants
//!
//! 1. An action key present in two consecutive evaluations keeps its running
//!    instance: it is never restarted. Its handler is refreshed to the latest
//!    declaration.
//! 2. A key that disappears is cancelled exactly once. Removals are
//!    cancelled in reverse declaration order; starts happen in declaration
//!    order.
//! 3. Every running instance has a unique instance id. Events carry it, and
//!    an event whose instance is no longer running is dropped.
//! 4. Events emitted while an instance is being cancelled (e.g.
//!    `Action::on_terminate`) are buffered and handed back as terminal
//!    events: their transitions' effects run, state changes are discarded.
//!
//! # Failure Modes
//!
//! - An action's `start` panicking propagates through the runtime; the
//!   runtime is left unusable (there is no partial-start recovery).

use std::any::Any;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use ahash::AHashMap;
use formula_core::{Action, Cancelable, Effects, Emitter, Key, Transition};

use crate::formula::Formula;
use crate::manager::FormulaManager;
use crate::node::{Delivery, Env, EventSink, NodeEvent, NodeId};

/// Event handler attached to an action or listener.
pub(crate) type Handler<F, E> = Arc<
    dyn Fn(&<F as Formula>::Input, &<F as Formula>::State, E) -> Transition<<F as Formula>::State>
        + Send
        + Sync,
>;

// ── Instance slot ───────────────────────────────────────────────────────

const LIVE: u8 = 0;
const TERMINATING: u8 = 1;
const DEAD: u8 = 2;

/// Shared between a running instance and its emitter.
struct ActionSlot<E> {
    phase: AtomicU8,
    terminal: Mutex<Vec<E>>,
}

impl<E> ActionSlot<E> {
    fn new() -> Self {
        Self {
            phase: AtomicU8::new(LIVE),
            terminal: Mutex::new(Vec::new()),
        }
    }

    fn phase(&self) -> u8 {
        self.phase.load(Ordering::Acquire)
    }

    fn set_phase(&self, phase: u8) {
        self.phase.store(phase, Ordering::Release);
    }

    fn buffer(&self, event: E) {
        self.terminal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    fn take_terminal(&self) -> Vec<E> {
        std::mem::take(&mut *self.terminal.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

fn action_emitter<F, E>(
    node: NodeId,
    instance: u64,
    slot: Arc<ActionSlot<E>>,
    sink: Weak<dyn EventSink>,
) -> Emitter<E>
where
    F: Formula,
    E: Send + 'static,
{
    Emitter::new(move |event: E| match slot.phase() {
        LIVE => {
            let Some(sink) = sink.upgrade() else {
                return;
            };
            sink.submit_event(NodeEvent::new(node, move |target, env| {
                deliver_action_event::<F, E>(target, instance, event, env)
            }));
        }
        TERMINATING => slot.buffer(event),
        _ => tracing::trace!(node = node.get(), instance, "event from finished action dropped"),
    })
}

fn deliver_action_event<F, E>(target: &mut dyn Any, instance: u64, event: E, env: &Env) -> Delivery
where
    F: Formula,
    E: Send + 'static,
{
    match target.downcast_mut::<FormulaManager<F>>() {
        Some(manager) => manager.handle_action_event(instance, event, env),
        None => Delivery::Stale,
    }
}

// ── Entries ─────────────────────────────────────────────────────────────

/// Type-erased declared action, running or not yet started.
pub(crate) trait ActionEntry<F: Formula>: Send {
    fn key(&self) -> &Key;

    fn is_running(&self) -> bool;

    fn start(&mut self, node: NodeId, formula: &'static str, env: &Env);

    /// Stop the instance and collect effects of any terminal events.
    fn cancel(
        &mut self,
        input: &F::Input,
        state: &F::State,
        formula: &'static str,
        env: &Env,
        effects: &mut Effects,
    );

    /// Adopt the handler of a newer declaration with the same key.
    fn refresh(&mut self, newer: Box<dyn ActionEntry<F>>);

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

struct Running<E> {
    instance: u64,
    slot: Arc<ActionSlot<E>>,
    cancel: Option<Cancelable>,
}

pub(crate) struct DeclaredAction<F: Formula, E> {
    action: Action<E>,
    handler: Handler<F, E>,
    running: Option<Running<E>>,
}

impl<F: Formula, E: Send + 'static> DeclaredAction<F, E> {
    pub(crate) fn new(action: Action<E>, handler: Handler<F, E>) -> Self {
        Self {
            action,
            handler,
            running: None,
        }
    }

    fn handler_for(&self, instance: u64) -> Option<Handler<F, E>> {
        match &self.running {
            Some(running) if running.instance == instance => Some(Arc::clone(&self.handler)),
            _ => None,
        }
    }
}

impl<F: Formula, E: Send + 'static> ActionEntry<F> for DeclaredAction<F, E> {
    fn key(&self) -> &Key {
        self.action.key()
    }

    fn is_running(&self) -> bool {
        self.running.is_some()
    }

    fn start(&mut self, node: NodeId, formula: &'static str, env: &Env) {
        debug_assert!(self.running.is_none(), "action started twice");
        let instance = env.next_instance_id();
        let slot = Arc::new(ActionSlot::new());
        let emitter = action_emitter::<F, E>(node, instance, Arc::clone(&slot), env.sink.clone());
        env.inspect(|i| i.on_action_started(formula, self.action.key()));
        // Record the instance before starting so synchronous emissions
        // resolve once they are drained.
        self.running = Some(Running {
            instance,
            slot,
            cancel: None,
        });
        let cancel = self.action.start(emitter);
        if let Some(running) = self.running.as_mut() {
            running.cancel = cancel;
        }
    }

    fn cancel(
        &mut self,
        input: &F::Input,
        state: &F::State,
        formula: &'static str,
        env: &Env,
        effects: &mut Effects,
    ) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.slot.set_phase(TERMINATING);
        if let Some(cancel) = running.cancel {
            cancel.cancel();
        }
        running.slot.set_phase(DEAD);
        for event in running.slot.take_terminal() {
            let (state_change, terminal_effects) = (self.handler)(input, state, event).into_parts();
            if state_change.is_some() {
                tracing::debug!(formula, key = %self.action.key(), "state change from a cancelled action ignored");
            }
            effects.extend(terminal_effects);
        }
        env.inspect(|i| i.on_action_finished(formula, self.action.key()));
    }

    fn refresh(&mut self, newer: Box<dyn ActionEntry<F>>) {
        match newer.into_any().downcast::<Self>() {
            Ok(newer) => self.handler = newer.handler,
            // Same key, different event type: keep the running instance.
            Err(_) => tracing::warn!(key = %self.action.key(), "action redeclared with a different event type"),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

// ── Manager ─────────────────────────────────────────────────────────────

pub(crate) struct ActionManager<F: Formula> {
    entries: Vec<Box<dyn ActionEntry<F>>>,
    removed: Vec<Box<dyn ActionEntry<F>>>,
}

impl<F: Formula> Default for ActionManager<F> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            removed: Vec::new(),
        }
    }
}

impl<F: Formula> ActionManager<F> {
    /// Diff `declared` (already free of duplicate keys) against the current
    /// entries. Nothing starts or stops until the reconcile calls.
    pub(crate) fn update(&mut self, declared: Vec<Box<dyn ActionEntry<F>>>) {
        let index: AHashMap<Key, usize> = declared
            .iter()
            .enumerate()
            .map(|(position, entry)| (entry.key().clone(), position))
            .collect();
        let mut reused: Vec<Option<Box<dyn ActionEntry<F>>>> =
            std::iter::repeat_with(|| None).take(declared.len()).collect();

        for entry in self.entries.drain(..) {
            match index.get(entry.key()) {
                Some(&position) => reused[position] = Some(entry),
                None => self.removed.push(entry),
            }
        }

        self.entries = declared
            .into_iter()
            .zip(reused)
            .map(|(declared, existing)| match existing {
                Some(mut existing) => {
                    existing.refresh(declared);
                    existing
                }
                None => declared,
            })
            .collect();
    }

    /// Cancel entries dropped by the last update, last declared first.
    pub(crate) fn cancel_removed(
        &mut self,
        input: &F::Input,
        state: &F::State,
        formula: &'static str,
        env: &Env,
        effects: &mut Effects,
    ) {
        for mut entry in self.removed.drain(..).rev() {
            entry.cancel(input, state, formula, env, effects);
        }
    }

    /// Start entries that are not running yet, in declaration order.
    pub(crate) fn start_pending(&mut self, node: NodeId, formula: &'static str, env: &Env) {
        for entry in &mut self.entries {
            if !entry.is_running() {
                entry.start(node, formula, env);
            }
        }
    }

    /// Cancel everything, last declared first.
    pub(crate) fn terminate_all(
        &mut self,
        input: &F::Input,
        state: &F::State,
        formula: &'static str,
        env: &Env,
        effects: &mut Effects,
    ) {
        self.cancel_removed(input, state, formula, env, effects);
        for mut entry in self.entries.drain(..).rev() {
            entry.cancel(input, state, formula, env, effects);
        }
    }

    /// Handler of the running instance `instance`, if it is still running
    /// and carries events of type `E`.
    pub(crate) fn handler_for<E: Send + 'static>(&self, instance: u64) -> Option<Handler<F, E>> {
        self.entries.iter().find_map(|entry| {
            entry
                .as_any()
                .downcast_ref::<DeclaredAction<F, E>>()
                .and_then(|declared| declared.handler_for(instance))
        })
    }

    pub(crate) fn running_keys(&self) -> Vec<Key> {
        self.entries
            .iter()
            .filter(|entry| entry.is_running())
            .map(|entry| entry.key().clone())
            .collect()
    }
}

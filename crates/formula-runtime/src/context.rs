#![forbid(unsafe_code)]

//! The declaration surface a formula uses while evaluating.
//!
//! [`FormulaContext`] collects everything one evaluation declares:
//!
//! - **actions** via [`run`](FormulaContext::run),
//! - **children** via [`child`](FormulaContext::child), which evaluates the
//!   child synchronously and returns its output,
//! - **listeners** via [`callback`](FormulaContext::callback) and
//!   [`on_event`](FormulaContext::on_event).
//!
//! Declarations are identified by keys. Implicit keys come from the call
//! site (`#[track_caller]`), so a declaration inside a loop needs an
//! explicit key (`*_with_key`), otherwise the second iteration is a
//! duplicate.
//!
//! # Failure Modes
//!
//! - Duplicate keys panic under validation, otherwise the later declaration
//!   is logged and ignored.
//! - Under validation every formula is evaluated a second time against a
//!   context that records nothing and answers `child` from the first
//!   pass. A child missing from the first pass is a
//!   [`FormulaError::ChildSetChanged`].

use std::any::Any;
use std::cell::RefCell;
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use formula_core::{Action, FormulaError, Key, KeyScope, Transition};

use crate::action_manager::{ActionEntry, DeclaredAction, Handler};
use crate::formula::Formula;
use crate::listener::Listener;
use crate::manager::FormulaManager;
use crate::node::{Delivery, Env, ErasedNode, NodeId};

/// A child node together with the key it was declared under.
pub(crate) struct ChildEntry {
    pub(crate) key: Key,
    pub(crate) node: Box<dyn ErasedNode>,
}

/// Listener handlers keyed by listener key. Values are `Handler<F, E>`.
pub(crate) type ListenerMap = AHashMap<Key, Box<dyn Any + Send + Sync>>;

/// Everything one evaluation declared.
pub(crate) struct Declarations<F: Formula> {
    pub(crate) children: Vec<ChildEntry>,
    pub(crate) removed_children: Vec<ChildEntry>,
    pub(crate) actions: Vec<Box<dyn ActionEntry<F>>>,
    pub(crate) listeners: ListenerMap,
}

struct Recorder<F: Formula> {
    previous: Vec<Option<ChildEntry>>,
    previous_index: AHashMap<Key, usize>,
    children: Vec<ChildEntry>,
    child_keys: AHashSet<Key>,
    actions: Vec<Box<dyn ActionEntry<F>>>,
    action_keys: AHashSet<Key>,
    listeners: ListenerMap,
}

enum Mode<F: Formula> {
    Recording(RefCell<Recorder<F>>),
    /// Second validation pass: records nothing, answers `child` from the
    /// children the first pass produced.
    Replaying(Vec<ChildEntry>),
}

/// Declaration surface for one evaluation of `F`.
pub struct FormulaContext<F: Formula> {
    node: NodeId,
    formula: &'static str,
    env: Arc<Env>,
    mode: Mode<F>,
}

impl<F: Formula> FormulaContext<F> {
    pub(crate) fn recording(
        node: NodeId,
        formula: &'static str,
        env: Arc<Env>,
        previous: Vec<ChildEntry>,
    ) -> Self {
        let previous_index = previous
            .iter()
            .enumerate()
            .map(|(position, entry)| (entry.key.clone(), position))
            .collect();
        Self {
            node,
            formula,
            env,
            mode: Mode::Recording(RefCell::new(Recorder {
                previous: previous.into_iter().map(Some).collect(),
                previous_index,
                children: Vec::new(),
                child_keys: AHashSet::new(),
                actions: Vec::new(),
                action_keys: AHashSet::new(),
                listeners: ListenerMap::new(),
            })),
        }
    }

    pub(crate) fn replaying(
        node: NodeId,
        formula: &'static str,
        env: Arc<Env>,
        children: Vec<ChildEntry>,
    ) -> Self {
        Self {
            node,
            formula,
            env,
            mode: Mode::Replaying(children),
        }
    }

    /// Declarations of a recording context. Previous children that were not
    /// redeclared come back as `removed_children`, in their old order.
    pub(crate) fn into_declarations(self) -> Declarations<F> {
        match self.mode {
            Mode::Recording(recorder) => {
                let recorder = recorder.into_inner();
                Declarations {
                    children: recorder.children,
                    removed_children: recorder.previous.into_iter().flatten().collect(),
                    actions: recorder.actions,
                    listeners: recorder.listeners,
                }
            }
            Mode::Replaying(children) => Declarations {
                children,
                removed_children: Vec::new(),
                actions: Vec::new(),
                listeners: ListenerMap::new(),
            },
        }
    }

    /// Id of the node being evaluated.
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    // ── Actions ─────────────────────────────────────────────────────────

    /// Declare `action`; `handler` turns each of its events into a
    /// transition. The action starts after this evaluation commits if its
    /// key is new, keeps running if it was declared last time, and is
    /// cancelled once an evaluation stops declaring it.
    pub fn run<E, H>(&self, action: Action<E>, handler: H)
    where
        E: Send + 'static,
        H: Fn(&F::Input, &F::State, E) -> Transition<F::State> + Send + Sync + 'static,
    {
        let Mode::Recording(recorder) = &self.mode else {
            return;
        };
        let mut recorder = recorder.borrow_mut();
        if !recorder.action_keys.insert(action.key().clone()) {
            drop(recorder);
            self.env
                .duplicate_key(KeyScope::Action, action.key(), self.formula);
            return;
        }
        let handler: Handler<F, E> = Arc::new(handler);
        recorder
            .actions
            .push(Box::new(DeclaredAction::<F, E>::new(action, handler)));
    }

    // ── Listeners ───────────────────────────────────────────────────────

    /// Listener without payload, keyed by the call site.
    #[track_caller]
    pub fn callback<H>(&self, handler: H) -> Listener<()>
    where
        H: Fn(&F::Input, &F::State) -> Transition<F::State> + Send + Sync + 'static,
    {
        self.register(Key::caller(), move |input: &F::Input, state: &F::State, ()| {
            handler(input, state)
        })
    }

    /// Listener without payload under an explicit key.
    pub fn callback_with_key<H>(&self, key: impl Into<Key>, handler: H) -> Listener<()>
    where
        H: Fn(&F::Input, &F::State) -> Transition<F::State> + Send + Sync + 'static,
    {
        self.register(key.into(), move |input: &F::Input, state: &F::State, ()| {
            handler(input, state)
        })
    }

    /// Listener carrying `E`, keyed by the call site.
    #[track_caller]
    pub fn on_event<E, H>(&self, handler: H) -> Listener<E>
    where
        E: Send + 'static,
        H: Fn(&F::Input, &F::State, E) -> Transition<F::State> + Send + Sync + 'static,
    {
        self.register(Key::caller(), handler)
    }

    /// Listener carrying `E` under an explicit key.
    pub fn on_event_with_key<E, H>(&self, key: impl Into<Key>, handler: H) -> Listener<E>
    where
        E: Send + 'static,
        H: Fn(&F::Input, &F::State, E) -> Transition<F::State> + Send + Sync + 'static,
    {
        self.register(key.into(), handler)
    }

    fn register<E, H>(&self, key: Key, handler: H) -> Listener<E>
    where
        E: Send + 'static,
        H: Fn(&F::Input, &F::State, E) -> Transition<F::State> + Send + Sync + 'static,
    {
        if let Mode::Recording(recorder) = &self.mode {
            let mut recorder = recorder.borrow_mut();
            if recorder.listeners.contains_key(&key) {
                drop(recorder);
                self.env.duplicate_key(KeyScope::Listener, &key, self.formula);
            } else {
                let handler: Handler<F, E> = Arc::new(handler);
                recorder.listeners.insert(key.clone(), Box::new(handler));
            }
        }
        Listener::new(
            self.node,
            key,
            self.env.sink.clone(),
            deliver_listener_event::<F, E>,
        )
    }

    // ── Children ────────────────────────────────────────────────────────

    /// Evaluate `formula` as a child and return its output. The child is
    /// identified by its type plus `formula.key(&input)`, falling back to
    /// the call site.
    #[track_caller]
    pub fn child<C: Formula>(&self, formula: &C, input: C::Input) -> C::Output {
        let key = match formula.key(&input) {
            Some(key) => key,
            None => Key::caller(),
        };
        self.child_keyed(key, formula, input)
    }

    /// Evaluate `formula` as a child under an explicit key.
    pub fn child_with_key<C: Formula>(
        &self,
        key: impl Into<Key>,
        formula: &C,
        input: C::Input,
    ) -> C::Output {
        self.child_keyed(key.into(), formula, input)
    }

    fn child_keyed<C: Formula>(&self, key: Key, formula: &C, input: C::Input) -> C::Output {
        let key = Key::pair(Key::of::<C>(), key);
        let recorder = match &self.mode {
            Mode::Recording(recorder) => recorder,
            Mode::Replaying(children) => return replayed_output::<C>(children, &key, self.formula),
        };

        let previous = {
            let mut recorder = recorder.borrow_mut();
            if !recorder.child_keys.insert(key.clone()) {
                let existing = cached_output::<C>(&recorder.children, &key);
                drop(recorder);
                self.env.duplicate_key(KeyScope::Child, &key, self.formula);
                if let Some(output) = existing {
                    return output;
                }
                FormulaError::ChildSetChanged {
                    formula: self.formula,
                }
                .raise();
            }
            match recorder.previous_index.get(&key).copied() {
                Some(position) => recorder.previous[position].take(),
                None => None,
            }
        };

        // The recorder is not borrowed while the child evaluates, so the
        // child's own context is independent of ours.
        let mut node: Box<dyn ErasedNode> = match previous {
            Some(entry) => entry.node,
            None => Box::new(FormulaManager::new(
                self.env.next_node_id(),
                formula,
                input.clone(),
                &self.env,
            )),
        };
        let manager = node
            .as_any_mut()
            .downcast_mut::<FormulaManager<C>>()
            .expect("child key is qualified by the formula type");
        let output = manager.evaluate(formula, input, &self.env);
        recorder.borrow_mut().children.push(ChildEntry { key, node });
        output
    }
}

fn cached_output<C: Formula>(children: &[ChildEntry], key: &Key) -> Option<C::Output> {
    children
        .iter()
        .find(|entry| &entry.key == key)
        .and_then(|entry| entry.node.as_any().downcast_ref::<FormulaManager<C>>())
        .and_then(FormulaManager::output)
}

fn replayed_output<C: Formula>(
    children: &[ChildEntry],
    key: &Key,
    formula: &'static str,
) -> C::Output {
    match cached_output::<C>(children, key) {
        Some(output) => output,
        None => FormulaError::ChildSetChanged { formula }.raise(),
    }
}

fn deliver_listener_event<F, E>(target: &mut dyn Any, key: Key, event: E, env: &Env) -> Delivery
where
    F: Formula,
    E: Send + 'static,
{
    match target.downcast_mut::<FormulaManager<F>>() {
        Some(manager) => manager.handle_listener_event(&key, event, env),
        None => Delivery::Stale,
    }
}

#![forbid(unsafe_code)]

//! One live formula instance: its input, state, last output, actions,
//! children, and listeners.
//!
//! # Invariants
//!
//! 1. State changes only through transitions applied by
//!    [`handle_action_event`](FormulaManager::handle_action_event) or
//!    [`handle_listener_event`](FormulaManager::handle_listener_event).
//! 2. A node whose input is unchanged and whose subtree saw no state change
//!    since its last evaluation returns its cached output without calling
//!    `evaluate`.
//! 3. Actions and children are only started or torn down by the reconcile
//!    passes that follow an evaluation, never during one.

use std::any::Any;
use std::sync::Arc;

use formula_core::{Effects, FormulaError, Key, Transition};
use web_time::Instant;

use crate::action_manager::{ActionManager, Handler};
use crate::context::{ChildEntry, FormulaContext, ListenerMap};
use crate::formula::{Formula, Snapshot};
use crate::node::{Delivery, Env, ErasedNode, NodeEvent, NodeId};

pub(crate) struct FormulaManager<F: Formula> {
    id: NodeId,
    name: &'static str,
    input: F::Input,
    state: F::State,
    output: Option<F::Output>,
    /// Own state or a descendant's changed since the last evaluation.
    dirty: bool,
    evaluating: bool,
    actions: ActionManager<F>,
    children: Vec<ChildEntry>,
    removed_children: Vec<ChildEntry>,
    listeners: ListenerMap,
}

impl<F: Formula> FormulaManager<F> {
    pub(crate) fn new(id: NodeId, formula: &F, input: F::Input, env: &Env) -> Self {
        let name = formula.type_name();
        let state = formula.initial_state(&input);
        env.inspect(|i| i.on_formula_started(name, id));
        Self {
            id,
            name,
            input,
            state,
            output: None,
            dirty: true,
            evaluating: false,
            actions: ActionManager::default(),
            children: Vec::new(),
            removed_children: Vec::new(),
            listeners: ListenerMap::new(),
        }
    }

    pub(crate) fn input(&self) -> &F::Input {
        &self.input
    }

    /// Last output, reused while input and state are unchanged.
    pub(crate) fn output(&self) -> Option<F::Output> {
        self.output.clone()
    }

    pub(crate) fn running_action_keys(&self) -> Vec<Key> {
        self.actions.running_keys()
    }

    /// Evaluate with `input`, reusing the cached output when neither input
    /// nor any state in this subtree changed.
    pub(crate) fn evaluate(&mut self, formula: &F, input: F::Input, env: &Arc<Env>) -> F::Output {
        if self.evaluating {
            FormulaError::ReentrantEvaluation { formula: self.name }.raise();
        }
        let started = Instant::now();

        let input_changed = self.input != input;
        if input_changed {
            self.state = formula.on_input_changed(&self.input, &input, &self.state);
            self.input = input;
        }
        if !input_changed && !self.dirty {
            if let Some(output) = &self.output {
                env.inspect(|i| i.on_evaluate_finished(self.name, self.id, false, started.elapsed()));
                return output.clone();
            }
        }

        self.evaluating = true;
        let previous = std::mem::take(&mut self.children);
        let context = FormulaContext::recording(self.id, self.name, Arc::clone(env), previous);
        let output = formula
            .evaluate(Snapshot {
                input: &self.input,
                state: &self.state,
                context: &context,
            })
            .output;
        let mut declarations = context.into_declarations();

        if env.config.validation {
            let replay = FormulaContext::replaying(
                self.id,
                self.name,
                Arc::clone(env),
                std::mem::take(&mut declarations.children),
            );
            let again = formula
                .evaluate(Snapshot {
                    input: &self.input,
                    state: &self.state,
                    context: &replay,
                })
                .output;
            if again != output {
                FormulaError::ValidationFailed { formula: self.name }.raise();
            }
            declarations.children = replay.into_declarations().children;
        }
        self.evaluating = false;

        self.children = declarations.children;
        self.removed_children.extend(declarations.removed_children);
        self.actions.update(declarations.actions);
        self.listeners = declarations.listeners;
        self.dirty = false;
        self.output = Some(output.clone());
        env.inspect(|i| i.on_evaluate_finished(self.name, self.id, true, started.elapsed()));
        output
    }

    pub(crate) fn handle_action_event<E: Send + 'static>(
        &mut self,
        instance: u64,
        event: E,
        env: &Env,
    ) -> Delivery {
        match self.actions.handler_for::<E>(instance) {
            Some(handler) => self.apply(&handler, event, env),
            None => {
                tracing::trace!(formula = self.name, instance, "event from stale action instance dropped");
                env.inspect(|i| i.on_event_dropped(self.id));
                Delivery::Stale
            }
        }
    }

    pub(crate) fn handle_listener_event<E: Send + 'static>(
        &mut self,
        key: &Key,
        event: E,
        env: &Env,
    ) -> Delivery {
        let handler = self
            .listeners
            .get(key)
            .and_then(|handler| handler.downcast_ref::<Handler<F, E>>())
            .cloned();
        match handler {
            Some(handler) => self.apply(&handler, event, env),
            None => {
                tracing::debug!(formula = self.name, key = %key, "listener is no longer declared; event dropped");
                env.inspect(|i| i.on_event_dropped(self.id));
                Delivery::Stale
            }
        }
    }

    fn apply<E>(&mut self, handler: &Handler<F, E>, event: E, env: &Env) -> Delivery {
        let transition: Transition<F::State> = handler(&self.input, &self.state, event);
        let stateful = transition.is_stateful();
        env.inspect(|i| i.on_transition(self.name, self.id, stateful));
        let (state, effects) = transition.into_parts();
        let state_changed = match state {
            Some(state) => {
                self.state = state;
                self.dirty = true;
                env.inspect(|i| i.on_state_changed(self.name, self.id));
                true
            }
            None => false,
        };
        Delivery::Applied {
            state_changed,
            effects,
        }
    }
}

impl<F: Formula> ErasedNode for FormulaManager<F> {
    fn id(&self) -> NodeId {
        self.id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn deliver(&mut self, event: NodeEvent, env: &Env) -> Result<Delivery, NodeEvent> {
        if event.node == self.id {
            return Ok((event.deliver)(self.as_any_mut(), env));
        }
        let mut event = event;
        for child in &mut self.children {
            match child.node.deliver(event, env) {
                Ok(delivery) => {
                    if delivery.state_changed() {
                        self.dirty = true;
                    }
                    return Ok(delivery);
                }
                Err(returned) => event = returned,
            }
        }
        Err(event)
    }

    fn reconcile_removals(&mut self, env: &Env, effects: &mut Effects) {
        for mut removed in self.removed_children.drain(..).rev() {
            removed.node.terminate(env, effects);
        }
        self.actions
            .cancel_removed(&self.input, &self.state, self.name, env, effects);
        for child in &mut self.children {
            child.node.reconcile_removals(env, effects);
        }
    }

    fn reconcile_starts(&mut self, env: &Env) {
        self.actions.start_pending(self.id, self.name, env);
        for child in &mut self.children {
            child.node.reconcile_starts(env);
        }
    }

    fn terminate(&mut self, env: &Env, effects: &mut Effects) {
        for mut child in self.children.drain(..).rev() {
            child.node.terminate(env, effects);
        }
        for mut removed in self.removed_children.drain(..).rev() {
            removed.node.terminate(env, effects);
        }
        self.actions
            .terminate_all(&self.input, &self.state, self.name, env, effects);
        self.listeners.clear();
        env.inspect(|i| i.on_formula_finished(self.name, self.id));
    }
}

#![forbid(unsafe_code)]

//! Root runtime: owns the formula tree and serializes every update.
//!
//! # Threading model
//!
//! Inputs and events may arrive from any thread. Each one is pushed onto a
//! FIFO queue, then the submitting thread tries to become the *driver* by
//! taking the tree lock without blocking. The driver drains the queue until
//! it is empty; a thread that finds the lock taken just leaves its update
//! for the current driver. So:
//!
//! - transitions are applied one at a time, in submission order;
//! - an event emitted while the runtime is busy (from an effect, from an
//!   action starting synchronously, from another thread) is queued and
//!   processed after the current update completes;
//! - emitting from inside `evaluate` on the driving thread is a programmer
//!   error ([`FormulaError::TransitionDuringEvaluation`]).
//!
//! # One update
//!
//! ```text
//! apply transition ─▶ evaluate tree ─▶ cancel removed ─▶ start new
//!                                      (depth-first)     (declaration order)
//!                  ─▶ emit output (deduplicated) ─▶ run effects
//! ```
//!
//! # Invariants
//!
//! 1. At most one transition is being applied at any instant.
//! 2. Every evaluation pass completes, including reconciliation, before the
//!    next queued update is processed.
//! 3. After termination every action in the tree has been cancelled and no
//!    further outputs are delivered; later submissions are discarded.
//!
//! # Failure Modes
//!
//! - A panic inside `evaluate`, a handler, or an effect poisons the tree
//!   lock. Later submissions panic instead of running on a half-updated
//!   tree.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError, Weak};
use std::thread::{self, ThreadId};

use formula_core::{Cancelable, Effects, Emitter, FormulaError, Key, Stream};

use crate::config::RuntimeConfig;
use crate::formula::Formula;
use crate::manager::FormulaManager;
use crate::node::{Delivery, Env, ErasedNode, EventSink, NodeEvent};
use crate::thread_check::ThreadChecker;

/// Coarse phase of the runtime, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RuntimePhase {
    /// Waiting for inputs or events.
    Idle = 0,
    /// Inside a formula's `evaluate`.
    Evaluating = 1,
    /// Applying a transition, reconciling, or running effects.
    Applying = 2,
    Terminated = 3,
}

impl RuntimePhase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Idle,
            1 => Self::Evaluating,
            2 => Self::Applying,
            _ => Self::Terminated,
        }
    }
}

enum Update<I> {
    Input(I),
    Event(NodeEvent),
    Terminate,
}

type OutputSink<O> = Box<dyn FnMut(O) + Send>;

/// Tree state, only touched by the driving thread.
struct Driver<F: Formula> {
    formula: F,
    root: Option<FormulaManager<F>>,
    root_key: Option<Key>,
    on_output: OutputSink<F::Output>,
    input_subscription: Option<Cancelable>,
}

struct Core<F: Formula> {
    name: &'static str,
    env: Arc<Env>,
    queue: Mutex<VecDeque<Update<F::Input>>>,
    driver: Mutex<Driver<F>>,
    /// Last delivered output. Kept outside the driver lock so it can be
    /// read from effects and output callbacks.
    last_output: Mutex<Option<F::Output>>,
    evaluating_on: Mutex<Option<ThreadId>>,
    terminated: AtomicBool,
    phase: AtomicU8,
}

impl<F: Formula> EventSink for Core<F> {
    fn submit_event(&self, event: NodeEvent) {
        if self.is_evaluating_on_current_thread() {
            FormulaError::TransitionDuringEvaluation { formula: self.name }.raise();
        }
        self.submit(Update::Event(event));
    }
}

impl<F: Formula> Core<F> {
    fn submit(&self, update: Update<F::Input>) {
        if self.terminated.load(Ordering::Acquire) {
            tracing::trace!(formula = self.name, "update after termination discarded");
            return;
        }
        lock(&self.queue).push_back(update);
        self.drain();
    }

    fn drain(&self) {
        loop {
            let mut driver = match self.driver.try_lock() {
                Ok(driver) => driver,
                // Someone else is driving and will pick our update up.
                Err(TryLockError::WouldBlock) => return,
                Err(TryLockError::Poisoned(_)) => {
                    panic!("formula runtime for {} is poisoned by an earlier panic", self.name)
                }
            };
            while let Some(update) = self.pop() {
                driver.process(update, self);
            }
            drop(driver);
            // An update pushed between our last pop and the unlock would
            // otherwise be stranded.
            if lock(&self.queue).is_empty() {
                return;
            }
        }
    }

    fn pop(&self) -> Option<Update<F::Input>> {
        let mut queue = lock(&self.queue);
        if self.terminated.load(Ordering::Acquire) {
            queue.clear();
            return None;
        }
        queue.pop_front()
    }

    fn is_evaluating_on_current_thread(&self) -> bool {
        *lock(&self.evaluating_on) == Some(thread::current().id())
    }

    fn set_evaluating(&self, evaluating: bool) {
        *lock(&self.evaluating_on) = evaluating.then(|| thread::current().id());
        self.set_phase(if evaluating {
            RuntimePhase::Evaluating
        } else {
            RuntimePhase::Applying
        });
    }

    fn set_phase(&self, phase: RuntimePhase) {
        if self.phase.load(Ordering::Acquire) != RuntimePhase::Terminated as u8 {
            self.phase.store(phase as u8, Ordering::Release);
        }
    }
}

impl<F: Formula> Driver<F> {
    fn process(&mut self, update: Update<F::Input>, core: &Core<F>) {
        core.set_phase(RuntimePhase::Applying);
        match update {
            Update::Input(input) => self.apply_input(input, core),
            Update::Event(event) => self.apply_event(event, core),
            Update::Terminate => self.shutdown(core),
        }
        core.set_phase(RuntimePhase::Idle);
    }

    fn apply_input(&mut self, input: F::Input, core: &Core<F>) {
        let env = &core.env;
        env.inspect(|i| i.on_run_started(true));
        let key = self.formula.key(&input);
        let mut effects = Effects::new();
        if self.root.is_some() && key != self.root_key {
            tracing::debug!(formula = core.name, "root key changed; restarting");
            if let Some(mut root) = self.root.take() {
                root.terminate(env, &mut effects);
            }
            *lock(&core.last_output) = None;
        }
        self.root_key = key;
        if self.root.is_none() {
            self.root = Some(FormulaManager::new(
                env.next_node_id(),
                &self.formula,
                input.clone(),
                env,
            ));
        }
        effects.extend(self.run(input, core));
        effects.execute();
        env.inspect(|i| i.on_run_finished());
    }

    fn apply_event(&mut self, event: NodeEvent, core: &Core<F>) {
        let env = &core.env;
        let Some(root) = self.root.as_mut() else {
            tracing::trace!(node = event.node.get(), "event before start or after stop dropped");
            return;
        };
        match root.deliver(event, env) {
            Ok(Delivery::Applied {
                state_changed,
                mut effects,
            }) => {
                env.inspect(|i| i.on_run_started(state_changed));
                if state_changed {
                    let input = root.input().clone();
                    effects.extend(self.run(input, core));
                }
                effects.execute();
                env.inspect(|i| i.on_run_finished());
            }
            Ok(Delivery::Stale) => {}
            Err(event) => {
                tracing::debug!(node = event.node.get(), "event for a removed formula dropped");
                env.inspect(|i| i.on_event_dropped(event.node));
            }
        }
    }

    /// Evaluate the tree, reconcile it, and emit the output. Returns the
    /// effects of actions cancelled by reconciliation.
    fn run(&mut self, input: F::Input, core: &Core<F>) -> Effects {
        let env = &core.env;
        let mut effects = Effects::new();
        let Some(root) = self.root.as_mut() else {
            return effects;
        };
        core.set_evaluating(true);
        let output = root.evaluate(&self.formula, input, env);
        core.set_evaluating(false);
        root.reconcile_removals(env, &mut effects);
        root.reconcile_starts(env);
        self.emit(output, core);
        effects
    }

    fn emit(&mut self, output: F::Output, core: &Core<F>) {
        {
            let mut last = lock(&core.last_output);
            if core.env.config.dedupe_outputs && last.as_ref() == Some(&output) {
                return;
            }
            *last = Some(output.clone());
        }
        (self.on_output)(output);
    }

    fn shutdown(&mut self, core: &Core<F>) {
        let mut effects = Effects::new();
        if let Some(subscription) = self.input_subscription.take() {
            subscription.cancel();
        }
        if let Some(mut root) = self.root.take() {
            root.terminate(&core.env, &mut effects);
        }
        core.terminated.store(true, Ordering::Release);
        core.phase
            .store(RuntimePhase::Terminated as u8, Ordering::Release);
        tracing::debug!(formula = core.name, "runtime terminated");
        effects.execute();
    }
}

/// A running formula tree.
///
/// Dropping the runtime terminates it.
pub struct FormulaRuntime<F: Formula> {
    core: Arc<Core<F>>,
    thread: ThreadChecker,
}

impl<F: Formula> FormulaRuntime<F> {
    /// Create a runtime that evaluates `formula` once the first input
    /// arrives through [`on_input`](Self::on_input).
    pub fn new(
        formula: F,
        config: RuntimeConfig,
        on_output: impl FnMut(F::Output) + Send + 'static,
    ) -> Self {
        let name = formula.type_name();
        let thread = ThreadChecker::current(config.thread_confinement);
        let core = Arc::new_cyclic(|weak: &Weak<Core<F>>| {
            let sink: Weak<dyn EventSink> = weak.clone();
            Core {
                name,
                env: Arc::new(Env::new(config, sink)),
                queue: Mutex::new(VecDeque::new()),
                driver: Mutex::new(Driver {
                    formula,
                    root: None,
                    root_key: None,
                    on_output: Box::new(on_output),
                    input_subscription: None,
                }),
                last_output: Mutex::new(None),
                evaluating_on: Mutex::new(None),
                terminated: AtomicBool::new(false),
                phase: AtomicU8::new(RuntimePhase::Idle as u8),
            }
        });
        tracing::debug!(formula = name, "runtime created");
        Self { core, thread }
    }

    /// Create a runtime driven by `input`: every value the stream emits is
    /// submitted as a new input. The subscription is cancelled on
    /// termination.
    pub fn start(
        formula: F,
        input: impl Stream<F::Input>,
        config: RuntimeConfig,
        on_output: impl FnMut(F::Output) + Send + 'static,
    ) -> Self {
        let runtime = Self::new(formula, config, on_output);
        let weak = Arc::downgrade(&runtime.core);
        let subscription = input.subscribe(Emitter::new(move |value| {
            if let Some(core) = weak.upgrade() {
                core.submit(Update::Input(value));
            }
        }));
        if let Some(subscription) = subscription {
            if runtime.is_terminated() {
                subscription.cancel();
            } else {
                lock(&runtime.core.driver).input_subscription = Some(subscription);
            }
        }
        runtime
    }

    /// Submit a new root input. Must be called on the thread that created
    /// the runtime when thread confinement is on.
    #[track_caller]
    pub fn on_input(&self, input: F::Input) {
        self.thread.check("on_input");
        self.core.submit(Update::Input(input));
    }

    /// Cancel every action, tear the tree down, and stop delivering
    /// outputs. Idempotent.
    #[track_caller]
    pub fn terminate(&self) {
        self.thread.check("terminate");
        self.core.submit(Update::Terminate);
    }

    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.core.terminated.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn phase(&self) -> RuntimePhase {
        RuntimePhase::from_u8(self.core.phase.load(Ordering::Acquire))
    }

    /// Last output delivered to the output callback.
    #[must_use]
    pub fn last_output(&self) -> Option<F::Output> {
        lock(&self.core.last_output).clone()
    }

    /// Keys of the actions currently running on the root formula, or `None`
    /// while an update is being processed.
    #[must_use]
    pub fn running_root_actions(&self) -> Option<Vec<Key>> {
        let driver = self.core.driver.try_lock().ok()?;
        Some(
            driver
                .root
                .as_ref()
                .map(FormulaManager::running_action_keys)
                .unwrap_or_default(),
        )
    }
}

impl<F: Formula> Drop for FormulaRuntime<F> {
    fn drop(&mut self) {
        if !self.is_terminated() && !thread::panicking() && !self.core.driver.is_poisoned() {
            self.core.submit(Update::Terminate);
        }
    }
}

impl<F: Formula> std::fmt::Debug for FormulaRuntime<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormulaRuntime")
            .field("formula", &self.core.name)
            .field("phase", &self.phase())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

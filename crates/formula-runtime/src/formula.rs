#![forbid(unsafe_code)]

//! The [`Formula`] trait: a pure, keyed state machine.
//!
//! A formula maps `(input, state)` to an output. It never mutates state in
//! place: state changes only through [`Transition`](formula_core::Transition)s
//! returned by event handlers that the formula declares while evaluating.
//!
//! # Invariants
//!
//! 1. `evaluate` is deterministic for a given `(input, state)` and the
//!    outputs of the children it declares. Validation mode enforces this by
//!    evaluating twice.
//! 2. `evaluate` has no side effects. Work goes into actions and effects.

use formula_core::Key;

use crate::context::FormulaContext;

/// A reactive state machine.
pub trait Formula: Send + Sized + 'static {
    type Input: Clone + PartialEq + Send + 'static;
    type State: Clone + Send + 'static;
    type Output: Clone + PartialEq + Send + 'static;

    /// State for a freshly started instance.
    fn initial_state(&self, input: &Self::Input) -> Self::State;

    /// Called when the parent passes an input that differs from the previous
    /// one. The default keeps the current state.
    fn on_input_changed(
        &self,
        _old: &Self::Input,
        _new: &Self::Input,
        state: &Self::State,
    ) -> Self::State {
        state.clone()
    }

    /// Produce the output and declare actions, children, and listeners.
    fn evaluate(&self, snapshot: Snapshot<'_, Self>) -> Evaluation<Self::Output>;

    /// Identity of an instance. When a parent redeclares a child with a
    /// different key, or the root input maps to a different key, the old
    /// instance is torn down and a fresh one started.
    fn key(&self, _input: &Self::Input) -> Option<Key> {
        None
    }

    /// Name used in logs and errors.
    fn type_name(&self) -> &'static str {
        short_type_name::<Self>()
    }
}

/// What a formula sees while evaluating.
pub struct Snapshot<'a, F: Formula> {
    pub input: &'a F::Input,
    pub state: &'a F::State,
    pub context: &'a FormulaContext<F>,
}

/// Result of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation<O> {
    pub output: O,
}

impl<O> Evaluation<O> {
    #[must_use]
    pub fn new(output: O) -> Self {
        Self { output }
    }
}

impl<O> From<O> for Evaluation<O> {
    fn from(output: O) -> Self {
        Self { output }
    }
}

/// Adapter for formulas without state: implement [`StatelessFormula`] and
/// wrap the value in [`Stateless`].
pub trait StatelessFormula: Send + Sync + Sized + 'static {
    type Input: Clone + PartialEq + Send + 'static;
    type Output: Clone + PartialEq + Send + 'static;

    fn evaluate(
        &self,
        input: &Self::Input,
        context: &FormulaContext<Stateless<Self>>,
    ) -> Self::Output;

    fn key(&self, _input: &Self::Input) -> Option<Key> {
        None
    }
}

/// [`Formula`] wrapper for a [`StatelessFormula`].
#[derive(Debug, Clone, Default)]
pub struct Stateless<T>(pub T);

impl<T: StatelessFormula> Formula for Stateless<T> {
    type Input = T::Input;
    type State = ();
    type Output = T::Output;

    fn initial_state(&self, _input: &Self::Input) -> Self::State {}

    fn evaluate(&self, snapshot: Snapshot<'_, Self>) -> Evaluation<Self::Output> {
        Evaluation::new(self.0.evaluate(snapshot.input, snapshot.context))
    }

    fn key(&self, input: &Self::Input) -> Option<Key> {
        self.0.key(input)
    }

    fn type_name(&self) -> &'static str {
        short_type_name::<T>()
    }
}

/// `a::b::Foo<c::Bar>` becomes `Foo<c::Bar>`.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let head = full.split('<').next().unwrap_or(full);
    match head.rfind("::") {
        Some(index) => &full[index + 2..],
        None => full,
    }
}

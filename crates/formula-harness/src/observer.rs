#![forbid(unsafe_code)]

//! Drive one formula through a fresh runtime and record what it outputs.
//!
//! Every [`FormulaTest`] owns its own [`FormulaRuntime`]: nothing is
//! shared between tests, so there is nothing to reset.
//!
//! ```
//! use formula_harness::FormulaTestExt;
//! use formula_runtime::{Evaluation, Formula, Snapshot};
//!
//! struct Double;
//!
//! impl Formula for Double {
//!     type Input = u32;
//!     type State = ();
//!     type Output = u32;
//!
//!     fn initial_state(&self, _input: &u32) {}
//!
//!     fn evaluate(&self, snapshot: Snapshot<'_, Self>) -> Evaluation<u32> {
//!         Evaluation::new(snapshot.input * 2)
//!     }
//! }
//!
//! let test = Double.test(2);
//! assert_eq!(test.output(), 4);
//! test.input(5);
//! assert_eq!(test.values(), vec![4, 10]);
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use formula_runtime::{Formula, FormulaRuntime, RuntimeConfig};

/// A formula under test plus every output it produced.
pub struct FormulaTest<F: Formula> {
    runtime: FormulaRuntime<F>,
    values: Arc<Mutex<Vec<F::Output>>>,
}

impl<F: Formula> FormulaTest<F> {
    /// Start `formula` with `input` under validation mode.
    pub fn new(formula: F, input: F::Input) -> Self {
        Self::with_config(formula, input, RuntimeConfig::default().with_validation(true))
    }

    pub fn with_config(formula: F, input: F::Input, config: RuntimeConfig) -> Self {
        let values: Arc<Mutex<Vec<F::Output>>> = Arc::default();
        let sink = Arc::clone(&values);
        let runtime = FormulaRuntime::new(formula, config, move |output| {
            sink.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(output);
        });
        runtime.on_input(input);
        Self { runtime, values }
    }

    /// Submit a new input.
    #[track_caller]
    pub fn input(&self, input: F::Input) -> &Self {
        self.runtime.on_input(input);
        self
    }

    /// The latest output.
    ///
    /// # Panics
    ///
    /// Panics if the formula has not produced an output.
    #[track_caller]
    pub fn output(&self) -> F::Output {
        match self.last_output() {
            Some(output) => output,
            None => panic!("{} has not produced an output", std::any::type_name::<F>()),
        }
    }

    #[must_use]
    pub fn last_output(&self) -> Option<F::Output> {
        self.lock().last().cloned()
    }

    /// Every output in delivery order.
    #[must_use]
    pub fn values(&self) -> Vec<F::Output> {
        self.lock().clone()
    }

    #[must_use]
    pub fn value_count(&self) -> usize {
        self.lock().len()
    }

    /// Terminate the runtime, cancelling every action.
    #[track_caller]
    pub fn dispose(&self) {
        self.runtime.terminate();
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.runtime.is_terminated()
    }

    #[must_use]
    pub fn runtime(&self) -> &FormulaRuntime<F> {
        &self.runtime
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<F::Output>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<F: Formula> fmt::Debug for FormulaTest<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormulaTest")
            .field("runtime", &self.runtime)
            .field("values", &self.value_count())
            .finish()
    }
}

/// `formula.test(input)` shorthand for [`FormulaTest::new`].
pub trait FormulaTestExt: Formula {
    fn test(self, input: Self::Input) -> FormulaTest<Self> {
        FormulaTest::new(self, input)
    }
}

impl<F: Formula> FormulaTestExt for F {}

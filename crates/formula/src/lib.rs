#![forbid(unsafe_code)]

//! Formula public facade crate.
//!
//! Re-exports the stable surface of the workspace. Most users only need
//! the [`prelude`].
//!
//! ```
//! use formula::prelude::*;
//!
//! struct Toggle;
//!
//! impl Formula for Toggle {
//!     type Input = ();
//!     type State = bool;
//!     type Output = (bool, Listener<()>);
//!
//!     fn initial_state(&self, _input: &()) -> bool {
//!         false
//!     }
//!
//!     fn evaluate(&self, snapshot: Snapshot<'_, Self>) -> Evaluation<Self::Output> {
//!         let flip = snapshot.context.callback(|_, on| Transition::to(!on));
//!         Evaluation::new((*snapshot.state, flip))
//!     }
//! }
//!
//! let runtime = FormulaRuntime::new(Toggle, RuntimeConfig::default(), |_| {});
//! runtime.on_input(());
//! let (on, flip) = runtime.last_output().unwrap();
//! assert!(!on);
//! flip.call();
//! assert!(runtime.last_output().unwrap().0);
//! ```

pub use formula_core as core;
#[cfg(feature = "navigation")]
pub use formula_navigation as navigation;
pub use formula_runtime as runtime;

pub mod prelude {
    pub use formula_core::{Action, Cancelable, Emitter, Key, Relay, Stream, Transition};
    pub use formula_runtime::{
        Evaluation, Executor, Formula, FormulaContext, FormulaRuntime, LatestValueScheduler,
        Listener, RuntimeConfig, Snapshot, StatelessFormula, ThreadExecutor,
    };

    #[cfg(feature = "navigation")]
    pub use formula_navigation::{
        BackStack, Feature, FeatureBindings, FeatureError, LifecycleEvent, NavigationEnvironment,
        NavigationState, NavigationStore, RouteId, VisibilityEvent,
    };
}

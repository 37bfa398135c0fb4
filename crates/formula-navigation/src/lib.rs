#![forbid(unsafe_code)]

//! Navigation reconciliation for Formula.
//!
//! # Role in the workspace
//! Maps the platform's set of live navigation destinations to
//! lifecycle-scoped feature state. Each destination gets a [`Feature`]
//! from the [`FeatureBindings`]; its state action runs for exactly as long
//! as the destination is active, and its latest value is the
//! destination's render model.
//!
//! # Primary responsibilities
//! - **RouteId**: destination identity (instance id + key).
//! - **BackStack**: turns stack mutations into lifecycle/visibility events.
//! - **FeatureBindings**: first-match-wins resolution with failure capture.
//! - **NavigationStoreFormula**: the reducer and per-destination actions.
//! - **NavigationStore**: thread-safe host surface with snapshots and
//!   latest-value subscriptions.
//!
//! # How it fits in the system
//! The store runs on a `formula-runtime` [`FormulaRuntime`]; removing a
//! destination simply stops declaring its action, and the runtime's action
//! diffing cancels it.
//!
//! [`FormulaRuntime`]: formula_runtime::FormulaRuntime

pub mod backstack;
pub mod binding;
pub mod environment;
pub mod error;
pub mod event;
pub mod feature;
pub mod route;
pub mod state;
pub mod store;
pub mod store_formula;

pub use backstack::{BackStack, BackStackChange};
pub use binding::{FeatureBindings, FeatureBindingsBuilder};
pub use environment::NavigationEnvironment;
pub use error::{BindingError, FeatureError};
pub use event::{LifecycleEvent, NavigationEvent, VisibilityEvent};
pub use feature::{Feature, FeatureEvent, ViewFactory};
pub use route::{InstanceId, RouteId, RouteKey};
pub use state::{FeatureOutput, NavigationState, RenderModel};
pub use store::{NavigationStore, NavigationStoreBuilder};
pub use store_formula::NavigationStoreFormula;

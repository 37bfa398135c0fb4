#![forbid(unsafe_code)]

//! Evaluation runtime for Formula state machines.
//!
//! # Role in the workspace
//! `formula-core` describes what formulas produce (actions, transitions,
//! keys). This crate interprets those descriptions: it keeps every formula
//! instance's state, evaluates the tree, diffs declared actions and
//! children between evaluations, and serializes all transitions.
//!
//! # Primary responsibilities
//! - **Formula**: the state-machine trait and its evaluation snapshot.
//! - **FormulaContext**: declaration surface (actions, children, listeners).
//! - **FormulaRuntime**: the root driver and its update queue.
//! - **LatestValueScheduler / Executor**: latest-wins delivery at the edges.
//!
//! # How it fits in the system
//! Application formulas implement [`Formula`]. A [`FormulaRuntime`] is
//! started with a root formula and an output callback; the navigation layer
//! (`formula-navigation`) runs its store as one of these.

pub(crate) mod action_manager;
pub mod config;
pub mod context;
pub mod executor;
pub mod formula;
pub mod inspector;
pub mod listener;
pub(crate) mod manager;
pub mod node;
pub mod runtime;
pub mod scheduler;
pub mod thread_check;

pub use config::RuntimeConfig;
pub use context::FormulaContext;
pub use executor::{Executor, ImmediateExecutor, Task, ThreadExecutor};
pub use formula::{Evaluation, Formula, Snapshot, Stateless, StatelessFormula};
pub use inspector::{Inspector, ListInspector, TracingInspector};
pub use listener::Listener;
pub use node::NodeId;
pub use runtime::{FormulaRuntime, RuntimePhase};
pub use scheduler::LatestValueScheduler;
pub use thread_check::ThreadChecker;

pub use formula_core::{
    Action, Cancelable, Effect, Effects, Emitter, FormulaError, Key, KeyScope, Relay, Stream,
    Transition, stream_fn,
};

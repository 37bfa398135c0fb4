#![forbid(unsafe_code)]

//! Core value types for the Formula state-machine runtime.
//!
//! Nothing in this crate has behavior of its own: these are the
//! descriptions that formulas produce and the runtime interprets.
//!
//! - [`Key`]: identity of declared actions, children, and listeners.
//! - [`Emitter`] / [`Cancelable`]: push-side callback and stop handle.
//! - [`Stream`] / [`Relay`]: the `subscribe(emitter) -> cancel` contract and
//!   an in-memory multicast implementation.
//! - [`Action`]: a keyed description of one cancellable event source.
//! - [`Transition`] / [`Effects`]: the result of handling one event.
//! - [`FormulaError`]: programmer errors raised by the runtime.

pub mod action;
pub mod emitter;
pub mod error;
pub mod key;
pub mod stream;
pub mod transition;

pub use action::Action;
pub use emitter::{Cancelable, Emitter};
pub use error::{FormulaError, KeyScope};
pub use key::Key;
pub use stream::{FnStream, Relay, Stream, stream_fn};
pub use transition::{Effect, Effects, Transition};

#![forbid(unsafe_code)]

//! Test tooling for Formula.
//!
//! # Role in the workspace
//! Everything a test needs to exercise formulas and the navigation store
//! deterministically, without global state:
//!
//! - [`FormulaTest`]: a fresh runtime per test that records every output.
//! - [`ManualExecutor`]: an executor that runs only when the test says so.
//! - [`ActionProbe`]: actions that count starts and cancels and accept
//!   pushed values.
//! - [`init_test_logging`] / [`capture_logs`]: log setup and structured
//!   log assertions.
//!
//! Cross-crate integration and property tests live in this crate's
//! `tests/` directory.

pub mod executor;
pub mod logging;
pub mod observer;
pub mod probe;

pub use executor::ManualExecutor;
pub use logging::{CapturedEvent, capture_logs, init_test_logging};
pub use observer::{FormulaTest, FormulaTestExt};
pub use probe::ActionProbe;

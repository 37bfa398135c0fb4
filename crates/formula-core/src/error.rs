#![forbid(unsafe_code)]

//! Programmer-error taxonomy for the runtime.
//!
//! None of these are runtime conditions a caller is expected to handle:
//! they are raised as panics carrying the error's `Display` text so that
//! configuration and threading mistakes fail loudly during development.

use std::thread::ThreadId;

use thiserror::Error;

use crate::key::Key;

pub type Result<T> = std::result::Result<T, FormulaError>;

/// What kind of element a duplicated key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyScope {
    Action,
    Child,
    Listener,
}

impl std::fmt::Display for KeyScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Action => "action",
            Self::Child => "child",
            Self::Listener => "listener",
        })
    }
}

#[derive(Debug, Error)]
pub enum FormulaError {
    #[error("duplicate {scope} key {key} declared by {formula} in one evaluation")]
    DuplicateKey {
        scope: KeyScope,
        key: Key,
        formula: &'static str,
    },

    #[error("{operation} called from {actual:?}, but the runtime is confined to {expected:?}")]
    ThreadViolation {
        operation: &'static str,
        expected: ThreadId,
        actual: ThreadId,
    },

    #[error("evaluate() re-entered for {formula} while it was already evaluating")]
    ReentrantEvaluation { formula: &'static str },

    #[error("transition requested during evaluate() of {formula}; emit from actions or listeners instead")]
    TransitionDuringEvaluation { formula: &'static str },

    #[error("{formula} produced a different output when re-evaluated with the same input and state")]
    ValidationFailed { formula: &'static str },

    #[error("{formula} declared a different set of children when re-evaluated")]
    ChildSetChanged { formula: &'static str },

    #[error("runtime for {formula} is terminated")]
    Terminated { formula: &'static str },
}

impl FormulaError {
    /// Raise this error as a panic. Used for unrecoverable programmer
    /// errors.
    #[track_caller]
    pub fn raise(self) -> ! {
        panic!("{self}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_key_message_names_scope_and_key() {
        let err = FormulaError::DuplicateKey {
            scope: KeyScope::Action,
            key: Key::new("poll"),
            formula: "CounterFormula",
        };
        let msg = err.to_string();
        assert!(msg.contains("duplicate action key"));
        assert!(msg.contains("poll"));
        assert!(msg.contains("CounterFormula"));
    }

    #[test]
    #[should_panic(expected = "runtime for Demo is terminated")]
    fn raise_panics_with_display() {
        FormulaError::Terminated { formula: "Demo" }.raise();
    }
}
